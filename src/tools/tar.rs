//! Invocation of `tar` creating the archive of a database.

use std::path::Path;

use super::Invocation;

/// Creates the gzip compressed `archive` of `files` relative to `dir`.
///
/// Without files an empty archive is created, which `tar` refuses when
/// given no members.
pub fn create_archive(tar: &str, archive: &Path, dir: &Path, files: &[String]) -> Invocation {
    let invocation = Invocation::new(tar)
        .arg("--create")
        .arg("--gzip")
        .arg(format!("--file={}", archive.display()));

    if files.is_empty() {
        invocation.arg("--files-from=/dev/null")
    } else {
        invocation
            .arg(format!("--directory={}", dir.display()))
            .arg("--")
            .args(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_members_relative_to_staging() {
        let files = vec!["customers.d.t.sql".to_string(), "orders.d.t.sql".to_string()];
        let invocation = create_archive(
            "tar",
            Path::new("/backup/sales.d.t.tgz"),
            Path::new("/staging"),
            &files,
        );

        assert_eq!(
            invocation.get_args(),
            [
                "--create",
                "--gzip",
                "--file=/backup/sales.d.t.tgz",
                "--directory=/staging",
                "--",
                "customers.d.t.sql",
                "orders.d.t.sql",
            ]
        );
    }

    #[test]
    fn empty_archive() {
        let invocation = create_archive(
            "tar",
            Path::new("/backup/sales.d.t.tgz"),
            Path::new("/staging"),
            &[],
        );

        assert_eq!(
            invocation.get_args(),
            [
                "--create",
                "--gzip",
                "--file=/backup/sales.d.t.tgz",
                "--files-from=/dev/null",
            ]
        );
    }

    #[test]
    fn creates_real_archive() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        let archive = dir.path().join("empty.tgz");

        let mut runner = crate::tools::SystemRunner::new(false);
        crate::tools::Runner::run(&mut runner, &create_archive("tar", &archive, &staging, &[]))
            .unwrap();

        assert!(archive.is_file());
    }
}
