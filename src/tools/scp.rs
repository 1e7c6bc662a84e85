//! Invocation of `scp` copying an archive to a remote.

use std::path::Path;

use super::{path_arg, Invocation};
use crate::config::RemoteTarget;

/// Copies `archive` to the `remote`.
pub fn copy_to(scp: &str, archive: &Path, remote: &RemoteTarget) -> Invocation {
    Invocation::new(scp)
        .arg("-r")
        .arg("-P")
        .arg(remote.port.to_string())
        .arg(path_arg(archive))
        .arg(&remote.host_spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_args() {
        let remote: RemoteTarget = "backup@example.org:/srv/backup, 2222".parse().unwrap();
        let invocation = copy_to("scp", Path::new("/backup/sales.d.t.tgz"), &remote);

        assert_eq!(invocation.program(), "scp");
        assert_eq!(
            invocation.get_args(),
            [
                "-r",
                "-P",
                "2222",
                "/backup/sales.d.t.tgz",
                "backup@example.org:/srv/backup",
            ]
        );
    }
}
