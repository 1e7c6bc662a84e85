//! Backup and staging directories.

pub mod retention;

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

pub use retention::{Entry, Retention};

const WRITE_PROBE: &str = ".mysql_rbackup-probe";

/// Errors preparing the backup or staging directory.
#[derive(Debug, Display, Error)]
pub enum WorkspaceError {
    /// The directory can't be created.
    #[display("Unable to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    /// The path exists, but isn't a directory.
    #[display("Not a directory: {}", _0.display())]
    NotADirectory(#[error(ignore)] PathBuf),
    /// Files can't be created in the directory.
    #[display("Directory {} isn't writable: {source}", path.display())]
    NotWritable { path: PathBuf, source: io::Error },
    /// The directory can't be listed.
    #[display("Unable to list directory {}: {source}", path.display())]
    List { path: PathBuf, source: io::Error },
}

/// Outcome of the retention sweep.
#[derive(Debug, Default)]
pub struct Sweep {
    /// Deleted files, oldest first. On a dry run the files that would have been deleted.
    pub removed: Vec<PathBuf>,
    /// Files whose deletion failed.
    pub failed: Vec<(PathBuf, io::Error)>,
}

/// Ensures `backup_dir` and `temp_dir` exist and enforces the retention.
///
/// Existing directories are kept as they are. Afterwards `backup_dir` holds
/// at most `local_count * database_count` files, the oldest ones are deleted.
/// A failed deletion doesn't stop the sweep, it's logged and listed in
/// [`Sweep::failed`].
///
/// # Dry Run
///
/// On a dry run (`dry_run=true`) no files are deleted, but directories are
/// still created.
pub fn prepare_workspace(
    backup_dir: &Path,
    temp_dir: &Path,
    local_count: usize,
    database_count: usize,
    dry_run: bool,
) -> Result<Sweep, WorkspaceError> {
    log::info!(target: "workspace", "Checking workspace...");
    ensure_dir(backup_dir)?;
    ensure_dir(temp_dir)?;

    log::info!(target: "workspace", "Checking and clearing archives...");
    let retention = Retention::new(local_count, database_count);
    let entries = list_archives(backup_dir)?;
    log::debug!(
        target: "workspace",
        "Found {} file(s) in {}, keeping {}",
        entries.len(),
        backup_dir.display(),
        retention.keep()
    );

    let mut sweep = Sweep::default();
    for entry in retention.expired(entries) {
        if dry_run {
            log::info!(target: "workspace", "Dry run, would delete {}", entry.path.display());
            sweep.removed.push(entry.path);
            continue;
        }

        match fs::remove_file(&entry.path) {
            Ok(()) => {
                log::info!(target: "workspace", "Deleted old archive {}", entry.path.display());
                sweep.removed.push(entry.path);
            }
            Err(e) => {
                log::error!(target: "workspace", "Deleting old archive {} failed: {e}", entry.path.display());
                sweep.failed.push((entry.path, e));
            }
        }
    }

    Ok(sweep)
}

fn ensure_dir(dir: &Path) -> Result<(), WorkspaceError> {
    if !dir.exists() {
        log::debug!(target: "workspace", "Creating directory {}", dir.display());
    }
    fs::create_dir_all(dir).map_err(|source| WorkspaceError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    if !dir.is_dir() {
        return Err(WorkspaceError::NotADirectory(dir.to_path_buf()));
    }

    let probe = dir.join(WRITE_PROBE);
    File::create(&probe)
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|source| WorkspaceError::NotWritable {
            path: dir.to_path_buf(),
            source,
        })
}

/// Regular, non hidden files directly inside `dir`.
fn list_archives(dir: &Path) -> Result<Vec<Entry>, WorkspaceError> {
    let list_err = |source: io::Error| WorkspaceError::List {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(dir).map_err(list_err)? {
        let dir_entry = dir_entry.map_err(list_err)?;
        if dir_entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let metadata = dir_entry.metadata().map_err(list_err)?;
        if !metadata.is_file() {
            continue;
        }

        // not every filesystem records the birth time
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map_err(list_err)?;
        entries.push(Entry {
            path: dir_entry.path(),
            created,
        });
    }

    Ok(entries)
}

/// Names of the files in the staging directory, sorted.
pub fn staged_files(temp_dir: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    for dir_entry in fs::read_dir(temp_dir)? {
        let dir_entry = dir_entry?;
        if dir_entry.file_type()?.is_file() {
            files.push(dir_entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();

    Ok(files)
}

/// Removes everything inside the staging directory, but keeps the directory.
pub fn clear_staging(temp_dir: &Path) -> io::Result<()> {
    for dir_entry in fs::read_dir(temp_dir)? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();
        if dir_entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        log::trace!(target: "workspace", "Removed {}", path.display());
    }

    Ok(())
}
