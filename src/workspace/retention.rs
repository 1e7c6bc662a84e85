//! Count based retention of archives.

use std::path::PathBuf;
use std::time::SystemTime;

/// A file subject to retention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub created: SystemTime,
}

/// Keeps the newest `local_count` archives of every database.
///
/// Archives aren't attributed to databases, the backup directory as a whole
/// keeps at most `local_count * database_count` files.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Retention {
    keep: usize,
}

impl Retention {
    pub fn new(local_count: usize, database_count: usize) -> Self {
        Self {
            keep: local_count.saturating_mul(database_count),
        }
    }

    /// Number of files to keep.
    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Returns the entries to delete, oldest first.
    ///
    /// Entries are ordered by creation time, ties are broken by path.
    pub fn expired(&self, mut entries: Vec<Entry>) -> Vec<Entry> {
        if entries.len() <= self.keep {
            return Vec::new();
        }

        entries.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.path.cmp(&b.path)));
        let expired = entries.len() - self.keep;
        entries.truncate(expired);
        entries
    }
}
