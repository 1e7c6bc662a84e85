//! Copies archives to the configured remotes.

use std::path::Path;

use super::{RunReport, Unit};
use crate::config::RemoteTarget;
use crate::tools::{scp, Runner};

/// Copies `archive` to every remote, in order.
///
/// A failed copy is logged and recorded in `report`, the remaining remotes are
/// still tried. Returns the number of successful copies.
pub fn push_to_remotes<R: Runner>(
    runner: &mut R,
    program: &str,
    archive: &Path,
    remotes: &[RemoteTarget],
    database: &str,
    report: &mut RunReport,
) -> usize {
    let mut copied = 0;
    for remote in remotes {
        log::info!(target: "backup::remote", "Copying file to host {}...", remote.host());

        match runner.run(&scp::copy_to(program, archive, remote)) {
            Ok(_) => copied += 1,
            Err(e) => {
                log::error!(target: "backup::remote", "Copying {} to {remote} failed: {e}", archive.display());
                report.record(Some(database), Unit::Remote(remote.host().to_string()), e);
            }
        }
    }

    copied
}
