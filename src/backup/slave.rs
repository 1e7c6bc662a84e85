//! Stops the slave while a database is dumped, for a consistent snapshot of a replica.

use super::{RunReport, Unit};
use crate::tools::mysql::MySql;
use crate::tools::{Invocation, Runner, ToolError};

/// A stopped slave, started again by [`resume`](Self::resume) or on drop.
///
/// Implements [Runner] by delegation, so the dump runs through the guard.
pub struct PausedReplication<'r, R: Runner> {
    runner: &'r mut R,
    database: String,
    start_slave: Option<Invocation>,
}

impl<'r, R: Runner> PausedReplication<'r, R> {
    /// Stops the slave.
    ///
    /// The guard is returned even if stopping failed, so starting is attempted
    /// in any case.
    pub fn pause(runner: &'r mut R, client: &MySql<'_>) -> (Self, Result<(), ToolError>) {
        log::info!(target: "backup::slave", "Stopping the slave...");
        let stopped = runner.run(&client.stop_slave()).map(|_| ());

        let guard = Self {
            runner,
            database: client.database().name.clone(),
            start_slave: Some(client.start_slave()),
        };
        (guard, stopped)
    }

    /// Starts the slave.
    pub fn resume(mut self) -> Result<(), ToolError> {
        match self.start_slave.take() {
            Some(start_slave) => {
                log::info!(target: "backup::slave", "Restarting the slave...");
                self.runner.run(&start_slave).map(|_| ())
            }
            None => Ok(()),
        }
    }
}

impl<R: Runner> Runner for PausedReplication<'_, R> {
    fn run(&mut self, invocation: &Invocation) -> Result<String, ToolError> {
        self.runner.run(invocation)
    }
}

impl<R: Runner> Drop for PausedReplication<'_, R> {
    fn drop(&mut self) {
        if let Some(start_slave) = self.start_slave.take() {
            log::warn!(target: "backup::slave", "Restarting the slave of {} after an aborted dump", self.database);
            if let Err(e) = self.runner.run(&start_slave) {
                log::error!(target: "backup::slave", "Restarting the slave of {} failed: {e}", self.database);
            }
        }
    }
}

/// Runs `dump` while the slave is stopped.
///
/// The slave is started again exactly once, no matter whether stopping it or
/// the dump failed. Failures of either are logged and recorded in `report`.
pub fn with_replication_paused<R, T, F>(
    runner: &mut R,
    client: &MySql<'_>,
    report: &mut RunReport,
    dump: F,
) -> T
where
    R: Runner,
    F: FnOnce(&mut PausedReplication<'_, R>, &mut RunReport) -> T,
{
    let name = client.database().name.as_str();

    let (mut paused, stopped) = PausedReplication::pause(runner, client);
    if let Err(e) = stopped {
        log::error!(target: "backup::slave", "Stopping the slave for {name} failed, dumping anyway: {e}");
        report.record(Some(name), Unit::StopSlave, e);
    }

    let res = dump(&mut paused, report);

    if let Err(e) = paused.resume() {
        log::error!(target: "backup::slave", "Restarting the slave for {name} failed: {e}");
        report.record(Some(name), Unit::StartSlave, e);
    }

    res
}
