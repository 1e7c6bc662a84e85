//! Dumps the configured databases table by table and archives the dumps.
//!
//! Databases are processed one after the other:
//!
//! 1. the staging directory is cleared,
//! 2. the slave is stopped if requested (see [`slave`]),
//! 3. every table is dumped into its own file in the staging directory,
//! 4. the slave is started again,
//! 5. the staging directory is archived into the backup directory and cleared,
//! 6. the archive is copied to the remotes (see [`remote`]).
//!
//! A failing table, archive or remote doesn't abort the run. The failure is
//! logged and collected in the [RunReport].

pub mod remote;
pub mod slave;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use derive_more::{Display, Error, From};

use crate::config::Config;
use crate::tools::mysql::{self, MySql};
use crate::tools::{tar, Runner, ToolError};
use crate::workspace;

/// Options of a backup run, set on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Log progress of the individual steps.
    pub verbose: bool,
    /// Stop the slave while dumping a database.
    pub slave_mode: bool,
    /// Don't alter any files, see [SystemRunner](crate::tools::SystemRunner).
    pub dry_run: bool,
}

/// Date and time of a run, shared by all archives created in the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp {
    date: String,
    time: String,
}

impl RunStamp {
    pub fn now() -> Self {
        Self::from(Local::now().naive_local())
    }

    /// Formatted as `YYYY-MM-DD`.
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Formatted as `HHMM`.
    pub fn time(&self) -> &str {
        &self.time
    }
}

impl From<NaiveDateTime> for RunStamp {
    fn from(datetime: NaiveDateTime) -> Self {
        Self {
            date: datetime.format("%Y-%m-%d").to_string(),
            time: datetime.format("%H%M").to_string(),
        }
    }
}

/// Fatal errors of a run.
#[derive(Debug, Display, Error)]
pub enum BackupError {
    /// The staging directory can't be listed or cleared.
    ///
    /// Continuing would mix dumps of different databases.
    #[display("Unable to clean staging directory {}: {source}", path.display())]
    Staging { path: PathBuf, source: io::Error },
}

/// Unit of work that failed.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Unit {
    #[display("stopping the slave")]
    StopSlave,
    #[display("starting the slave")]
    StartSlave,
    #[display("listing tables")]
    ListTables,
    #[display("dumping table `{_0}`")]
    Table(String),
    #[display("archiving to {}", _0.display())]
    Archive(PathBuf),
    #[display("copying to {_0}")]
    Remote(String),
    #[display("deleting old archive {}", _0.display())]
    Prune(PathBuf),
}

/// Why a unit of work failed.
#[derive(Debug, Display, Error, From)]
pub enum Cause {
    #[from]
    Tool(ToolError),
    #[from]
    Io(io::Error),
    #[display("table name would be read as an option")]
    InvalidTableName,
}

/// A failed unit of work.
#[derive(Debug)]
pub struct Failure {
    /// Database being backed up, none for the retention sweep.
    pub database: Option<String>,
    pub unit: Unit,
    pub cause: Cause,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(database) => write!(f, "[{database}] {}: {}", self.unit, self.cause),
            None => write!(f, "{}: {}", self.unit, self.cause),
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Archives created, in order.
    pub archives: Vec<PathBuf>,
    /// Non fatal failures, in order.
    pub failures: Vec<Failure>,
}

impl RunReport {
    pub fn record(&mut self, database: Option<&str>, unit: Unit, cause: impl Into<Cause>) {
        self.failures.push(Failure {
            database: database.map(str::to_string),
            unit,
            cause: cause.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Backups all databases of the [Config].
///
/// The workspace has to be prepared with [`workspace::prepare_workspace`] beforehand.
pub fn run_backups<R: Runner>(
    runner: &mut R,
    config: &Config,
    opts: RunOptions,
    stamp: &RunStamp,
) -> Result<RunReport, BackupError> {
    log::info!(target: "backup", "Starting backups...");
    let mut report = RunReport::default();

    for database in &config.databases {
        let client = MySql::new(&config.tools, database);
        backup_database(runner, config, &client, opts, stamp, &mut report)?;
    }

    Ok(report)
}

fn backup_database<R: Runner>(
    runner: &mut R,
    config: &Config,
    client: &MySql<'_>,
    opts: RunOptions,
    stamp: &RunStamp,
    report: &mut RunReport,
) -> Result<(), BackupError> {
    let name = client.database().name.as_str();
    log::info!(target: "backup::dump", "Backing up database {name}...");
    clean_staging(&config.temp_dir, opts.dry_run)?;

    let listed = if opts.slave_mode {
        slave::with_replication_paused(runner, client, report, |runner, report| {
            dump_tables(runner, client, &config.temp_dir, stamp, report)
        })
    } else {
        dump_tables(runner, client, &config.temp_dir, stamp, report)
    };

    if !listed {
        log::warn!(target: "backup::dump", "Skipping archive of {name}, its tables are unknown");
        return clean_staging(&config.temp_dir, opts.dry_run);
    }

    log::info!(target: "backup::dump", "Completed backups, zipping it up...");
    let archive = config
        .backup_dir
        .join(client.database().archive_name(stamp.date(), stamp.time()));
    let archived = archive_staging(runner, config, name, &archive, opts.dry_run, report)?;

    log::info!(target: "backup::dump", "Cleaning up...");
    clean_staging(&config.temp_dir, opts.dry_run)?;

    if archived && !config.remotes.is_empty() {
        remote::push_to_remotes(runner, &config.tools.scp, &archive, &config.remotes, name, report);
    }
    log::info!(target: "backup::dump", "Finished backup of database {name}");

    Ok(())
}

/// Dumps every table of the database into `temp_dir`.
///
/// Returns `false` if the tables couldn't be listed.
fn dump_tables<R: Runner>(
    runner: &mut R,
    client: &MySql<'_>,
    temp_dir: &Path,
    stamp: &RunStamp,
    report: &mut RunReport,
) -> bool {
    let name = client.database().name.as_str();

    let output = match runner.run(&client.show_tables()) {
        Ok(output) => output,
        Err(e) => {
            log::error!(target: "backup::dump", "Listing tables of {name} failed: {e}");
            report.record(Some(name), Unit::ListTables, e);
            return false;
        }
    };

    let tables = mysql::parse_tables(&output);
    if tables.is_empty() {
        log::warn!(target: "backup::dump", "Database {name} has no tables");
    }

    for (index, table) in tables.into_iter().enumerate() {
        if !mysql::is_valid_table_name(&table) {
            log::error!(target: "backup::dump", "Refusing to dump table `{table}` of {name}");
            report.record(Some(name), Unit::Table(table), Cause::InvalidTableName);
            continue;
        }

        log::info!(target: "backup::dump", "Backing up table {table}...");
        let dest = mysql::dump_path(temp_dir, &table, index, stamp.date(), stamp.time());
        if let Err(e) = runner.run(&client.dump_table(&table, dest)) {
            log::error!(target: "backup::dump", "Dumping table {table} of {name} failed: {e}");
            report.record(Some(name), Unit::Table(table), e);
        }
    }

    true
}

/// Archives the staging directory into `archive`.
///
/// Returns `false` if the archive couldn't be created, a partial archive is removed.
fn archive_staging<R: Runner>(
    runner: &mut R,
    config: &Config,
    name: &str,
    archive: &Path,
    dry_run: bool,
    report: &mut RunReport,
) -> Result<bool, BackupError> {
    let files = workspace::staged_files(&config.temp_dir).map_err(|source| BackupError::Staging {
        path: config.temp_dir.clone(),
        source,
    })?;
    log::debug!(target: "backup::dump", "Archiving {} file(s) into {}", files.len(), archive.display());

    let invocation = tar::create_archive(&config.tools.tar, archive, &config.temp_dir, &files);
    match runner.run(&invocation) {
        Ok(_) if dry_run => {
            log::info!(target: "backup::dump", "Dry run, would create {}", archive.display());
            Ok(true)
        }
        Ok(_) => {
            report.archives.push(archive.to_path_buf());
            Ok(true)
        }
        Err(e) => {
            log::error!(target: "backup::dump", "Archiving {name} failed: {e}");
            match fs::remove_file(archive) {
                Ok(()) => log::debug!(target: "backup::dump", "Removed partial archive {}", archive.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!(target: "backup::dump", "Removing partial archive {} failed: {e}", archive.display()),
            }
            report.record(Some(name), Unit::Archive(archive.to_path_buf()), e);
            Ok(false)
        }
    }
}

fn clean_staging(temp_dir: &Path, dry_run: bool) -> Result<(), BackupError> {
    if dry_run {
        return Ok(());
    }

    workspace::clear_staging(temp_dir).map_err(|source| BackupError::Staging {
        path: temp_dir.to_path_buf(),
        source,
    })
}
