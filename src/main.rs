use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use mysql_rbackup_lib::backup::{run_backups, RunReport, RunStamp, Unit};
use mysql_rbackup_lib::cli::Cli;
use mysql_rbackup_lib::config::{Config, ConfigError};
use mysql_rbackup_lib::tools::SystemRunner;
use mysql_rbackup_lib::workspace::prepare_workspace;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let opts = cli.run_options();
    // captured once, every archive of the run shares it
    let stamp = RunStamp::now();

    // init logger
    let mut env_logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if opts.verbose {
        env_logger.filter_level(LevelFilter::Info);
    }
    env_logger.try_init().expect("env_logger should not fail");

    let config = match load_config(&cli.config).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            log::error!(target: "config", "{e}");
            return ExitCode::FAILURE;
        }
    };

    if opts.dry_run {
        log::warn!("Running in dry-run mode");
    }

    let sweep = match prepare_workspace(
        &config.backup_dir,
        &config.temp_dir,
        config.local_count,
        config.databases.len(),
        opts.dry_run,
    ) {
        Ok(sweep) => sweep,
        Err(e) => {
            log::error!(target: "workspace", "Preparing the workspace failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut runner = SystemRunner::new(opts.dry_run);
    let mut report = match run_backups(&mut runner, &config, opts, &stamp) {
        Ok(report) => report,
        Err(e) => {
            log::error!(target: "backup", "Backup run resulted in a fatal error: {e}");
            return ExitCode::FAILURE;
        }
    };
    for (path, e) in sweep.failed {
        report.record(None, Unit::Prune(path), e);
    }

    summarize(&report)
}

/// Reads the config, writing the default config if there is none yet.
fn load_config(path: &Path) -> Result<Config, ConfigError> {
    match Config::from_file(path) {
        Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            log::warn!(
                target: "config",
                "Writing default config to {} because it doesn't exist yet",
                path.display()
            );
            let default_config = Config::default();
            match toml::to_string_pretty(&default_config) {
                Ok(config_str) => {
                    if let Err(e) = std::fs::write(path, config_str) {
                        log::warn!(target: "config", "Writing default config to {} failed {e}", path.display());
                    }
                }
                Err(e) => log::warn!(target: "config", "Serializing default config failed: {e}"),
            }

            Ok(default_config)
        }
        res => res,
    }
}

fn summarize(report: &RunReport) -> ExitCode {
    for archive in &report.archives {
        log::info!(target: "backup", "Created {}", archive.display());
    }
    if report.is_success() {
        log::info!(target: "backup", "And we're done!");
        return ExitCode::SUCCESS;
    }

    log::error!(
        target: "backup",
        "Backup finished with {} failure(s):",
        report.failures.len()
    );
    for failure in &report.failures {
        log::error!(target: "backup", "  {failure}");
    }

    ExitCode::FAILURE
}
