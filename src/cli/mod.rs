use std::path::PathBuf;

use clap::Parser;

use crate::backup::RunOptions;

/// Default location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mysql_rbackup.toml";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Run verbosely.
    #[arg(short, long)]
    pub verbose: bool,

    /// Stop the slave while dumping (for backups on a slave database).
    #[arg(short, long)]
    pub slave: bool,

    /// Config file, a default one is written if it doesn't exist.
    #[arg(short, long, env = "MYSQL_RBACKUP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Simulative backup run.
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            verbose: self.verbose,
            slave_mode: self.slave,
            dry_run: self.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_flags() {
        let cli = Cli::try_parse_from(["mysql_rbackup", "-v", "-s", "-c", "/tmp/b.toml"]).unwrap();
        let opts = cli.run_options();

        assert!(opts.verbose);
        assert!(opts.slave_mode);
        assert!(!opts.dry_run);
        assert_eq!(cli.config, PathBuf::from("/tmp/b.toml"));
    }

    #[test]
    fn long_flags() {
        let cli = Cli::try_parse_from(["mysql_rbackup", "--verbose", "--slave", "--dry-run"]).unwrap();
        let opts = cli.run_options();

        assert!(opts.verbose && opts.slave_mode && opts.dry_run);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = Cli::try_parse_from(["mysql_rbackup", "--all"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
