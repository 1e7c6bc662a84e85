//! Configuration of databases, directories, remotes and the external tools.

use std::fmt;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use derive_more::{Display, Error, From};

const DEFAULT_SCP_PORT: u16 = 22;

/// Errors on reading or validating the [Config].
#[derive(Debug, Display, Error, From)]
pub enum ConfigError {
    /// A database entry isn't of the form `name, user, password`.
    #[display("Malformed database entry `{_0}`, expected `name, user, password`")]
    MalformedDatabase(#[error(ignore)] String),
    /// A remote entry isn't of the form `user@host:path, port`.
    #[display("Malformed remote entry `{_0}`, expected `user@host:path, port`")]
    MalformedRemote(#[error(ignore)] String),
    /// The port of a remote entry is no valid port number.
    #[display("Invalid port in remote entry `{spec}`: {source}")]
    InvalidPort { spec: String, source: ParseIntError },
    /// A name would be interpreted as an option by the external tools.
    #[display("`{_0}` must not start with '-'")]
    LeadingDash(#[error(ignore)] String),
    /// Without databases the retention would remove every backup.
    #[display("No databases configured")]
    NoDatabases,
    /// The config file can't be read.
    #[display("Reading the config file {} failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// The config file isn't valid.
    #[from]
    #[display("Parsing the config file failed: {_0}")]
    Parse(toml::de::Error),
}

/// Credentials of a database to backup.
///
/// Written as `"name, user, password"` in the config file. The password may
/// be blank or left out for anonymous authentication.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseTarget {
    pub name: String,
    pub user: String,
    pub password: String,
}

// Mask the password, it must not end up in any log.
impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("DatabaseTarget")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &password)
            .finish()
    }
}

impl DatabaseTarget {
    /// File name of the archive holding the dump of this database.
    pub fn archive_name(&self, date: &str, time: &str) -> String {
        format!("{}.{date}.{time}.tgz", self.name)
    }
}

impl FromStr for DatabaseTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.splitn(3, ',');
        let (Some(name), Some(user)) = (fields.next(), fields.next()) else {
            return Err(ConfigError::MalformedDatabase(s.to_string()));
        };
        let (name, user) = (name.trim(), user.trim());
        let password = fields.next().map(str::trim).unwrap_or_default();

        if name.is_empty() || user.is_empty() {
            return Err(ConfigError::MalformedDatabase(s.to_string()));
        }
        if name.starts_with('-') {
            return Err(ConfigError::LeadingDash(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

impl TryFrom<String> for DatabaseTarget {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatabaseTarget> for String {
    fn from(value: DatabaseTarget) -> Self {
        format!("{}, {}, {}", value.name, value.user, value.password)
    }
}

/// Destination of an `scp` copy.
///
/// Written as `"user@host:path, port"` in the config file, the port defaults to 22.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteTarget {
    /// Destination in `scp` notation: `user@host:path`.
    pub host_spec: String,
    pub port: u16,
}

impl RemoteTarget {
    /// Host part of the destination, used to identify the remote in logs.
    pub fn host(&self) -> &str {
        self.host_spec
            .split_once(':')
            .map_or(self.host_spec.as_str(), |(host, _)| host)
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (port {})", self.host_spec, self.port)
    }
}

impl FromStr for RemoteTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host_spec, port) = match s.split_once(',') {
            Some((host_spec, port)) => {
                let port = port
                    .trim()
                    .parse()
                    .map_err(|source| ConfigError::InvalidPort {
                        spec: s.to_string(),
                        source,
                    })?;
                (host_spec.trim(), port)
            }
            None => (s.trim(), DEFAULT_SCP_PORT),
        };

        // without a colon scp would copy locally
        let Some((host, _path)) = host_spec.split_once(':') else {
            return Err(ConfigError::MalformedRemote(s.to_string()));
        };
        if host.is_empty() {
            return Err(ConfigError::MalformedRemote(s.to_string()));
        }
        if host_spec.starts_with('-') {
            return Err(ConfigError::LeadingDash(host_spec.to_string()));
        }

        Ok(Self {
            host_spec: host_spec.to_string(),
            port,
        })
    }
}

impl TryFrom<String> for RemoteTarget {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RemoteTarget> for String {
    fn from(value: RemoteTarget) -> Self {
        format!("{}, {}", value.host_spec, value.port)
    }
}

/// Programs invoked for the individual backup steps.
///
/// Either a name looked up in `PATH` or a full path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// SQL client used to list tables and to stop/start the slave.
    pub mysql: String,
    /// Dump tool writing SQL statements of a single table to stdout.
    pub mysqldump: String,
    /// Archiver creating the gzip compressed tarball.
    pub tar: String,
    /// Secure copy to the remotes.
    pub scp: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mysql: "mysql".into(),
            mysqldump: "mysqldump".into(),
            tar: "tar".into(),
            scp: "scp".into(),
        }
    }
}

/// Configuration of a backup run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Databases to backup, in order.
    #[serde(default)]
    pub databases: Vec<DatabaseTarget>,

    /// Directory keeping the archives.
    pub backup_dir: PathBuf,

    /// Staging directory for the table dumps.
    ///
    /// Should be located near the [`backup_dir`](Self::backup_dir) and not be shared
    /// with other programs, since it's emptied on every run.
    pub temp_dir: PathBuf,

    /// Remotes every archive is copied to, in order.
    #[serde(default)]
    pub remotes: Vec<RemoteTarget>,

    /// Archives to keep per database in the [`backup_dir`](Self::backup_dir).
    #[serde(default = "default_local_count")]
    pub local_count: usize,

    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_local_count() -> usize {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            backup_dir: PathBuf::from("/var/backups/mysql"),
            temp_dir: PathBuf::from("/var/backups/mysql-staging"),
            remotes: Vec::new(),
            local_count: default_local_count(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Reads the [Config] from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&config_str)?;
        log::debug!(target: "config", "Read config from {}", path.display());

        Ok(config)
    }

    /// Checks the [Config] is usable for a backup run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.databases.is_empty() {
            return Err(ConfigError::NoDatabases);
        }
        if self.backup_dir.is_relative() {
            log::warn!(target: "config", "backup_dir is relative: {}", self.backup_dir.display());
        }
        if self.temp_dir.is_relative() {
            log::warn!(target: "config", "temp_dir is relative: {}", self.temp_dir.display());
        }

        Ok(())
    }
}
