//! Invocations of the MySQL client and `mysqldump`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::{Invocation, Output};
use crate::config::{DatabaseTarget, ToolsConfig};

/// Passing the password through the environment keeps it out of `ps` and logs.
const PASSWORD_ENV: &str = "MYSQL_PWD";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.$-]").expect("regex should be valid"));

/// Builds the invocations concerning a single database.
#[derive(Debug, Clone, Copy)]
pub struct MySql<'a> {
    tools: &'a ToolsConfig,
    database: &'a DatabaseTarget,
}

impl<'a> MySql<'a> {
    pub fn new(tools: &'a ToolsConfig, database: &'a DatabaseTarget) -> Self {
        Self { tools, database }
    }

    pub fn database(&self) -> &DatabaseTarget {
        self.database
    }

    fn with_credentials(&self, program: &str) -> Invocation {
        let invocation =
            Invocation::new(program).arg(format!("--user={}", self.database.user));
        if self.database.password.is_empty() {
            invocation
        } else {
            invocation.env(PASSWORD_ENV, &self.database.password)
        }
    }

    fn execute(&self, statement: &str) -> Invocation {
        self.with_credentials(&self.tools.mysql)
            .arg(format!("--execute={statement}"))
    }

    /// `STOP SLAVE` on the server of the database.
    pub fn stop_slave(&self) -> Invocation {
        self.execute("STOP SLAVE")
    }

    /// `START SLAVE` on the server of the database.
    pub fn start_slave(&self) -> Invocation {
        self.execute("START SLAVE")
    }

    /// Lists the tables of the database, parse the result with [parse_tables].
    pub fn show_tables(&self) -> Invocation {
        self.with_credentials(&self.tools.mysql)
            .args(["--batch", "--raw", "--skip-column-names"])
            .arg("--execute=SHOW TABLES")
            .arg(&self.database.name)
            .output(Output::Capture)
            .read_only()
    }

    /// Dumps a single table into `dest`.
    pub fn dump_table(&self, table: &str, dest: PathBuf) -> Invocation {
        self.with_credentials(&self.tools.mysqldump)
            .args([
                "--add-drop-table",
                "--allow-keywords",
                "--quick",
                "--complete-insert",
            ])
            .arg(&self.database.name)
            .arg(table)
            .output(Output::File(dest))
    }
}

/// Table names of the `SHOW TABLES` output.
///
/// Blank lines and a `Tables_in_<db>` header are skipped, names are trimmed.
pub fn parse_tables(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Tables_in_"))
        .map(str::to_string)
        .collect()
}

/// A table name is passed as argument of `mysqldump`, it must not look like an option.
pub fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty() && !table.starts_with('-')
}

/// Path of the dump file of `table`, the `index`th table of the database.
///
/// Characters that aren't safe in a file name are replaced by `_`. A name
/// altered that way gets `~<index>` appended, as different tables may map
/// to the same name and `~` never occurs in an unaltered one.
pub fn dump_path(staging: &Path, table: &str, index: usize, date: &str, time: &str) -> PathBuf {
    let sanitized = UNSAFE_FILENAME_CHARS.replace_all(table, "_");
    // ".." would otherwise survive as a file name prefix
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized == table {
        staging.join(format!("{table}.{date}.{time}.sql"))
    } else {
        staging.join(format!("{sanitized}~{index}.{date}.{time}.sql"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database(spec: &str) -> DatabaseTarget {
        spec.parse().unwrap()
    }

    #[test]
    fn password_only_in_env() {
        let tools = ToolsConfig::default();
        let db = database("sales, backup, s3cr3t");
        let invocation = MySql::new(&tools, &db).show_tables();

        assert_eq!(invocation.get_env(PASSWORD_ENV), Some("s3cr3t"));
        assert!(invocation.get_args().iter().all(|a| !a.contains("s3cr3t")));
    }

    #[test]
    fn anonymous_without_password_env() {
        let tools = ToolsConfig::default();
        let db = database("sales, backup,");
        let invocation = MySql::new(&tools, &db).stop_slave();

        assert_eq!(invocation.get_env(PASSWORD_ENV), None);
        assert_eq!(
            invocation.get_args(),
            ["--user=backup", "--execute=STOP SLAVE"]
        );
        assert!(!invocation.is_read_only());
    }

    #[test]
    fn show_tables_is_read_only_and_captured() {
        let tools = ToolsConfig::default();
        let db = database("sales, backup,");
        let invocation = MySql::new(&tools, &db).show_tables();

        assert!(invocation.is_read_only());
        assert_eq!(invocation.get_output(), &Output::Capture);
        assert_eq!(invocation.get_args().last().unwrap(), "sales");
    }

    #[test]
    fn dump_table_args() {
        let tools = ToolsConfig {
            mysqldump: "/opt/mysql/bin/mysqldump".into(),
            ..Default::default()
        };
        let db = database("sales, backup,");
        let invocation = MySql::new(&tools, &db).dump_table("orders; rm -rf /", "/s/o.sql".into());

        assert_eq!(invocation.program(), "/opt/mysql/bin/mysqldump");
        assert_eq!(
            invocation.get_args(),
            [
                "--user=backup",
                "--add-drop-table",
                "--allow-keywords",
                "--quick",
                "--complete-insert",
                "sales",
                "orders; rm -rf /",
            ]
        );
        assert_eq!(invocation.get_output(), &Output::File("/s/o.sql".into()));
    }

    #[test]
    fn show_tables_unescaped() {
        let tools = ToolsConfig::default();
        let db = database("sales, backup,");
        let invocation = MySql::new(&tools, &db).show_tables();

        assert!(invocation.get_args().iter().any(|a| a == "--raw"));
    }

    #[test]
    fn altered_dump_paths_dont_collide() {
        let staging = Path::new("/staging");
        let tables = ["café", "cafè", "order items", "order_items", "表一", "表二"];
        let mut paths: Vec<_> = tables
            .iter()
            .enumerate()
            .map(|(index, table)| dump_path(staging, table, index, "d", "t"))
            .collect();
        assert_eq!(paths[3], Path::new("/staging/order_items.d.t.sql"));
        assert_eq!(paths[2], Path::new("/staging/order_items~2.d.t.sql"));

        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), tables.len());
    }

    #[test]
    fn parse_show_tables() {
        let output = "Tables_in_sales\ncustomers\n  orders \r\n\n";
        assert_eq!(parse_tables(output), ["customers", "orders"]);
        assert!(parse_tables("").is_empty());
    }

    #[test]
    fn table_names_as_arguments() {
        assert!(is_valid_table_name("orders"));
        assert!(is_valid_table_name("order items"));
        assert!(!is_valid_table_name("--where=1"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn dump_paths_stay_in_staging() {
        let staging = Path::new("/staging");
        assert_eq!(
            dump_path(staging, "orders", 0, "2024-03-01", "0230"),
            Path::new("/staging/orders.2024-03-01.0230.sql")
        );
        assert_eq!(
            dump_path(staging, "../../etc/passwd", 1, "2024-03-01", "0230"),
            Path::new("/staging/_.._etc_passwd~1.2024-03-01.0230.sql")
        );
        assert_eq!(
            dump_path(staging, "a b`c", 2, "d", "t"),
            Path::new("/staging/a_b_c~2.d.t.sql")
        );
    }
}
