//! Library to backup MySQL databases table by table.
//!
//! Every configured database is dumped into a staging directory, one file per
//! table, archived into the backup directory and optionally copied to remote
//! hosts using `scp`. The steps live in the following modules:
//!
//! - [`workspace`]: backup/staging directories and count based retention.
//! - [`backup`]: the per database dump run and the remote push.
//! - [`tools`]: argument vector invocations of `mysql`, `mysqldump`, `tar` and `scp`.

#![forbid(unsafe_code)]

pub mod backup;
pub mod cli;
pub mod config;
pub mod tools;
pub mod workspace;
