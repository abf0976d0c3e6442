//! Core library for DBTabular.
//!
//! DBTabular reads whole tables from a PostgreSQL database that is only
//! reachable through an SSH bastion, and exports them as CSV or XLSX files.
//!
//! # Architecture
//! - [`config`] loads connection settings from the environment (optionally
//!   seeded from a `.env` file).
//! - [`tunnel`] forwards a local loopback port to the database through SSH.
//! - [`session`] pairs a tunnel with a read-only database connection and runs
//!   one query at a time. [`Connector`] opens a fresh session per query.
//! - [`directory`] enumerates the tables of a schema; [`table`] fetches and
//!   exports one table.
//! - [`tabular`] is the column-oriented result model; [`export`] writes it.
//!
//! # Security
//! - Passwords are zeroized on drop and redacted from `Debug` output
//! - Database sessions are read-only
//! - Table names only reach SQL after a catalog lookup, unless a caller
//!   builds a [`Table`] by hand

pub mod config;
pub mod directory;
pub mod error;
pub mod export;
pub mod logging;
pub mod session;
pub mod table;
pub mod tabular;
pub mod tunnel;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig, TunnelConfig, load_config, load_config_from};
pub use directory::TableDirectory;
pub use error::{DbTabularError, Result};
pub use export::ExportFormat;
pub use logging::init_logging;
pub use session::{Connector, DirectConnector, Session, SessionState, TunnelConnector};
pub use table::Table;
pub use tabular::{Column, TabularResult, Value};
pub use tunnel::SshTunnel;
