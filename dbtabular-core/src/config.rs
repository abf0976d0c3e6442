//! Connection configuration loaded from the environment.
//!
//! The eight required keys describe the database behind the tunnel and the SSH
//! host that forwards to it. An optional env file (`ENV_FILE_PATH`, default
//! `.env`) is merged into the process environment first; keys that are already
//! set always win.
//!
//! # Example
//! ```rust
//! use dbtabular_core::config::Config;
//! use std::collections::HashMap;
//!
//! let pairs: HashMap<&str, &str> = HashMap::from([
//!     ("DATABASE_HOST", "db.internal"),
//!     ("DATABASE_PORT", "5432"),
//!     ("DATABASE_NAME", "warehouse"),
//!     ("DATABASE_SCHEMA", "public"),
//!     ("DATABASE_USER", "reader"),
//!     ("DATABASE_PASSWORD", "secret"),
//!     ("SSH_HOST", "bastion.example.com"),
//!     ("SSH_PORT", "22"),
//!     ("SSH_USERNAME", "jump"),
//!     ("SSH_PASSWORD", "hunter2"),
//! ]);
//!
//! let config = Config::from_lookup(|key| pairs.get(key).map(|v| v.to_string())).unwrap();
//! assert_eq!(config.database.port, 5432);
//! assert_eq!(config.tunnel.host, "bastion.example.com");
//! ```

use crate::{DbTabularError, Result};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Environment variable naming the env file to merge before reading keys.
pub const ENV_FILE_PATH: &str = "ENV_FILE_PATH";
/// Env file used when `ENV_FILE_PATH` is not set.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Database host, resolved on the SSH server's side.
pub const DATABASE_HOST: &str = "DATABASE_HOST";
/// Database port (1-65535).
pub const DATABASE_PORT: &str = "DATABASE_PORT";
/// Database name.
pub const DATABASE_NAME: &str = "DATABASE_NAME";
/// Schema whose tables are listed.
pub const DATABASE_SCHEMA: &str = "DATABASE_SCHEMA";
/// Database user.
pub const DATABASE_USER: &str = "DATABASE_USER";
/// Database password; may be empty.
pub const DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";
/// SSH bastion host.
pub const SSH_HOST: &str = "SSH_HOST";
/// SSH bastion port (1-65535).
pub const SSH_PORT: &str = "SSH_PORT";
/// SSH username.
pub const SSH_USERNAME: &str = "SSH_USERNAME";
/// SSH password; may be empty.
pub const SSH_PASSWORD: &str = "SSH_PASSWORD";

/// Database reached through the tunnel.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Host as seen from the SSH server
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database name
    pub name: String,
    /// Schema whose tables are enumerated
    pub schema: String,
    /// Login role
    pub user: String,
    /// Redacted from `Debug`, zeroized on drop
    pub password: Zeroizing<String>,
}

/// SSH host that forwards to the database.
#[derive(Clone)]
pub struct TunnelConfig {
    /// SSH server host
    pub host: String,
    /// SSH server port
    pub port: u16,
    /// SSH login
    pub username: String,
    /// Redacted from `Debug`, zeroized on drop
    pub password: Zeroizing<String>,
}

/// Complete connection configuration.
///
/// Built once per session or directory; nothing caches it between calls.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target database
    pub database: DatabaseConfig,
    /// Bastion in front of it
    pub tunnel: TunnelConfig,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

impl std::fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

impl Config {
    /// Builds a configuration from an arbitrary key/value source.
    ///
    /// # Errors
    /// Returns a configuration error naming the first key that is absent,
    /// empty (passwords may be empty), not an integer, or a zero port.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                Some(_) => Err(DbTabularError::configuration(format!(
                    "{key} is set but empty"
                ))),
                None => Err(DbTabularError::configuration(format!("{key} is not set"))),
            }
        };
        let secret = |key: &str| -> Result<Zeroizing<String>> {
            lookup(key)
                .map(Zeroizing::new)
                .ok_or_else(|| DbTabularError::configuration(format!("{key} is not set")))
        };
        let port = |key: &str| -> Result<u16> { parse_port(key, &required(key)?) };

        let database = DatabaseConfig {
            host: required(DATABASE_HOST)?,
            port: port(DATABASE_PORT)?,
            name: required(DATABASE_NAME)?,
            schema: required(DATABASE_SCHEMA)?,
            user: required(DATABASE_USER)?,
            password: secret(DATABASE_PASSWORD)?,
        };

        let tunnel = TunnelConfig {
            host: required(SSH_HOST)?,
            port: port(SSH_PORT)?,
            username: required(SSH_USERNAME)?,
            password: secret(SSH_PASSWORD)?,
        };

        Ok(Self { database, tunnel })
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    /// See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    let port: u16 = value.trim().parse().map_err(|_| {
        DbTabularError::configuration(format!(
            "{key} must be an integer between 1 and 65535, got '{value}'"
        ))
    })?;
    if port == 0 {
        return Err(DbTabularError::configuration(format!(
            "{key} must be greater than 0"
        )));
    }
    Ok(port)
}

/// Path of the env file named by `ENV_FILE_PATH`, or `.env`.
pub fn env_file_path() -> PathBuf {
    std::env::var_os(ENV_FILE_PATH)
        .map_or_else(|| PathBuf::from(DEFAULT_ENV_FILE), PathBuf::from)
}

/// Loads the env file (if present) and reads the configuration.
///
/// Every call re-reads the environment.
///
/// # Errors
/// Returns a configuration error if the env file exists but cannot be parsed,
/// or if any required key is missing or malformed.
pub fn load_config() -> Result<Config> {
    load_config_from(env_file_path())
}

/// Like [`load_config`] with an explicit env file path.
///
/// # Errors
/// See [`load_config`].
pub fn load_config_from(env_file: impl AsRef<Path>) -> Result<Config> {
    let env_file = env_file.as_ref();
    if env_file.exists() {
        dotenvy::from_path(env_file).map_err(|e| {
            DbTabularError::configuration(format!(
                "Failed to load env file {}: {}",
                env_file.display(),
                e
            ))
        })?;
        tracing::debug!("Merged env file {}", env_file.display());
    } else {
        tracing::trace!("No env file at {}", env_file.display());
    }

    Config::from_env()
}
