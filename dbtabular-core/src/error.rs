//! Error types with credential sanitization.
//!
//! Errors raised while opening tunnels or database connections never carry
//! passwords. Connection contexts name hosts and ports only.

use thiserror::Error;

/// Main error type for dbtabular operations.
///
/// Every error propagates straight to the caller: nothing in this crate
/// retries or falls back silently.
#[derive(Debug, Error)]
pub enum DbTabularError {
    /// Required configuration key missing or malformed
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Tunnel or database connection could not be established
    #[error("Connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// SQL execution failed, or the session can no longer run queries
    #[error("Query execution failed: {context}")]
    QueryExecution {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No table in the directory matches the requested name
    #[error("Table {name} not found in database")]
    TableNotFound { name: String },

    /// Writing a delimited-text or spreadsheet file failed
    #[error("Export failed: {context}")]
    Export {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results with DbTabularError
pub type Result<T> = std::result::Result<T, DbTabularError>;

impl DbTabularError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a connection error with sanitized context
    ///
    /// The context must not contain credentials; callers pass host and port
    /// information only.
    pub fn connection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a connection error without an underlying source error
    pub fn connection_refused(context: impl Into<String>) -> Self {
        let context = context.into();
        Self::Connection {
            source: context.clone().into(),
            context,
        }
    }

    /// Creates a query execution error caused by a driver error
    pub fn query_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::QueryExecution {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a query execution error with no underlying driver error
    pub fn query_rejected(context: impl Into<String>) -> Self {
        Self::QueryExecution {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a not-found error for the requested table name
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    /// Creates an export error with context
    pub fn export_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Export {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_creation() {
        let error = DbTabularError::configuration("DATABASE_PORT is not set");
        assert!(error.to_string().contains("DATABASE_PORT"));

        let error = DbTabularError::query_rejected("session is closed");
        assert!(error.to_string().contains("session is closed"));
        assert!(error.source().is_none());
    }

    #[test]
    fn test_table_not_found_names_table() {
        let error = DbTabularError::table_not_found("Missing_Table");
        assert_eq!(error.to_string(), "Table Missing_Table not found in database");
    }

    #[test]
    fn test_connection_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = DbTabularError::connection_failed("SSH connect to bastion:22", io);

        assert!(error.to_string().contains("bastion:22"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_connection_refused_has_message_source() {
        let error = DbTabularError::connection_refused("SSH authentication rejected");
        let source = error.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("SSH authentication rejected"));
    }
}
