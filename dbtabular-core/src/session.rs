//! Database sessions layered over an SSH tunnel.
//!
//! A [`Session`] owns exactly one tunnel and one PostgreSQL connection. It is
//! never pooled or shared: every fetch opens its own session and releases it
//! before returning.
//!
//! # Teardown
//! [`Session::close`] closes the database connection first and then stops the
//! tunnel. Dropping a session without closing it still cancels the tunnel's
//! forwarding task and the connection's socket is released with it.

use crate::config::{Config, DatabaseConfig};
use crate::tabular::TabularResult;
use crate::tunnel::SshTunnel;
use crate::{DbTabularError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgColumn, PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Executor, Statement};

/// Lifecycle of a [`Session`].
///
/// A session is `Connected` once opened. It becomes `Closed` after
/// [`Session::close`] or when a query fails because the connection was lost;
/// a closed session rejects further queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Queries can run
    Connected,
    /// Connection and tunnel released
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// One tunnel plus one read-only database connection.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    connection: Option<PgConnection>,
    tunnel: Option<SshTunnel>,
}

impl Session {
    /// Opens the tunnel, then the database connection through it.
    ///
    /// # Errors
    /// Returns a connection error if either step fails. A tunnel opened before
    /// a failed database connect is stopped before the error is returned.
    pub async fn open(config: &Config) -> Result<Self> {
        let tunnel =
            SshTunnel::open(&config.tunnel, &config.database.host, config.database.port).await?;

        match connect(&config.database, "127.0.0.1", tunnel.local_port()).await {
            Ok(connection) => Ok(Self {
                state: SessionState::Connected,
                connection: Some(connection),
                tunnel: Some(tunnel),
            }),
            Err(e) => {
                tunnel.stop().await;
                Err(e)
            }
        }
    }

    /// Connects straight to the configured database host without a tunnel.
    ///
    /// # Errors
    /// Returns a connection error if the database refuses the connection.
    pub async fn connect_direct(database: &DatabaseConfig) -> Result<Self> {
        let connection = connect(database, &database.host, database.port).await?;
        Ok(Self {
            state: SessionState::Connected,
            connection: Some(connection),
            tunnel: None,
        })
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Runs one read query and materializes every row.
    ///
    /// # Errors
    /// Returns a query error on invalid SQL, missing privileges, a dropped
    /// connection, or when the session is closed. A lost connection closes the
    /// session; it is not reconnected.
    pub async fn execute_query(&mut self, sql: &str) -> Result<TabularResult> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(DbTabularError::query_rejected(format!(
                "Session is {}, cannot run queries",
                self.state
            )));
        };

        tracing::debug!("Executing query: {}", sql);

        match run_query(connection, sql).await {
            Ok((columns, rows)) => {
                let result = TabularResult::from_pg_rows(&columns, &rows)?;
                tracing::debug!(
                    "Query returned {} rows across {} columns",
                    result.num_rows(),
                    result.num_columns()
                );
                Ok(result)
            }
            Err((context, e)) => {
                if is_connection_lost(&e) {
                    tracing::warn!("Database connection lost, closing session");
                    self.close().await;
                }
                Err(DbTabularError::query_failed(context, e))
            }
        }
    }

    /// Closes the database connection, then stops the tunnel.
    ///
    /// Closing twice is a no-op. Teardown problems are logged, never returned:
    /// the caller's own result takes precedence.
    pub async fn close(&mut self) {
        if let Some(connection) = self.connection.take()
            && let Err(e) = connection.close().await
        {
            tracing::warn!("Failed to close database connection cleanly: {}", e);
        }

        if let Some(tunnel) = self.tunnel.take()
            && tunnel.is_active()
        {
            tunnel.stop().await;
        }

        if self.state != SessionState::Closed {
            self.state = SessionState::Closed;
            tracing::debug!("Session closed");
        }
    }
}

type QueryOutput = (Vec<PgColumn>, Vec<PgRow>);

/// Describes `sql` for its column names, then runs it with the simple query
/// protocol so every value arrives in text form.
async fn run_query(
    connection: &mut PgConnection,
    sql: &str,
) -> std::result::Result<QueryOutput, (&'static str, sqlx::Error)> {
    // Describing the statement first keeps column names for empty results.
    let columns = {
        let statement = (&mut *connection)
            .prepare(sql)
            .await
            .map_err(|e| ("Failed to prepare query", e))?;
        statement.columns().to_vec()
    };

    let rows = (&mut *connection)
        .fetch_all(sqlx::raw_sql(sql))
        .await
        .map_err(|e| ("Failed to execute query", e))?;

    Ok((columns, rows))
}

/// True when `error` means the connection itself is unusable.
fn is_connection_lost(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed
    )
}

async fn connect(database: &DatabaseConfig, host: &str, port: u16) -> Result<PgConnection> {
    let options = PgConnectOptions::new()
        .host(host)
        .port(port)
        .database(&database.name)
        .username(&database.user)
        .password(database.password.as_str())
        .application_name(concat!("dbtabular-", env!("CARGO_PKG_VERSION")));

    let mut connection = PgConnection::connect_with(&options).await.map_err(|e| {
        DbTabularError::connection_failed(
            format!(
                "Failed to connect to database {} as {} via {}:{}",
                database.name, database.user, host, port
            ),
            e,
        )
    })?;

    if let Err(e) = connection
        .execute("SET default_transaction_read_only = on")
        .await
    {
        let _ = connection.close().await;
        return Err(DbTabularError::connection_failed(
            "Failed to enable read-only mode for session",
            e,
        ));
    }

    tracing::debug!("Connected to database {} via {}:{}", database.name, host, port);
    Ok(connection)
}

/// Source of query results, one fresh session per call.
///
/// Table handles and the table directory only ever see this trait, so the
/// transport can be swapped (tunnel, direct, in-memory catalog in tests).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a session, runs `sql`, and releases the session on every path.
    ///
    /// # Errors
    /// Connection errors from opening the session, query errors from the run.
    async fn run_query(&self, sql: &str) -> Result<TabularResult>;
}

/// Connects through the configured SSH tunnel for every query.
#[derive(Debug, Clone)]
pub struct TunnelConnector {
    config: Config,
}

impl TunnelConnector {
    /// Creates a connector that tunnels every session through `config.tunnel`.
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TunnelConnector {
    async fn run_query(&self, sql: &str) -> Result<TabularResult> {
        let mut session = Session::open(&self.config).await?;
        let result = session.execute_query(sql).await;
        session.close().await;
        result
    }
}

/// Connects directly to the database host for every query.
#[derive(Debug, Clone)]
pub struct DirectConnector {
    database: DatabaseConfig,
}

impl DirectConnector {
    /// Creates a connector for a database reachable without a tunnel.
    pub fn new(database: DatabaseConfig) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Connector for DirectConnector {
    async fn run_query(&self, sql: &str) -> Result<TabularResult> {
        let mut session = Session::connect_direct(&self.database).await?;
        let result = session.execute_query(sql).await;
        session.close().await;
        result
    }
}
