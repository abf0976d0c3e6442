//! Catalog-backed directory of tables in one schema.
//!
//! [`TableDirectory`] queries `information_schema` once, when it is built, and
//! keeps one [`Table`] per name in catalog order. It is a snapshot: tables
//! created or dropped later are not reflected.
//!
//! Views are excluded by default. The exclusion is done by the database with
//! `EXCEPT`, so the result is the set of table-listing rows absent from the
//! view listing, duplicates collapsed.

use crate::config::{Config, load_config};
use crate::session::{Connector, TunnelConnector};
use crate::table::Table;
use crate::tabular::{TabularResult, Value};
use crate::{DbTabularError, Result};
use std::sync::Arc;

/// Column holding table names in catalog query results.
const TABLE_NAME_COLUMN: &str = "table_name";

/// Builds the catalog query for `schema`.
///
/// With `include_views` every row of `information_schema.tables` for the
/// schema is kept; otherwise rows also listed in `information_schema.views`
/// are removed with `EXCEPT`.
pub fn catalog_query(schema: &str, include_views: bool) -> String {
    let schema = quote_literal(schema);
    let table_query = format!(
        "SELECT table_name FROM information_schema.tables WHERE table_schema = {schema}"
    );

    if include_views {
        return table_query;
    }

    format!(
        "{table_query} EXCEPT SELECT table_name FROM information_schema.views WHERE table_schema = {schema}"
    )
}

/// Single-quoted SQL literal with embedded quotes doubled.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Tables (and optionally views) of one schema.
#[derive(Debug, Clone)]
pub struct TableDirectory {
    schema_name: String,
    include_views: bool,
    tables: Vec<Table>,
}

impl TableDirectory {
    /// Loads the configuration from the environment and enumerates the
    /// configured schema through the SSH tunnel.
    ///
    /// # Errors
    /// Configuration errors from loading, connection and query errors from the
    /// catalog query.
    pub async fn new(include_views: bool) -> Result<Self> {
        Self::from_config(load_config()?, include_views).await
    }

    /// Enumerates the schema named in `config` through the SSH tunnel.
    ///
    /// # Errors
    /// Connection and query errors from the catalog query.
    pub async fn from_config(config: Config, include_views: bool) -> Result<Self> {
        let schema = config.database.schema.clone();
        Self::with_connector(schema, include_views, Arc::new(TunnelConnector::new(config))).await
    }

    /// Enumerates `schema_name` using `connector` for the catalog query and
    /// for every table handle it creates.
    ///
    /// # Errors
    /// Connection and query errors from the catalog query, or a query error if
    /// the result has no `table_name` column.
    pub async fn with_connector(
        schema_name: impl Into<String>,
        include_views: bool,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let schema_name = schema_name.into();
        tracing::info!(
            "Enumerating tables in schema {} (include views: {})",
            schema_name,
            include_views
        );

        let catalog = connector
            .run_query(&catalog_query(&schema_name, include_views))
            .await?;
        let tables = table_names(&catalog)?
            .into_iter()
            .map(|name| Table::new(&name, Arc::clone(&connector)))
            .collect::<Vec<_>>();

        tracing::info!("Found {} tables in schema {}", tables.len(), schema_name);

        Ok(Self {
            schema_name,
            include_views,
            tables,
        })
    }

    /// Schema that was enumerated.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Whether views were kept in the listing.
    pub const fn include_views(&self) -> bool {
        self.include_views
    }

    /// Table handles in catalog order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when the schema has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table names in catalog order.
    pub fn list_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.table_name().to_string()).collect()
    }

    /// Finds a table by name, ignoring case.
    ///
    /// # Errors
    /// Returns [`DbTabularError::TableNotFound`] naming `name` when no table
    /// matches.
    pub fn lookup(&self, name: &str) -> Result<&Table> {
        let wanted = name.to_lowercase();
        self.tables
            .iter()
            .find(|t| t.table_name() == wanted)
            .ok_or_else(|| DbTabularError::table_not_found(name))
    }

    /// Looks up `name` and fetches all of its rows.
    ///
    /// # Errors
    /// Not-found errors from the lookup, then the fetch's own errors.
    pub async fn fetch(&self, name: &str) -> Result<TabularResult> {
        self.lookup(name)?.to_tabular().await
    }
}

/// Extracts table names from a catalog query result, preserving row order.
fn table_names(catalog: &TabularResult) -> Result<Vec<String>> {
    let column = catalog.column(TABLE_NAME_COLUMN).ok_or_else(|| {
        DbTabularError::query_rejected(format!(
            "Catalog query returned no {TABLE_NAME_COLUMN} column"
        ))
    })?;

    Ok(column
        .values
        .iter()
        .filter_map(|value| match value {
            Value::Text(name) => Some(name.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory `information_schema` for one schema.
    struct FakeCatalog {
        tables: Vec<&'static str>,
        views: Vec<&'static str>,
        queries: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn new(tables: Vec<&'static str>, views: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                tables,
                views,
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Connector for FakeCatalog {
        async fn run_query(&self, sql: &str) -> Result<TabularResult> {
            self.queries.lock().unwrap().push(sql.to_string());

            if let Some(table) = sql.strip_prefix("SELECT * FROM ") {
                return TabularResult::from_rows(["source"], vec![vec![table.into()]]);
            }

            let except_views = sql.contains(" EXCEPT ");
            let rows = self
                .tables
                .iter()
                .filter(|name| !(except_views && self.views.contains(name)))
                .map(|name| vec![Value::from(*name)])
                .collect();
            TabularResult::from_rows([TABLE_NAME_COLUMN], rows)
        }
    }

    /// information_schema.tables lists views too.
    fn public_schema() -> Arc<FakeCatalog> {
        FakeCatalog::new(vec!["users", "orders", "orders_view"], vec!["orders_view"])
    }

    #[test]
    fn test_catalog_query_excludes_views_with_except() {
        let query = catalog_query("public", false);
        assert_eq!(
            query,
            "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public' \
             EXCEPT SELECT table_name FROM information_schema.views WHERE table_schema = 'public'"
        );
    }

    #[test]
    fn test_catalog_query_with_views_skips_exclusion() {
        let query = catalog_query("public", true);
        assert!(!query.contains("EXCEPT"));
        assert!(!query.contains("information_schema.views"));
    }

    #[test]
    fn test_catalog_query_escapes_schema_literal() {
        let query = catalog_query("o'neil", true);
        assert!(query.ends_with("table_schema = 'o''neil'"));
    }

    #[tokio::test]
    async fn test_directory_without_views() {
        let directory = TableDirectory::with_connector("public", false, public_schema())
            .await
            .unwrap();

        assert_eq!(directory.list_names(), vec!["users", "orders"]);
        assert!(!directory.include_views());
        assert_eq!(directory.schema_name(), "public");
    }

    #[tokio::test]
    async fn test_directory_with_views() {
        let directory = TableDirectory::with_connector("public", true, public_schema())
            .await
            .unwrap();

        let names = directory.list_names();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"orders_view".to_string()));
    }

    #[tokio::test]
    async fn test_catalog_is_queried_once() {
        let catalog = public_schema();
        let directory = TableDirectory::with_connector("public", false, catalog.clone())
            .await
            .unwrap();

        directory.list_names();
        directory.lookup("users").unwrap();
        assert_eq!(catalog.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_names_are_lowercased() {
        let catalog = FakeCatalog::new(vec!["Users", "ORDERS"], vec![]);
        let directory = TableDirectory::with_connector("public", false, catalog)
            .await
            .unwrap();

        assert_eq!(directory.list_names(), vec!["users", "orders"]);
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let directory = TableDirectory::with_connector("public", false, public_schema())
            .await
            .unwrap();

        for variant in ["users", "USERS", "Users", "uSeRs"] {
            assert_eq!(directory.lookup(variant).unwrap().table_name(), "users");
        }
    }

    #[tokio::test]
    async fn test_lookup_missing_names_requested_table() {
        let directory = TableDirectory::with_connector("public", false, public_schema())
            .await
            .unwrap();

        let err = directory.lookup("Orders_View").unwrap_err();
        assert!(matches!(err, DbTabularError::TableNotFound { .. }));
        assert!(err.to_string().contains("Orders_View"));
    }

    #[tokio::test]
    async fn test_fetch_runs_select_for_looked_up_table() {
        let catalog = public_schema();
        let directory = TableDirectory::with_connector("public", false, catalog.clone())
            .await
            .unwrap();

        let result = directory.fetch("ORDERS").await.unwrap();

        assert_eq!(result.column("source").unwrap().values, vec![Value::from("orders")]);
        assert_eq!(
            catalog.queries.lock().unwrap().last().map(String::as_str),
            Some("SELECT * FROM orders")
        );
    }

    #[tokio::test]
    async fn test_fetch_unknown_table_runs_no_query() {
        let catalog = public_schema();
        let directory = TableDirectory::with_connector("public", false, catalog.clone())
            .await
            .unwrap();

        let err = directory.fetch("users; DROP TABLE users").await.unwrap_err();

        assert!(matches!(err, DbTabularError::TableNotFound { .. }));
        assert_eq!(catalog.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_catalog_result_without_table_name_column() {
        struct WrongShape;

        #[async_trait]
        impl Connector for WrongShape {
            async fn run_query(&self, _sql: &str) -> Result<TabularResult> {
                TabularResult::from_rows(["relname"], vec![vec!["users".into()]])
            }
        }

        let err = TableDirectory::with_connector("public", false, Arc::new(WrongShape))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("table_name"));
    }

    #[tokio::test]
    async fn test_empty_schema() {
        let catalog = FakeCatalog::new(vec![], vec![]);
        let directory = TableDirectory::with_connector("empty", false, catalog)
            .await
            .unwrap();

        assert!(directory.is_empty());
        assert_eq!(directory.len(), 0);
        assert!(directory.lookup("anything").is_err());
    }
}
