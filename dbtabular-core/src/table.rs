//! Handles for individual tables.
//!
//! A [`Table`] knows its (lower-cased) name and how to reach the database.
//! Every fetch opens a fresh session through its [`Connector`]; handles never
//! share a session.
//!
//! # Trust boundary
//! The table name is interpolated into `SELECT * FROM <name>` without quoting
//! or escaping. Names are expected to come from catalog metadata (see
//! [`crate::directory::TableDirectory`]) or from a trusted caller.

use crate::export::{self, ExportFormat};
use crate::session::Connector;
use crate::tabular::TabularResult;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One named table.
#[derive(Clone)]
pub struct Table {
    table_name: String,
    connector: Arc<dyn Connector>,
}

impl Table {
    /// Creates a handle; the name is stored lower-cased.
    pub fn new(table_name: &str, connector: Arc<dyn Connector>) -> Self {
        Self {
            table_name: table_name.to_lowercase(),
            connector,
        }
    }

    /// Canonical lower-case name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Query that materializes the whole table.
    pub fn select_all_query(&self) -> String {
        format!("SELECT * FROM {}", self.table_name)
    }

    /// Fetches every row of the table through a new session.
    ///
    /// # Errors
    /// Connection errors from opening the session, query errors from running it.
    pub async fn to_tabular(&self) -> Result<TabularResult> {
        tracing::debug!("Fetching table {}", self.table_name);
        self.connector.run_query(&self.select_all_query()).await
    }

    /// Fetches the table and writes it as always-quoted CSV.
    ///
    /// `path` ending in `.csv` is the output file; otherwise it is a directory
    /// (empty for the working directory) receiving `<table_name>.csv`.
    /// Returns the path written.
    ///
    /// # Errors
    /// Fetch errors, or I/O and export errors while writing.
    pub async fn save_as_csv(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let result = self.to_tabular().await?;
        let file_path = export::resolve_output_path(path, &self.table_name, ExportFormat::Csv);

        tracing::info!("Saving table {} to CSV file: {}", self.table_name, file_path.display());
        export::csv::save_csv(&result, &file_path)?;
        Ok(file_path)
    }

    /// Fetches the table and writes it as a single-sheet XLSX workbook.
    ///
    /// Path resolution mirrors [`Table::save_as_csv`] with the `xlsx`
    /// extension. The sheet is named after the table, shortened to 31
    /// characters when needed.
    ///
    /// # Errors
    /// Fetch errors, or export errors while writing.
    #[cfg(feature = "spreadsheet")]
    pub async fn save_as_xlsx(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let result = self.to_tabular().await?;
        let file_path = export::resolve_output_path(path, &self.table_name, ExportFormat::Xlsx);
        let sheet = export::sheet_name(&self.table_name);

        tracing::info!("Saving table {} to XLSX file: {}", self.table_name, file_path.display());
        export::xlsx::save_xlsx(&result, &sheet, &file_path)?;
        Ok(file_path)
    }

    /// Exports in the given format; see [`Table::save_as_csv`].
    ///
    /// # Errors
    /// As for the format-specific export.
    pub async fn save_as(&self, format: ExportFormat, path: impl AsRef<Path>) -> Result<PathBuf> {
        match format {
            ExportFormat::Csv => self.save_as_csv(path).await,
            #[cfg(feature = "spreadsheet")]
            ExportFormat::Xlsx => self.save_as_xlsx(path).await,
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.table_name == other.table_name
    }
}

impl Eq for Table {}
