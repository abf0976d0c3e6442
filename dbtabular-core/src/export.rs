//! Flat-file export of tabular results.
//!
//! Two formats are supported: always-quoted CSV and single-sheet XLSX (behind
//! the `spreadsheet` feature). This module owns the rules shared by both:
//! where the file goes and what the worksheet is called.

pub mod csv;
#[cfg(feature = "spreadsheet")]
pub mod xlsx;

use std::path::{Path, PathBuf};

/// Longest worksheet name a spreadsheet accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

const ELLIPSIS: &str = "...";

/// Output file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Always-quoted comma-separated text
    Csv,
    /// Single-sheet Excel workbook
    #[cfg(feature = "spreadsheet")]
    Xlsx,
}

impl ExportFormat {
    /// File extension, without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            #[cfg(feature = "spreadsheet")]
            Self::Xlsx => "xlsx",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Resolves where an export of `table_name` is written.
///
/// A `path` already carrying the format's extension is the file itself,
/// unless it ends with a path separator. Anything else is a directory (empty means the working directory) and the
/// file inside it is named `<table_name>.<extension>`.
///
/// # Example
/// ```rust
/// use dbtabular_core::export::{ExportFormat, resolve_output_path};
/// use std::path::PathBuf;
///
/// assert_eq!(resolve_output_path("out.csv", "users", ExportFormat::Csv), PathBuf::from("out.csv"));
/// assert_eq!(resolve_output_path("out/", "users", ExportFormat::Csv), PathBuf::from("out/users.csv"));
/// assert_eq!(resolve_output_path("", "users", ExportFormat::Csv), PathBuf::from("users.csv"));
/// ```
pub fn resolve_output_path(
    path: impl AsRef<Path>,
    table_name: &str,
    format: ExportFormat,
) -> PathBuf {
    let path = path.as_ref();
    let names_directory = path
        .as_os_str()
        .to_string_lossy()
        .ends_with(std::path::is_separator);
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(format.extension()));

    if has_extension && !names_directory {
        return path.to_path_buf();
    }

    path.join(format!("{}.{}", table_name, format.extension()))
}

/// Worksheet name for a table.
///
/// Names up to 31 characters pass through; longer names keep their first 28
/// characters followed by `...`.
pub fn sheet_name(table_name: &str) -> String {
    if table_name.chars().count() <= MAX_SHEET_NAME_LEN {
        return table_name.to_string();
    }

    let keep = MAX_SHEET_NAME_LEN.saturating_sub(ELLIPSIS.len());
    let mut name: String = table_name.chars().take(keep).collect();
    name.push_str(ELLIPSIS);
    name
}
