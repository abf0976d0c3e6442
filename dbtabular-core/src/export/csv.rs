//! Delimited-text export.
//!
//! UTF-8, comma separated, every field quoted, one header row, no index column.

use crate::tabular::TabularResult;
use crate::{DbTabularError, Result};
use ::csv::{QuoteStyle, Terminator, WriterBuilder};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes `result` as always-quoted CSV.
///
/// # Errors
/// Returns an export error if the writer fails.
pub fn write_csv<W: Write>(result: &TabularResult, writer: W) -> Result<()> {
    let mut csv_writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer);

    csv_writer
        .write_record(result.column_names())
        .map_err(|e| DbTabularError::export_failed("Failed to write CSV header", e))?;

    for (index, row) in result.rows().enumerate() {
        csv_writer
            .write_record(row.iter().map(ToString::to_string))
            .map_err(|e| DbTabularError::export_failed(format!("Failed to write CSV row {index}"), e))?;
    }

    csv_writer
        .flush()
        .map_err(|e| DbTabularError::io("Failed to flush CSV output", e))
}

/// Creates (or truncates) `path` and writes `result` into it.
///
/// # Errors
/// Returns an I/O error if the file cannot be created, or an export error if
/// writing fails.
pub fn save_csv(result: &TabularResult, path: &Path) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| DbTabularError::io(format!("Failed to create {}", path.display()), e))?;
    write_csv(result, std::io::BufWriter::new(file))
}
