//! Spreadsheet export.
//!
//! One worksheet, bold header row, no index column. Integers and floats are
//! written as numbers, booleans as booleans, and NULL and NaN cells are left
//! empty.

use crate::tabular::{TabularResult, Value};
use crate::{DbTabularError, Result};
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, Worksheet, XlsxError};
use std::path::Path;

/// Writes `result` into a new workbook at `path` on a sheet called `sheet`.
///
/// # Errors
/// Returns an export error for an invalid sheet name, a result that exceeds
/// the worksheet limits, or a failed save.
pub fn save_xlsx(result: &TabularResult, sheet: &str, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet)
        .map_err(|e| DbTabularError::export_failed(format!("Invalid sheet name '{sheet}'"), e))?;

    write_sheet(result, worksheet)?;

    workbook.save(path).map_err(|e| {
        DbTabularError::export_failed(format!("Failed to save workbook {}", path.display()), e)
    })
}

fn write_sheet(result: &TabularResult, worksheet: &mut Worksheet) -> Result<()> {
    let header_format = Format::new().set_bold();
    let cell_error = |e: XlsxError| DbTabularError::export_failed("Failed to write worksheet cell", e);

    for (col, name) in result.column_names().into_iter().enumerate() {
        worksheet
            .write_string_with_format(0, col_num(col)?, name, &header_format)
            .map_err(cell_error)?;
    }

    for (index, row) in result.rows().enumerate() {
        let row_num = row_num(index.saturating_add(1))?;
        for (col, value) in row.into_iter().enumerate() {
            let col = col_num(col)?;
            match value {
                Value::Null => {}
                Value::Float(x) if x.is_nan() => {}
                Value::Boolean(b) => {
                    worksheet.write_boolean(row_num, col, *b).map_err(cell_error)?;
                }
                #[allow(clippy::cast_precision_loss)]
                Value::Integer(i) => {
                    worksheet.write_number(row_num, col, *i as f64).map_err(cell_error)?;
                }
                Value::Float(x) => {
                    worksheet.write_number(row_num, col, *x).map_err(cell_error)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(row_num, col, s).map_err(cell_error)?;
                }
            }
        }
    }

    Ok(())
}

fn row_num(index: usize) -> Result<RowNum> {
    RowNum::try_from(index).map_err(|e| DbTabularError::export_failed("Too many rows for a worksheet", e))
}

fn col_num(index: usize) -> Result<ColNum> {
    ColNum::try_from(index)
        .map_err(|e| DbTabularError::export_failed("Too many columns for a worksheet", e))
}
