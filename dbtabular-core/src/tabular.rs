//! In-memory tabular results.
//!
//! A [`TabularResult`] is an ordered list of named columns whose values line up
//! by row position. Column names are kept exactly as the query returned them,
//! duplicates included.

use crate::{DbTabularError, Result};
use serde::Serialize;
use sqlx::postgres::{PgColumn, PgRow};
use sqlx::{Column as _, Row as _, TypeInfo as _};

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    Null,
    /// `bool`
    Boolean(bool),
    /// `int2`, `int4`, `int8`
    Integer(i64),
    /// `float4`, `float8`
    Float(f64),
    /// Every other type, in PostgreSQL's text form
    Text(String),
}

impl Value {
    /// Returns true for SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrows the text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write_float(f, *x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Writes a float the way delimited-text consumers expect: whole numbers keep
/// a fractional part ("3.0"), exponents carry a sign and at least two digits
/// ("1e+16", "1.5e-07"), and NaN is an empty cell.
fn write_float(f: &mut std::fmt::Formatter<'_>, x: f64) -> std::fmt::Result {
    if x.is_nan() {
        return Ok(());
    }

    let repr = format!("{x:?}");
    let Some((mantissa, exponent)) = repr.split_once('e') else {
        return f.write_str(&repr);
    };
    let (sign, digits) = exponent
        .strip_prefix('-')
        .map_or(("+", exponent), |digits| ("-", digits));
    write!(f, "{mantissa}e{sign}{digits:0>2}")
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One named column of a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Name as returned by the query
    pub name: String,
    /// One value per row
    pub values: Vec<Value>,
}

impl Column {
    /// Creates a column from its name and values.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Fully materialized result of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TabularResult {
    columns: Vec<Column>,
}

impl TabularResult {
    /// Builds a result from columns.
    ///
    /// # Errors
    /// Returns an error if the columns do not all hold the same number of values.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let expected = first.values.len();
            if let Some(bad) = columns.iter().find(|c| c.values.len() != expected) {
                return Err(DbTabularError::query_rejected(format!(
                    "Column '{}' has {} values, expected {}",
                    bad.name,
                    bad.values.len(),
                    expected
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Builds a result from column names and row-major values.
    ///
    /// # Errors
    /// Returns an error if any row's width differs from the number of names.
    pub fn from_rows<S, I>(names: I, rows: Vec<Vec<Value>>) -> Result<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        let mut columns: Vec<Column> = names
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DbTabularError::query_rejected(format!(
                    "Row {} has {} values, expected {}",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in result order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// First column with the given name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// True when there are no rows (columns may still be present).
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Values of row `index`, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.num_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }

    /// Iterates rows in result order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.num_rows()).map(|index| self.columns.iter().map(|c| &c.values[index]).collect())
    }

    /// Builds a result from PostgreSQL rows.
    ///
    /// `columns` describes the statement so that empty results keep their
    /// header. Rows are expected in text format (simple query protocol).
    pub(crate) fn from_pg_rows(columns: &[PgColumn], rows: &[PgRow]) -> Result<Self> {
        let mut result: Vec<Column> = columns
            .iter()
            .map(|c| Column::new(c.name(), Vec::with_capacity(rows.len())))
            .collect();

        for row in rows {
            for (ordinal, column) in result.iter_mut().enumerate() {
                column.values.push(decode_pg_value(row, ordinal, &column.name)?);
            }
        }

        Self::new(result)
    }
}

/// Decodes one cell by its PostgreSQL type.
///
/// Booleans, integers and floats keep their kind; every other type is carried
/// as PostgreSQL's own text rendering.
fn decode_pg_value(row: &PgRow, ordinal: usize, name: &str) -> Result<Value> {
    let parse_error =
        |e: sqlx::Error| DbTabularError::query_failed(format!("Failed to decode column '{name}'"), e);
    let type_name = row
        .try_column(ordinal)
        .map_err(parse_error)?
        .type_info()
        .name()
        .to_ascii_uppercase();

    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(ordinal).map_err(parse_error)?.into(),
        "INT2" => row
            .try_get::<Option<i16>, _>(ordinal)
            .map_err(parse_error)?
            .map(i64::from)
            .into(),
        "INT4" => row
            .try_get::<Option<i32>, _>(ordinal)
            .map_err(parse_error)?
            .map(i64::from)
            .into(),
        "INT8" => row.try_get::<Option<i64>, _>(ordinal).map_err(parse_error)?.into(),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(ordinal)
            .map_err(parse_error)?
            .map(f64::from)
            .into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(ordinal).map_err(parse_error)?.into(),
        _ => row
            .try_get_unchecked::<Option<String>, _>(ordinal)
            .map_err(parse_error)?
            .into(),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn sample() -> TabularResult {
        TabularResult::from_rows(
            ["id", "name", "score"],
            vec![
                vec![1.into(), "alice".into(), 9.5.into()],
                vec![2.into(), Value::Null, 7.0.into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_aligns_columns() {
        let result = sample();

        assert_eq!(result.column_names(), vec!["id", "name", "score"]);
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.num_columns(), 3);
        assert_eq!(
            result.column("name").unwrap().values,
            vec![Value::Text("alice".into()), Value::Null]
        );
        assert_eq!(
            result.row(1).unwrap(),
            vec![&Value::Integer(2), &Value::Null, &Value::Float(7.0)]
        );
        assert!(result.row(2).is_none());
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let err = TabularResult::from_rows(["a", "b"], vec![vec![Value::Null]]).unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn test_new_rejects_mismatched_columns() {
        let columns = vec![
            Column::new("a", vec![Value::Null, Value::Null]),
            Column::new("b", vec![Value::Null]),
        ];
        assert!(TabularResult::new(columns).is_err());
    }

    #[test]
    fn test_header_only_result() {
        let result = TabularResult::from_rows(["id", "name"], Vec::new()).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.column_names(), vec!["id", "name"]);
        assert_eq!(result.rows().count(), 0);
    }

    #[test]
    fn test_duplicate_column_names_preserved() {
        let result =
            TabularResult::from_rows(["id", "id"], vec![vec![1.into(), 2.into()]]).unwrap();
        assert_eq!(result.column_names(), vec!["id", "id"]);
        assert_eq!(result.num_columns(), 2);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Integer(-42).to_string(), "-42");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Text("a,b".into()).to_string(), "a,b");
    }

    #[test]
    fn test_float_display_edge_cases() {
        assert_eq!(Value::Float(1e16).to_string(), "1e+16");
        assert_eq!(Value::Float(1.5e-7).to_string(), "1.5e-07");
        assert_eq!(Value::Float(-2.5e100).to_string(), "-2.5e+100");
        assert_eq!(Value::Float(1e15).to_string(), "1000000000000000.0");
        assert_eq!(Value::Float(f64::NAN).to_string(), "");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::Float(f64::NEG_INFINITY).to_string(), "-inf");
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["columns"][0]["name"], "id");
        assert_eq!(json["columns"][1]["values"][1], serde_json::Value::Null);
        assert_eq!(json["columns"][2]["values"][0], 9.5);
    }
}
