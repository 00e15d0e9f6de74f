//! Submission table abstraction
//!
//! Every source (xlsx workbook, Sheets values dump, live Sheets API) is
//! reduced to a [`SheetTable`]: one header row plus data rows padded to the
//! header width. Cell shape differences are kept in [`CellValue`] and
//! resolved in one place by [`CellValue::normalize`].

mod sheets_api;
mod workbook;

pub use sheets_api::{SheetsApiSource, ValuesFileSource, values_to_table};
pub use workbook::WorkbookSource;

use crate::error::ReportResult;
use serde_json::Value;

/// Raw value of one table cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    /// Multi-value cell, e.g. a form field holding several uploads
    List(Vec<String>),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Collapse the cell to a single trimmed string.
    ///
    /// Lists yield their first element that is non-empty after trimming.
    pub fn normalize(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.trim().to_string(),
            CellValue::List(items) => items
                .iter()
                .map(|item| item.trim())
                .find(|item| !item.is_empty())
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.normalize().is_empty()
    }

    /// Convert a JSON cell as returned by the Sheets values API
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::String(text) if text.is_empty() => CellValue::Empty,
            Value::String(text) => CellValue::Text(text.clone()),
            Value::Array(items) => CellValue::List(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Null => None,
                        Value::String(text) => Some(text.clone()),
                        other => Some(other.to_string()),
                    })
                    .collect(),
            ),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::from(value.as_str())
    }
}

/// Header row plus rectangular data rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetTable {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl SheetTable {
    /// Rows shorter than the header are padded with empty cells; cells
    /// beyond the header width are dropped.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() > width {
                    tracing::debug!(
                        extra = row.len() - width,
                        "dropping cells beyond header width"
                    );
                }
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Build from a grid of strings whose first row is the header
    pub fn from_strings<S: AsRef<str>>(grid: &[Vec<S>]) -> Self {
        let Some((header, rows)) = grid.split_first() else {
            return Self::default();
        };
        let headers = header.iter().map(|h| h.as_ref().to_string()).collect();
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| CellValue::from(cell.as_ref())).collect())
            .collect();
        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.rows.iter().map(|row| row.as_slice())
    }

    /// Locate a column by case-insensitive exact header match
    pub fn find_column(&self, name: &str) -> Option<usize> {
        let target = name.trim().to_lowercase();
        self.headers
            .iter()
            .position(|header| header.trim().to_lowercase() == target)
    }
}

/// Anything that can produce the submission table for a run
pub trait TableSource {
    /// Short description for log lines and error messages
    fn describe(&self) -> String;

    fn load(&self) -> ReportResult<SheetTable>;
}
