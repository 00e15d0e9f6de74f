use super::{CellValue, SheetTable, TableSource};
use crate::error::{ReportError, ReportResult};
use std::path::{Path, PathBuf};
use umya_spreadsheet::Worksheet;
use umya_spreadsheet::reader::xlsx;

/// Submission table read from an exported `.xlsx` workbook
#[derive(Debug, Clone)]
pub struct WorkbookSource {
    path: PathBuf,
    sheet_name: Option<String>,
}

impl WorkbookSource {
    /// Read `sheet_name`, or the first sheet when none is given
    pub fn new(path: impl Into<PathBuf>, sheet_name: Option<String>) -> Self {
        Self {
            path: path.into(),
            sheet_name,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> ReportError {
        ReportError::TableUnavailable {
            source_name: self.describe(),
            reason: reason.to_string(),
        }
    }
}

impl TableSource for WorkbookSource {
    fn describe(&self) -> String {
        format!("workbook {}", self.path.display())
    }

    fn load(&self) -> ReportResult<SheetTable> {
        let book = xlsx::read(&self.path).map_err(|e| self.unavailable(e))?;

        let sheet = match self.sheet_name.as_deref() {
            Some(name) => book
                .get_sheet_by_name(name)
                .or_else(|| {
                    // Sheet names are matched loosely: exports often alter case
                    book.get_sheet_collection()
                        .iter()
                        .find(|sheet| sheet.get_name().eq_ignore_ascii_case(name))
                })
                .ok_or_else(|| self.unavailable(format!("sheet '{name}' not found")))?,
            None => book
                .get_sheet_collection()
                .first()
                .ok_or_else(|| self.unavailable("workbook has no sheets"))?,
        };

        let table = sheet_to_table(sheet);
        tracing::debug!(
            sheet = sheet.get_name(),
            rows = table.len(),
            columns = table.headers().len(),
            "loaded workbook sheet"
        );
        Ok(table)
    }
}

/// Row 1 is the header; the header width is the last non-empty header cell.
/// Cells are read as displayed, so typed dates come back in their number
/// format rather than as serials.
fn sheet_to_table(sheet: &Worksheet) -> SheetTable {
    let (max_col, max_row) = sheet.get_highest_column_and_row();

    let read = |col: u32, row: u32| -> String {
        sheet
            .get_cell((col, row))
            .map(|cell| cell.get_formatted_value())
            .unwrap_or_default()
    };

    let mut headers: Vec<String> = (1..=max_col).map(|col| read(col, 1)).collect();
    while headers.last().is_some_and(|h| h.trim().is_empty()) {
        headers.pop();
    }
    let width = headers.len() as u32;

    let mut rows = Vec::new();
    for row in 2..=max_row {
        let cells: Vec<CellValue> = (1..=width).map(|col| CellValue::from(read(col, row))).collect();
        if cells.iter().all(|cell| *cell == CellValue::Empty) {
            continue;
        }
        rows.push(cells);
    }

    SheetTable::new(headers, rows)
}
