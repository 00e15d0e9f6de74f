//! Groups form submissions into one record per store for the report date.

use crate::error::{ReportError, ReportResult};
use crate::model::{ProductCell, StoreMetadata, StoreRecord};
use crate::table::{CellValue, SheetTable};
use crate::utils::sanitize_file_component;
use chrono::NaiveDate;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const DATE_COLUMN: &str = "Date";
pub const STORE_COLUMN: &str = "Store Name";
pub const NAME_COLUMN: &str = "Name";
pub const PHONE_COLUMN: &str = "Phone Number";
pub const EMAIL_COLUMN: &str = "Email Address";

const SOURCE_DATE_FORMAT: &str = "%m/%d/%Y";
pub const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

const PRODUCT_MARKER: &str = "take a clear photo";
const LABEL_SEPARATOR: char = '\u{2013}';

/// Reformat a `month/day/year` cell as `year-month-day`.
///
/// Anything unparseable becomes the empty string, which never equals a
/// report date.
pub fn normalize_date(raw: &str) -> String {
    match NaiveDate::parse_from_str(raw.trim(), SOURCE_DATE_FORMAT) {
        Ok(date) => date.format(REPORT_DATE_FORMAT).to_string(),
        Err(e) => {
            warn!(value = raw, error = %e, "failed to normalize date");
            String::new()
        }
    }
}

/// Display label of a product column: the header text before the en dash
pub fn product_label(header: &str) -> String {
    header
        .split(LABEL_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub fn is_overall_column(header: &str) -> bool {
    let lower = header.to_lowercase();
    lower.contains("overall") && lower.contains("photo")
}

pub fn is_product_column(header: &str) -> bool {
    header.to_lowercase().contains(PRODUCT_MARKER)
}

/// Column positions the grouper reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date: usize,
    pub store: usize,
    pub name: usize,
    pub phone: usize,
    pub email: Option<usize>,
    /// Overall photo columns, sorted case-insensitively by header
    pub overall: Vec<usize>,
    /// Product columns in table order with their labels
    pub products: Vec<(usize, String)>,
}

impl ColumnLayout {
    /// Locate metadata and photo columns; fails if a required metadata
    /// column is absent.
    pub fn discover(table: &SheetTable) -> ReportResult<Self> {
        let required = [DATE_COLUMN, STORE_COLUMN, NAME_COLUMN, PHONE_COLUMN];
        let found: Vec<Option<usize>> = required
            .iter()
            .map(|name| table.find_column(name))
            .collect();
        let missing: Vec<String> = required
            .iter()
            .zip(&found)
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ReportError::MissingColumns { columns: missing });
        }
        let [date, store, name, phone] = [found[0], found[1], found[2], found[3]]
            .map(|idx| idx.unwrap_or_default());

        let headers = table.headers();
        let mut overall: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| is_overall_column(header))
            .map(|(idx, _)| idx)
            .collect();
        overall.sort_by_cached_key(|idx| headers[*idx].to_lowercase());

        let products = headers
            .iter()
            .enumerate()
            .filter(|(idx, header)| is_product_column(header) && !overall.contains(idx))
            .map(|(idx, header)| (idx, product_label(header)))
            .collect();

        let layout = Self {
            date,
            store,
            name,
            phone,
            email: table.find_column(EMAIL_COLUMN),
            overall,
            products,
        };
        for label in layout.duplicate_labels() {
            warn!(product = label, "several product columns share a label; the last download wins");
        }
        Ok(layout)
    }

    /// Product labels that map to the same image file as an earlier column
    pub fn duplicate_labels(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.products
            .iter()
            .filter(|(_, label)| !seen.insert(sanitize_file_component(label)))
            .map(|(_, label)| label.as_str())
            .collect()
    }
}

/// Build one [`StoreRecord`] per store with a submission on `target_date`
/// (`YYYY-MM-DD`), in first-seen order. The first submission for a store
/// wins; later ones are ignored.
pub fn group(table: &SheetTable, target_date: &str) -> ReportResult<Vec<StoreRecord>> {
    let columns = ColumnLayout::discover(table)?;
    info!(
        overall_columns = columns.overall.len(),
        product_columns = columns.products.len(),
        "discovered photo columns"
    );
    for (_, label) in &columns.products {
        debug!(product = %label, "product column");
    }

    let mut stores: IndexMap<String, StoreRecord> = IndexMap::new();
    let mut matching_rows = 0usize;

    for (row_idx, row) in table.rows().enumerate() {
        if normalize_date(&row[columns.date].normalize()) != target_date {
            continue;
        }
        matching_rows += 1;

        let store_name = row[columns.store].normalize();
        if store_name.is_empty() {
            warn!(row = row_idx + 2, "submission without a store name skipped");
            continue;
        }
        if stores.contains_key(&store_name) {
            debug!(store = %store_name, row = row_idx + 2, "ignoring later submission for store");
            continue;
        }

        let record = build_record(&columns, row, store_name.clone(), target_date);
        stores.insert(store_name, record);
    }

    info!(
        date = target_date,
        submissions = matching_rows,
        stores = stores.len(),
        "grouped submissions"
    );
    Ok(stores.into_values().collect())
}

fn build_record(
    columns: &ColumnLayout,
    row: &[CellValue],
    store_name: String,
    target_date: &str,
) -> StoreRecord {
    let metadata = StoreMetadata {
        store_name,
        name: row[columns.name].normalize(),
        phone: row[columns.phone].normalize(),
        email: columns.email.map(|idx| row[idx].normalize()),
        date: target_date.to_string(),
    };
    let overall = columns.overall.iter().map(|idx| row[*idx].clone()).collect();
    let products = columns
        .products
        .iter()
        .map(|(idx, label)| ProductCell {
            label: label.clone(),
            cell: row[*idx].clone(),
        })
        .collect();
    StoreRecord {
        metadata,
        overall,
        products,
    }
}
