use super::{CellValue, SheetTable, TableSource};
use crate::error::{FetchError, ReportError, ReportResult};
use crate::recovery::{ExponentialBackoff, RetryConfig, retry_with_policy};
use crate::utils::column_number_to_name;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
/// Widest column read from the sheet (`ZZ`)
const LAST_COLUMN: u32 = 702;

/// Body of a `spreadsheets.values.get` response
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ValuesPayload {
    Range {
        #[serde(default)]
        values: Vec<Vec<Value>>,
    },
    Bare(Vec<Vec<Value>>),
}

impl ValuesPayload {
    fn into_values(self) -> Vec<Vec<Value>> {
        match self {
            ValuesPayload::Range { values } | ValuesPayload::Bare(values) => values,
        }
    }
}

/// Convert a values grid (first row = header) into a table
pub fn values_to_table(values: &[Vec<Value>]) -> SheetTable {
    let Some((header, rows)) = values.split_first() else {
        return SheetTable::default();
    };
    let headers = header
        .iter()
        .map(|cell| match cell {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect();
    let rows = rows
        .iter()
        .map(|row| row.iter().map(CellValue::from_json).collect())
        .collect();
    SheetTable::new(headers, rows)
}

/// A saved `values.get` response on disk
#[derive(Debug, Clone)]
pub struct ValuesFileSource {
    path: PathBuf,
}

impl ValuesFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TableSource for ValuesFileSource {
    fn describe(&self) -> String {
        format!("values file {}", self.path.display())
    }

    fn load(&self) -> ReportResult<SheetTable> {
        let unavailable = |reason: String| ReportError::TableUnavailable {
            source_name: self.describe(),
            reason,
        };
        let contents = fs::read_to_string(&self.path).map_err(|e| unavailable(e.to_string()))?;
        let payload: ValuesPayload =
            serde_json::from_str(&contents).map_err(|e| unavailable(e.to_string()))?;
        Ok(values_to_table(&payload.into_values()))
    }
}

/// Live read of the form responses sheet through the Sheets REST API.
///
/// The bearer token is obtained elsewhere; this client only presents it.
#[derive(Debug, Clone)]
pub struct SheetsApiSource {
    spreadsheet_id: String,
    sheet_name: Option<String>,
    access_token: String,
    client: Client,
    retry: RetryConfig,
}

impl SheetsApiSource {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_name: Option<String>,
        access_token: impl Into<String>,
        timeout: Duration,
        max_attempts: u32,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name,
            access_token: access_token.into(),
            client,
            retry: RetryConfig {
                max_attempts: max_attempts.max(1),
                ..RetryConfig::network()
            },
        })
    }

    fn range(&self) -> String {
        let cells = format!("A1:{}", column_number_to_name(LAST_COLUMN));
        match self.sheet_name.as_deref() {
            Some(sheet) => format!("'{}'!{cells}", sheet.replace('\'', "''")),
            None => cells,
        }
    }

    fn request(&self) -> Result<Vec<Vec<Value>>, FetchError> {
        let id = self.spreadsheet_id.as_str();
        let mut url = reqwest::Url::parse(SHEETS_API_BASE).map_err(|e| FetchError::network(id, e))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::network(id, "sheets base url cannot take path segments"))?
            .push(id)
            .push("values")
            .push(&self.range());

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|e| FetchError::network(id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(id, status.as_u16()));
        }

        let payload: ValuesPayload = response.json().map_err(|e| FetchError::network(id, e))?;
        Ok(payload.into_values())
    }
}

impl TableSource for SheetsApiSource {
    fn describe(&self) -> String {
        format!("spreadsheet {} range {}", self.spreadsheet_id, self.range())
    }

    fn load(&self) -> ReportResult<SheetTable> {
        let policy = ExponentialBackoff::new(self.retry.clone());
        let values = retry_with_policy(|| self.request(), &policy, "sheets_values_get").map_err(
            |e| ReportError::TableUnavailable {
                source_name: self.describe(),
                reason: e.to_string(),
            },
        )?;
        Ok(values_to_table(&values))
    }
}
