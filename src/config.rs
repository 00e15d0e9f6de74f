use crate::error::{ReportError, ReportResult};
use crate::grouper::REPORT_DATE_FORMAT;
use crate::overlay::{bundled_font, discover_font};
use crate::pipeline::RunOptions;
use crate::resolver::ResolverSettings;
use crate::storage::{DriveFileStore, MirrorFileStore, RemoteFileStore};
use crate::table::{SheetsApiSource, TableSource, ValuesFileSource, WorkbookSource};
use ab_glyph::FontVec;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use clap::builder::BoolishValueParser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_SHEET_NAME: &str = "Daily Fruits & Vegetables Quality Photo Upload (Responses)";
const DEFAULT_IMAGE_DIR: &str = "data/images";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_ASSETS_DIR: &str = "assets";
const PLACEHOLDER_FILE: &str = "not_uploaded.png";
const FONT_FILE: &str = "label_font.ttf";
const DEFAULT_MAX_DOWNLOAD_RETRIES: u32 = 3;
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm"];

/// What happens to the run when one store fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Skip the store and keep going
    #[default]
    ContinueOnError,
    /// Abort the whole run
    Abort,
}

impl ErrorPolicy {
    pub fn from_flag(continue_on_error: bool) -> Self {
        if continue_on_error {
            ErrorPolicy::ContinueOnError
        } else {
            ErrorPolicy::Abort
        }
    }
}

/// Where the submission table comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSourceConfig {
    /// A local `.xlsx`/`.xlsm` workbook or a saved values `.json`
    File { path: PathBuf, sheet_name: String },
    /// The live spreadsheet through the Sheets API
    SheetsApi {
        spreadsheet_id: String,
        sheet_name: String,
    },
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub date: String,
    pub table: TableSourceConfig,
    pub access_token: Option<String>,
    pub drive_mirror: Option<PathBuf>,
    pub image_dir: PathBuf,
    pub output_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub placeholder: PathBuf,
    pub font: Option<PathBuf>,
    pub error_policy: ErrorPolicy,
    pub max_download_retries: u32,
    pub api_timeout: Duration,
    pub cleanup_temp_files: bool,
}

impl ReportConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            date: cli_date,
            table_file: cli_table_file,
            spreadsheet_id: cli_spreadsheet_id,
            sheet_name: cli_sheet_name,
            access_token: cli_access_token,
            drive_mirror: cli_drive_mirror,
            image_dir: cli_image_dir,
            output_dir: cli_output_dir,
            assets_dir: cli_assets_dir,
            placeholder: cli_placeholder,
            font: cli_font,
            continue_on_error: cli_continue_on_error,
            max_download_retries: cli_max_download_retries,
            api_timeout: cli_api_timeout,
            cleanup_temp_files: cli_cleanup_temp_files,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            date: file_date,
            table_file: file_table_file,
            spreadsheet_id: file_spreadsheet_id,
            sheet_name: file_sheet_name,
            access_token: file_access_token,
            drive_mirror: file_drive_mirror,
            image_dir: file_image_dir,
            output_dir: file_output_dir,
            assets_dir: file_assets_dir,
            placeholder: file_placeholder,
            font: file_font,
            continue_on_error: file_continue_on_error,
            max_download_retries: file_max_download_retries,
            api_timeout: file_api_timeout,
            cleanup_temp_files: file_cleanup_temp_files,
        } = file_config;

        let date = match cli_date.or(file_date) {
            Some(raw) => {
                let raw = raw.trim();
                let parsed = NaiveDate::parse_from_str(raw, REPORT_DATE_FORMAT)
                    .with_context(|| format!("report date {raw:?} is not in YYYY-MM-DD form"))?;
                parsed.format(REPORT_DATE_FORMAT).to_string()
            }
            None => Local::now().date_naive().format(REPORT_DATE_FORMAT).to_string(),
        };

        let sheet_name = cli_sheet_name
            .or(file_sheet_name)
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());
        let access_token = non_empty(cli_access_token.or(file_access_token));

        let table = match (
            cli_table_file.or(file_table_file),
            non_empty(cli_spreadsheet_id.or(file_spreadsheet_id)),
        ) {
            (Some(_), Some(_)) => {
                anyhow::bail!("provide either a table file or a spreadsheet id, not both")
            }
            (Some(path), None) => {
                anyhow::ensure!(path.is_file(), "table file {:?} does not exist", path);
                TableSourceConfig::File { path, sheet_name }
            }
            (None, Some(spreadsheet_id)) => {
                anyhow::ensure!(
                    access_token.is_some(),
                    "an access token is required to read spreadsheet {spreadsheet_id}"
                );
                TableSourceConfig::SheetsApi {
                    spreadsheet_id,
                    sheet_name,
                }
            }
            (None, None) => anyhow::bail!("a table file or a spreadsheet id is required"),
        };

        let drive_mirror = cli_drive_mirror.or(file_drive_mirror);
        anyhow::ensure!(
            drive_mirror.is_some() || access_token.is_some(),
            "an access token is required to download images unless a drive mirror is set"
        );
        if let Some(mirror) = drive_mirror.as_ref() {
            anyhow::ensure!(mirror.is_dir(), "drive mirror {:?} is not a directory", mirror);
        }

        let assets_dir = cli_assets_dir
            .or(file_assets_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
        let placeholder = cli_placeholder
            .or(file_placeholder)
            .unwrap_or_else(|| assets_dir.join(PLACEHOLDER_FILE));

        let max_download_retries = cli_max_download_retries
            .or(file_max_download_retries)
            .unwrap_or(DEFAULT_MAX_DOWNLOAD_RETRIES)
            .max(1);
        let api_timeout = Duration::from_secs(
            cli_api_timeout
                .or(file_api_timeout)
                .unwrap_or(DEFAULT_API_TIMEOUT_SECS)
                .max(1),
        );

        Ok(Self {
            date,
            table,
            access_token,
            drive_mirror,
            image_dir: cli_image_dir
                .or(file_image_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
            output_dir: cli_output_dir
                .or(file_output_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            assets_dir,
            placeholder,
            font: cli_font.or(file_font),
            error_policy: ErrorPolicy::from_flag(
                cli_continue_on_error.or(file_continue_on_error).unwrap_or(true),
            ),
            max_download_retries,
            api_timeout,
            cleanup_temp_files: cli_cleanup_temp_files
                .or(file_cleanup_temp_files)
                .unwrap_or(true),
        })
    }

    /// Fail fast before any download: create working directories, require
    /// the placeholder, and prove the output directory accepts writes.
    pub fn validate(&self) -> ReportResult<()> {
        fs::create_dir_all(&self.image_dir)?;
        fs::create_dir_all(&self.assets_dir)?;

        let not_writable = |reason: String| ReportError::OutputNotWritable {
            path: self.output_dir.clone(),
            reason,
        };
        fs::create_dir_all(&self.output_dir).map_err(|e| not_writable(e.to_string()))?;
        tempfile::NamedTempFile::new_in(&self.output_dir).map_err(|e| not_writable(e.to_string()))?;

        if !self.placeholder.is_file() {
            return Err(ReportError::PlaceholderMissing {
                path: self.placeholder.clone(),
            });
        }
        Ok(())
    }

    pub fn build_table_source(&self) -> Result<Box<dyn TableSource>> {
        match &self.table {
            TableSourceConfig::File { path, sheet_name } => {
                let ext = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if ext == "json" {
                    Ok(Box::new(ValuesFileSource::new(path)))
                } else if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
                    Ok(Box::new(WorkbookSource::new(path, Some(sheet_name.clone()))))
                } else {
                    anyhow::bail!("unsupported table file extension: {ext:?}")
                }
            }
            TableSourceConfig::SheetsApi {
                spreadsheet_id,
                sheet_name,
            } => {
                let token = self
                    .access_token
                    .clone()
                    .context("an access token is required for the Sheets API")?;
                let source = SheetsApiSource::new(
                    spreadsheet_id.clone(),
                    Some(sheet_name.clone()),
                    token,
                    self.api_timeout,
                    self.max_download_retries,
                )?;
                Ok(Box::new(source))
            }
        }
    }

    pub fn build_file_store(&self) -> Result<Box<dyn RemoteFileStore>> {
        if let Some(mirror) = self.drive_mirror.as_ref() {
            info!(mirror = %mirror.display(), "serving image ids from local mirror");
            return Ok(Box::new(MirrorFileStore::new(mirror)));
        }
        let token = self
            .access_token
            .clone()
            .context("an access token is required for Drive downloads")?;
        let store = DriveFileStore::new(token, self.api_timeout, self.max_download_retries)?;
        Ok(Box::new(store))
    }

    /// Label font: the configured file, then `<assets>/label_font.ttf`, then
    /// the compiled-in DejaVu Sans.
    pub fn load_font(&self) -> Option<FontVec> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(font) = self.font.as_ref() {
            if !font.is_file() {
                warn!(path = %font.display(), "configured label font not found");
            }
            candidates.push(font.clone());
        }
        candidates.push(self.assets_dir.join(FONT_FILE));

        if let Some((font, path)) = discover_font(&candidates) {
            info!(path = %path.display(), "loaded label font");
            return Some(font);
        }
        match bundled_font() {
            Ok(font) => {
                debug!("using bundled label font");
                Some(font)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "no usable label font, product labels disabled");
                None
            }
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings::new(&self.placeholder)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            date: self.date.clone(),
            image_dir: self.image_dir.clone(),
            output_dir: self.output_dir.clone(),
            error_policy: self.error_policy,
            cleanup_temp_files: self.cleanup_temp_files,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "quality-report",
    about = "Daily fruit & vegetable quality photo report",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "REPORT_DATE",
        value_name = "YYYY-MM-DD",
        help = "Report date (defaults to today)"
    )]
    pub date: Option<String>,

    #[arg(
        long,
        env = "TABLE_FILE",
        value_name = "FILE",
        help = "Submission table as .xlsx/.xlsm or a saved Sheets values .json"
    )]
    pub table_file: Option<PathBuf>,

    #[arg(
        long,
        env = "SPREADSHEET_ID",
        value_name = "ID",
        help = "Read submissions live from this spreadsheet"
    )]
    pub spreadsheet_id: Option<String>,

    #[arg(
        long,
        env = "SHEET_NAME",
        value_name = "NAME",
        help = "Sheet holding the form responses"
    )]
    pub sheet_name: Option<String>,

    #[arg(
        long,
        env = "GOOGLE_ACCESS_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true,
        help = "OAuth bearer token for the Sheets and Drive APIs"
    )]
    pub access_token: Option<String>,

    #[arg(
        long,
        env = "DRIVE_MIRROR_DIR",
        value_name = "DIR",
        help = "Serve image file ids from a local directory instead of Drive"
    )]
    pub drive_mirror: Option<PathBuf>,

    #[arg(
        long,
        env = "IMAGE_DIR",
        value_name = "DIR",
        help = "Where downloaded images are stored"
    )]
    pub image_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "OUTPUT_DIR",
        value_name = "DIR",
        help = "Where the report is written"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "ASSETS_DIR",
        value_name = "DIR",
        help = "Directory holding the placeholder image and label font"
    )]
    pub assets_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "PLACEHOLDER_IMAGE",
        value_name = "FILE",
        help = "Image used for missing or invalid photos"
    )]
    pub placeholder: Option<PathBuf>,

    #[arg(
        long,
        env = "LABEL_FONT",
        value_name = "FILE",
        help = "TrueType font for product labels"
    )]
    pub font: Option<PathBuf>,

    #[arg(
        long,
        env = "CONTINUE_ON_ERROR",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        help = "Skip a failing store instead of aborting the run"
    )]
    pub continue_on_error: Option<bool>,

    #[arg(
        long,
        env = "MAX_DOWNLOAD_RETRIES",
        value_name = "N",
        help = "Attempts per remote request",
        value_parser = clap::value_parser!(u32)
    )]
    pub max_download_retries: Option<u32>,

    #[arg(
        long,
        env = "API_TIMEOUT",
        value_name = "SECS",
        help = "Per-request timeout in seconds",
        value_parser = clap::value_parser!(u64)
    )]
    pub api_timeout: Option<u64>,

    #[arg(
        long,
        env = "CLEANUP_TEMP_FILES",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        help = "Remove labeled image copies after the report is written"
    )]
    pub cleanup_temp_files: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    date: Option<String>,
    table_file: Option<PathBuf>,
    spreadsheet_id: Option<String>,
    sheet_name: Option<String>,
    access_token: Option<String>,
    drive_mirror: Option<PathBuf>,
    image_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    assets_dir: Option<PathBuf>,
    placeholder: Option<PathBuf>,
    font: Option<PathBuf>,
    continue_on_error: Option<bool>,
    max_download_retries: Option<u32>,
    api_timeout: Option<u64>,
    cleanup_temp_files: Option<bool>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_policy_from_flag() {
        assert_eq!(ErrorPolicy::from_flag(true), ErrorPolicy::ContinueOnError);
        assert_eq!(ErrorPolicy::from_flag(false), ErrorPolicy::Abort);
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::ContinueOnError);
    }

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" tok ".to_string())), Some("tok".to_string()));
        assert_eq!(non_empty(None), None);
    }

    fn config_with_assets(assets_dir: &Path, font: Option<PathBuf>) -> ReportConfig {
        ReportConfig {
            date: "2026-10-19".to_string(),
            table: TableSourceConfig::File {
                path: assets_dir.join("table.xlsx"),
                sheet_name: DEFAULT_SHEET_NAME.to_string(),
            },
            access_token: None,
            drive_mirror: Some(assets_dir.to_path_buf()),
            image_dir: assets_dir.join("images"),
            output_dir: assets_dir.join("output"),
            assets_dir: assets_dir.to_path_buf(),
            placeholder: assets_dir.join(PLACEHOLDER_FILE),
            font,
            error_policy: ErrorPolicy::default(),
            max_download_retries: DEFAULT_MAX_DOWNLOAD_RETRIES,
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            cleanup_temp_files: true,
        }
    }

    #[test]
    fn test_load_font_falls_back_to_bundled_font() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = config_with_assets(tmp.path(), Some(tmp.path().join("missing.ttf")));
        assert!(config.load_font().is_some());

        let config = config_with_assets(tmp.path(), None);
        assert!(config.load_font().is_some());
    }
}
