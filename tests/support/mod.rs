#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use quality_report::config::ErrorPolicy;
use quality_report::error::FetchError;
use quality_report::layout::LayoutSettings;
use quality_report::overlay::{OverlayRenderer, bundled_font};
use quality_report::pipeline::{ReportPipeline, RunOptions};
use quality_report::resolver::ResolverSettings;
use quality_report::storage::RemoteFileStore;
use quality_report::table::SheetTable;
use tempfile::{TempDir, tempdir};

pub const REPORT_DATE: &str = "2026-10-19";
pub const SOURCE_DATE: &str = "10/19/2026";

pub const METADATA_HEADERS: [&str; 5] = ["Date", "Store Name", "Name", "Phone Number", "Email Address"];

pub fn drive_link(id: &str) -> String {
    format!("https://drive.google.com/file/d/{id}/view?usp=sharing")
}

pub fn product_header(label: &str) -> String {
    format!("{label} \u{2013} Take a clear photo of the display")
}

pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encode(width, height, color, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encode(width, height, color, ImageFormat::Jpeg)
}

fn encode(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("encode image");
    buf.into_inner()
}

/// Header row plus data rows
pub fn submission_table(headers: &[String], rows: &[Vec<String>]) -> SheetTable {
    let mut grid = Vec::with_capacity(rows.len() + 1);
    grid.push(headers.to_vec());
    grid.extend(rows.iter().cloned());
    SheetTable::from_strings(&grid)
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

enum FakeFile {
    Bytes(Vec<u8>),
    /// Writes the bytes, then reports a network failure
    Truncated(Vec<u8>),
}

/// In-memory file store that records every id it is asked for
#[derive(Default)]
pub struct FakeFileStore {
    files: HashMap<String, FakeFile>,
    calls: RefCell<Vec<String>>,
}

impl FakeFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, id: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(id.to_string(), FakeFile::Bytes(bytes));
        self
    }

    pub fn with_truncated(mut self, id: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(id.to_string(), FakeFile::Truncated(bytes));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl RemoteFileStore for FakeFileStore {
    fn fetch(&self, file_id: &str, destination: &Path) -> Result<(), FetchError> {
        self.calls.borrow_mut().push(file_id.to_string());
        let io_error = |source| FetchError::Io {
            id: file_id.to_string(),
            source,
        };
        match self.files.get(file_id) {
            Some(FakeFile::Bytes(bytes)) => fs::write(destination, bytes).map_err(io_error),
            Some(FakeFile::Truncated(bytes)) => {
                fs::write(destination, bytes).map_err(io_error)?;
                Err(FetchError::Network {
                    id: file_id.to_string(),
                    reason: "connection reset mid-body".to_string(),
                })
            }
            None => Err(FetchError::NotFound {
                id: file_id.to_string(),
            }),
        }
    }
}

pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        let workspace = Self {
            _tempdir: tempdir,
            root,
        };
        fs::create_dir_all(workspace.assets_dir()).expect("assets dir");
        fs::write(workspace.placeholder(), png_bytes(120, 90, [200, 200, 200]))
            .expect("placeholder");
        workspace
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.path("assets")
    }

    pub fn placeholder(&self) -> PathBuf {
        self.assets_dir().join("not_uploaded.png")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.path("data/images")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path("output")
    }

    pub fn run_options(&self, error_policy: ErrorPolicy) -> RunOptions {
        RunOptions {
            date: REPORT_DATE.to_string(),
            image_dir: self.image_dir(),
            output_dir: self.output_dir(),
            error_policy,
            cleanup_temp_files: true,
        }
    }

    /// Pipeline labeling products with the bundled font
    pub fn pipeline<S: RemoteFileStore>(&self, store: S, error_policy: ErrorPolicy) -> ReportPipeline<S> {
        ReportPipeline::new(
            store,
            ResolverSettings::new(self.placeholder()),
            OverlayRenderer::new(Some(bundled_font().expect("bundled font")), self.placeholder()),
            LayoutSettings::default(),
            self.run_options(error_policy),
        )
    }
}
