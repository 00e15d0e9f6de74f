//! Report document assembly
//!
//! [`DocumentBuilder::build`] concatenates store sections into a single PDF
//! and owns the overlay working directory for the duration of the build, so
//! the directory is released on every exit path.

mod pdf;

pub use pdf::{A4_HEIGHT, A4_WIDTH, MARGIN, PdfWriter, encode_text};

use crate::error::{ReportError, ReportResult};
use crate::layout::{LayoutSettings, PageSection};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const WORKSPACE_DIR_NAME: &str = "temp_overlays";

/// `<output_dir>/Daily_Quality_Report_<date>.pdf`
pub fn report_path(output_dir: &Path, date: &str) -> PathBuf {
    output_dir.join(format!("Daily_Quality_Report_{date}.pdf"))
}

/// Scoped working directory for labeled images, removed on drop
#[derive(Debug)]
pub struct OverlayWorkspace {
    path: PathBuf,
    keep: bool,
}

impl OverlayWorkspace {
    /// Create `<output_dir>/temp_overlays`
    pub fn create(output_dir: &Path) -> io::Result<Self> {
        let path = output_dir.join(WORKSPACE_DIR_NAME);
        fs::create_dir_all(&path)?;
        Ok(Self { path, keep: false })
    }

    /// Leave the directory on disk when the guard is dropped
    pub fn keep_files(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OverlayWorkspace {
    fn drop(&mut self) {
        if self.keep {
            debug!(path = %self.path.display(), "keeping overlay workspace");
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed overlay workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "could not clean up overlay workspace"
            ),
        }
    }
}

pub struct DocumentBuilder {
    output_dir: PathBuf,
    date: String,
    settings: LayoutSettings,
}

impl DocumentBuilder {
    pub fn new(output_dir: impl Into<PathBuf>, date: impl Into<String>, settings: LayoutSettings) -> Self {
        Self {
            output_dir: output_dir.into(),
            date: date.into(),
            settings,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        report_path(&self.output_dir, &self.date)
    }

    /// Write all sections, one page break between consecutive stores.
    ///
    /// Consumes the overlay workspace; it is cleaned up once the document is
    /// written or the build fails.
    pub fn build(&self, sections: &[PageSection], workspace: OverlayWorkspace) -> ReportResult<PathBuf> {
        let path = self.output_path();
        let result = self.write(sections, &path);
        drop(workspace);
        let pages = result.map_err(|e| ReportError::Document {
            path: path.clone(),
            reason: format!("{e:#}"),
        })?;
        info!(
            path = %path.display(),
            stores = sections.len(),
            pages,
            "report document written"
        );
        Ok(path)
    }

    fn write(&self, sections: &[PageSection], path: &Path) -> anyhow::Result<usize> {
        fs::create_dir_all(&self.output_dir)?;
        let mut writer = PdfWriter::new(self.settings.clone());
        for (idx, section) in sections.iter().enumerate() {
            if idx > 0 {
                writer.page_break()?;
            }
            writer.write_section(section)?;
        }
        writer.finish(&format!("Daily Quality Report {}", self.date), path)
    }
}
