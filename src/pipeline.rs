//! End-to-end report run: group, resolve, overlay, lay out, build.

use crate::config::ErrorPolicy;
use crate::document::{DocumentBuilder, OverlayWorkspace};
use crate::error::{ReportError, ReportResult};
use crate::grouper;
use crate::layout::{LayoutEngine, LayoutSettings, PageSection};
use crate::model::{LabeledImage, ResolvedImage, StoreRecord, sort_by_label};
use crate::overlay::OverlayRenderer;
use crate::recovery::RunSummary;
use crate::resolver::{ImageResolver, ResolverSettings};
use crate::storage::RemoteFileStore;
use crate::table::SheetTable;
use crate::utils::{sanitize_file_component, store_dir_name};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

/// Per-run inputs of the pipeline
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Target date, `YYYY-MM-DD`
    pub date: String,
    pub image_dir: PathBuf,
    pub output_dir: PathBuf,
    pub error_policy: ErrorPolicy,
    pub cleanup_temp_files: bool,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// A document was written
    Generated { path: PathBuf, summary: RunSummary },
    /// No submission matched the target date
    NoSubmissions,
    /// Submissions existed but every store was skipped
    NothingRendered { summary: RunSummary },
}

/// Process exit status for a finished run
pub const EXIT_GENERATED: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_NO_SUBMISSIONS: u8 = 2;

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Generated { .. } => EXIT_GENERATED,
            RunOutcome::NoSubmissions => EXIT_NO_SUBMISSIONS,
            RunOutcome::NothingRendered { .. } => EXIT_FAILURE,
        }
    }
}

/// Laid-out sections ready for the document builder
#[derive(Debug)]
pub struct PreparedReport {
    pub sections: Vec<PageSection>,
    pub summary: RunSummary,
}

pub struct ReportPipeline<S> {
    store: S,
    resolver_settings: ResolverSettings,
    overlay: OverlayRenderer,
    layout: LayoutEngine,
    options: RunOptions,
}

impl<S: RemoteFileStore> ReportPipeline<S> {
    pub fn new(
        store: S,
        resolver_settings: ResolverSettings,
        overlay: OverlayRenderer,
        layout: LayoutSettings,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            resolver_settings,
            overlay,
            layout: LayoutEngine::new(layout),
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn run(&self, table: &SheetTable) -> ReportResult<RunOutcome> {
        let date = self.options.date.as_str();
        info!(date, rows = table.len(), "starting daily quality report");

        let records = grouper::group(table, date)?;
        if records.is_empty() {
            warn!(date, "no submissions found for date");
            return Ok(RunOutcome::NoSubmissions);
        }

        let output_dir = &self.options.output_dir;
        let workspace = OverlayWorkspace::create(output_dir)
            .map_err(|e| ReportError::OutputNotWritable {
                path: output_dir.clone(),
                reason: e.to_string(),
            })?
            .keep_files(!self.options.cleanup_temp_files);

        let PreparedReport { sections, summary } = self.prepare(&records, workspace.path())?;

        if sections.is_empty() {
            summary.log();
            warn!("no store could be rendered, no document written");
            return Ok(RunOutcome::NothingRendered { summary });
        }

        let builder = DocumentBuilder::new(output_dir, date, self.layout.settings().clone());
        let path = builder.build(&sections, workspace)?;
        summary.log();
        Ok(RunOutcome::Generated { path, summary })
    }

    /// Lay out every store in discovery order, applying the error policy
    /// to stores whose images cannot be prepared.
    pub fn prepare(&self, records: &[StoreRecord], work_dir: &Path) -> ReportResult<PreparedReport> {
        let resolver = ImageResolver::new(&self.store, &self.resolver_settings);
        let mut summary = RunSummary::new(records.len());
        let mut sections = Vec::with_capacity(records.len());

        for (idx, record) in records.iter().enumerate() {
            let store = record.metadata.store_name.as_str();
            let _span = info_span!("store", store, position = idx + 1, total = records.len()).entered();
            info!("processing store");

            match self.prepare_store(record, &resolver, work_dir, &mut summary) {
                Ok(section) => {
                    summary.add_success();
                    sections.push(section);
                    info!("store processed");
                }
                Err(e) => match self.options.error_policy {
                    ErrorPolicy::ContinueOnError => {
                        warn!(error = %e, "skipping store");
                        summary.add_failure(idx, store, e.to_string());
                    }
                    ErrorPolicy::Abort => return Err(e),
                },
            }
        }
        Ok(PreparedReport { sections, summary })
    }

    /// Resolve, label and lay out one store's images
    fn prepare_store(
        &self,
        record: &StoreRecord,
        resolver: &ImageResolver<'_>,
        work_dir: &Path,
        summary: &mut RunSummary,
    ) -> ReportResult<PageSection> {
        let store = record.metadata.store_name.as_str();
        let store_dir = self.options.image_dir.join(store_dir_name(store));
        fs::create_dir_all(&store_dir).map_err(|e| {
            ReportError::store(store, format!("cannot create {}: {e}", store_dir.display()))
        })?;

        let mut overall = Vec::with_capacity(record.overall.len());
        for (n, cell) in record.overall.iter().enumerate() {
            let image = format!("Overall photo {}", n + 1);
            let destination = store_dir.join(format!("Overall_{}.jpg", n + 1));
            let resolved = resolver.resolve(cell, &destination);
            record_outcome(summary, store, &image, &resolved);
            overall.push(resolved.path);
        }

        let mut products = Vec::with_capacity(record.products.len());
        for product in &record.products {
            let file_name = format!("{}.jpg", sanitize_file_component(&product.label));
            let resolved = resolver.resolve(&product.cell, &store_dir.join(file_name));
            record_outcome(summary, store, &product.label, &resolved);
            products.push(LabeledImage {
                label: product.label.clone(),
                path: resolved.path,
            });
        }
        sort_by_label(&mut products, |image| image.label.as_str());

        let labeled: Vec<LabeledImage> = products
            .into_iter()
            .map(|image| LabeledImage {
                path: self.overlay.apply_label(&image.path, &image.label, work_dir),
                label: image.label,
            })
            .collect();

        Ok(self.layout.layout_store(record, &overall, &labeled))
    }
}

fn record_outcome(summary: &mut RunSummary, store: &str, image: &str, resolved: &ResolvedImage) {
    summary.record_image(resolved.resolution);
    if resolved.is_placeholder() {
        info!(store, image, outcome = %resolved.resolution, "using placeholder");
    } else {
        info!(store, image, outcome = %resolved.resolution, "image ready");
    }
}
