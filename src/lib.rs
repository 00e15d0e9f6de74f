pub mod config;
pub mod document;
pub mod error;
pub mod grouper;
pub mod layout;
pub mod logging;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod recovery;
pub mod resolver;
pub mod storage;
pub mod table;
pub mod utils;

pub use config::{CliArgs, ErrorPolicy, ReportConfig, TableSourceConfig};
pub use error::{FetchError, ReportError, ReportResult};
pub use logging::{LoggingConfig, init_logging};
pub use pipeline::{ReportPipeline, RunOptions, RunOutcome};

use anyhow::Result;
use layout::LayoutSettings;
use overlay::OverlayRenderer;

/// Run one report from a validated configuration: load the submission
/// table, resolve every photo and write the PDF.
pub fn run_report(config: &ReportConfig) -> Result<RunOutcome> {
    let _span = logging::run_span(&config.date).entered();
    config.validate()?;

    let source = config.build_table_source()?;
    tracing::info!(source = %source.describe(), "loading submission table");
    let table = source.load()?;
    tracing::info!(rows = table.len(), columns = table.headers().len(), "submission table loaded");

    let store = config.build_file_store()?;
    let overlay = OverlayRenderer::new(config.load_font(), &config.placeholder);
    let pipeline = ReportPipeline::new(
        store,
        config.resolver_settings(),
        overlay,
        LayoutSettings::default(),
        config.run_options(),
    );
    Ok(pipeline.run(&table)?)
}
