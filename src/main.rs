use clap::Parser;
use quality_report::pipeline::EXIT_FAILURE;
use quality_report::{
    CliArgs, LoggingConfig, ReportConfig, RunOutcome, init_logging, run_report,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let _guard = match init_logging(LoggingConfig::from_env()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {e:#}");
            None
        }
    };

    let config = match ReportConfig::from_args(cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "invalid configuration");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match run_report(&config) {
        Ok(outcome) => {
            match &outcome {
                RunOutcome::Generated { path, summary } => tracing::info!(
                    path = %path.display(),
                    stores = summary.stores_rendered,
                    placeholders = summary.placeholder_count(),
                    "report generated"
                ),
                RunOutcome::NoSubmissions => {
                    tracing::warn!(date = %config.date, "no submissions for date, nothing to report")
                }
                RunOutcome::NothingRendered { summary } => tracing::error!(
                    skipped = summary.failures.len(),
                    "every store failed, no report written"
                ),
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            let category = e
                .downcast_ref::<quality_report::ReportError>()
                .map(|err| err.category())
                .unwrap_or("unexpected");
            tracing::error!(error = %format!("{e:#}"), category, "report run failed");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
