//! Error taxonomy for the report pipeline
//!
//! Failures are split by how far they are allowed to travel:
//! - fatal errors abort the run before any document is written
//! - store errors unwind to the per-store loop, where the run's
//!   [`ErrorPolicy`](crate::config::ErrorPolicy) decides skip or abort
//! - per-image failures never become errors at all; they are recorded as a
//!   [`Resolution`](crate::model::Resolution) on the resolved image

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for pipeline operations
pub type ReportResult<T> = Result<T, ReportError>;

// =============================================================================
// REPORT ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum ReportError {
    /// One or more metadata columns could not be located by header name
    #[error("missing required columns in submission table: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// The placeholder asset is not on disk
    #[error("placeholder image not found: {path:?}")]
    PlaceholderMissing { path: PathBuf },

    /// The output directory cannot be created or written
    #[error("output directory {path:?} is not writable: {reason}")]
    OutputNotWritable { path: PathBuf, reason: String },

    /// The submission table could not be read from its source
    #[error("failed to load submission table from {source_name}: {reason}")]
    TableUnavailable { source_name: String, reason: String },

    /// Something went wrong while preparing a single store's images
    #[error("failed to process store '{store}': {reason}")]
    Store { store: String, reason: String },

    /// Assembling or writing the PDF failed
    #[error("failed to write report document {path:?}: {reason}")]
    Document { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// Whether the error aborts the run regardless of the error policy
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReportError::Store { .. })
    }

    /// Category label used in structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            ReportError::MissingColumns { .. } => "table_schema",
            ReportError::PlaceholderMissing { .. } => "configuration",
            ReportError::OutputNotWritable { .. } | ReportError::Io(_) => "io_error",
            ReportError::TableUnavailable { .. } => "table_source",
            ReportError::Store { .. } => "store_processing",
            ReportError::Document { .. } => "document",
        }
    }

    pub fn store(store: impl Into<String>, reason: impl fmt::Display) -> Self {
        ReportError::Store {
            store: store.into(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// FETCH ERRORS
// =============================================================================

/// Failure reported by a remote collaborator (file store or table API)
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS or timeout failure
    #[error("network error fetching {id}: {reason}")]
    Network { id: String, reason: String },

    /// Rejected credentials or missing permission
    #[error("access denied for {id} (status {status})")]
    Auth { id: String, status: u16 },

    #[error("remote file {id} not found")]
    NotFound { id: String },

    /// Any other non-success HTTP status
    #[error("unexpected status {status} fetching {id}")]
    Status { id: String, status: u16 },

    /// Writing the fetched bytes locally failed
    #[error("failed to write {id} to disk: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Auth { .. } | FetchError::NotFound { .. } | FetchError::Io { .. } => false,
        }
    }

    /// Map an HTTP status into the matching variant
    pub fn from_status(id: impl Into<String>, status: u16) -> Self {
        let id = id.into();
        match status {
            401 | 403 => FetchError::Auth { id, status },
            404 => FetchError::NotFound { id },
            _ => FetchError::Status { id, status },
        }
    }

    pub fn network(id: impl Into<String>, error: impl fmt::Display) -> Self {
        FetchError::Network {
            id: id.into(),
            reason: error.to_string(),
        }
    }
}
