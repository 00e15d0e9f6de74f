//! Turns raw image-reference cells into local, validated image files.
//!
//! Every call ends in a usable path: either the downloaded image or the
//! shared placeholder. The [`Resolution`] on the result says which branch was
//! taken so callers can log and count it.

use crate::model::{Resolution, ResolvedImage};
use crate::storage::RemoteFileStore;
use crate::table::CellValue;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extensions a downloaded file may carry, lowercase and without the dot
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];

// Tried in order; the first pattern that matches supplies the id.
static FILE_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/d/([a-zA-Z0-9_-]+)",
        r"id=([a-zA-Z0-9_-]+)",
        r"/uc\?id=([a-zA-Z0-9_-]+)",
        r"open\?id=([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("file id pattern is valid"))
    .collect()
});

/// Extract the remote file id from a share link
pub fn extract_file_id(link: &str) -> Option<&str> {
    FILE_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(link))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Fixed inputs of the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    pub placeholder: PathBuf,
    pub allowed_extensions: Vec<String>,
}

impl ResolverSettings {
    pub fn new(placeholder: impl Into<PathBuf>) -> Self {
        Self {
            placeholder: placeholder.into(),
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }

    pub fn is_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|allowed| *allowed == ext))
    }
}

/// Why a fetched file was rejected
#[derive(Debug, thiserror::Error)]
pub enum ValidationIssue {
    #[error("file does not exist")]
    Missing,
    #[error("extension {0:?} is not an allowed image type")]
    Extension(String),
    #[error("not a well-formed image: {0}")]
    Malformed(String),
}

pub struct ImageResolver<'a> {
    store: &'a dyn RemoteFileStore,
    settings: &'a ResolverSettings,
}

impl<'a> ImageResolver<'a> {
    pub fn new(store: &'a dyn RemoteFileStore, settings: &'a ResolverSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        self.settings
    }

    /// Resolve one cell into an image written at `destination`.
    ///
    /// Never fails. Empty and unparseable cells return the placeholder
    /// without touching the file store; download or validation failures
    /// remove whatever was written at `destination` first.
    pub fn resolve(&self, cell: &CellValue, destination: &Path) -> ResolvedImage {
        let link = cell.normalize();
        if link.is_empty() {
            debug!(destination = %destination.display(), "no link provided");
            return self.fallback(Resolution::NoReference);
        }

        let Some(file_id) = extract_file_id(&link) else {
            warn!(
                destination = %destination.display(),
                link = %link,
                "could not extract file id from link"
            );
            return self.fallback(Resolution::UnparseableReference);
        };

        if let Err(error) = self.store.fetch(file_id, destination) {
            warn!(
                destination = %destination.display(),
                file_id,
                error = %error,
                "download failed"
            );
            discard(destination);
            return self.fallback(Resolution::DownloadFailed);
        }

        match self.validate(destination) {
            Ok(()) => {
                debug!(destination = %destination.display(), file_id, "downloaded and validated");
                ResolvedImage::fetched(destination.to_path_buf())
            }
            Err(issue) => {
                warn!(
                    destination = %destination.display(),
                    file_id,
                    issue = %issue,
                    "downloaded file failed validation"
                );
                discard(destination);
                self.fallback(Resolution::ValidationFailed)
            }
        }
    }

    /// Accept a file only if its extension is allowed and it decodes as an image
    pub fn validate(&self, path: &Path) -> Result<(), ValidationIssue> {
        if !path.is_file() {
            return Err(ValidationIssue::Missing);
        }
        if !self.settings.is_allowed_extension(path) {
            let ext = path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(ValidationIssue::Extension(ext));
        }
        image::ImageReader::open(path)
            .map_err(|e| ValidationIssue::Malformed(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| ValidationIssue::Malformed(e.to_string()))?
            .decode()
            .map_err(|e| ValidationIssue::Malformed(e.to_string()))?;
        Ok(())
    }

    fn fallback(&self, resolution: Resolution) -> ResolvedImage {
        ResolvedImage::placeholder(&self.settings.placeholder, resolution)
    }
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed rejected download"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove rejected download"),
    }
}
