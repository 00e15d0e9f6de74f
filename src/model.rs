use crate::table::CellValue;
use serde::Serialize;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display, EnumIter};

/// Header metadata for one store section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreMetadata {
    pub store_name: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub date: String,
}

/// A product column's label and the raw cell from the representative row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCell {
    pub label: String,
    pub cell: CellValue,
}

/// One store's consolidated submission for the target date.
///
/// Built from the first submission row for the store; later rows for the
/// same store and date are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    pub metadata: StoreMetadata,
    /// Raw overall cells in sorted column order
    pub overall: Vec<CellValue>,
    /// Raw product cells in source column order
    pub products: Vec<ProductCell>,
}

/// How a single image reference was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Downloaded and validated
    Fetched,
    /// The cell was empty
    NoReference,
    /// The cell held text with no recognizable file id
    UnparseableReference,
    /// The file store could not deliver the file
    DownloadFailed,
    /// The file arrived but is not an acceptable image
    ValidationFailed,
}

impl Resolution {
    pub fn is_placeholder(self) -> bool {
        self != Resolution::Fetched
    }
}

/// A local image path that always points at something renderable: the
/// validated download or the shared placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub path: PathBuf,
    pub resolution: Resolution,
}

impl ResolvedImage {
    pub fn fetched(path: PathBuf) -> Self {
        Self {
            path,
            resolution: Resolution::Fetched,
        }
    }

    pub fn placeholder(placeholder: &Path, resolution: Resolution) -> Self {
        Self {
            path: placeholder.to_path_buf(),
            resolution,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.resolution.is_placeholder()
    }
}

/// A product image ready for layout, after the overlay step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledImage {
    pub label: String,
    pub path: PathBuf,
}

/// Sort product entries case-insensitively by label, keeping source order
/// between labels that compare equal.
pub fn sort_by_label<T>(items: &mut [T], label: impl Fn(&T) -> &str) {
    items.sort_by_cached_key(|item| label(item).to_lowercase());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_label_is_case_insensitive() {
        let mut labels = vec!["banana", "Apple", "cherry", "apricot"];
        sort_by_label(&mut labels, |s| s);
        assert_eq!(labels, vec!["Apple", "apricot", "banana", "cherry"]);
    }

    #[test]
    fn test_resolution_labels() {
        assert_eq!(Resolution::NoReference.to_string(), "no_reference");
        assert_eq!(
            Resolution::UnparseableReference.as_ref(),
            "unparseable_reference"
        );
        assert!(!Resolution::Fetched.is_placeholder());
        assert!(Resolution::DownloadFailed.is_placeholder());
    }
}
