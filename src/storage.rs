//! Remote file store collaborators
//!
//! The resolver only needs `fetch(id, destination)`. Production runs use
//! [`DriveFileStore`]; offline runs and fixtures use [`MirrorFileStore`],
//! which serves file ids out of a local directory.

use crate::error::FetchError;
use crate::recovery::{ExponentialBackoff, RetryConfig, retry_with_policy};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DRIVE_FILES_BASE: &str = "https://www.googleapis.com/drive/v3/files";

/// Fetches a remote file by id and writes its bytes to a local path
pub trait RemoteFileStore {
    fn fetch(&self, file_id: &str, destination: &Path) -> Result<(), FetchError>;
}

impl<T: RemoteFileStore + ?Sized> RemoteFileStore for &T {
    fn fetch(&self, file_id: &str, destination: &Path) -> Result<(), FetchError> {
        (**self).fetch(file_id, destination)
    }
}

impl<T: RemoteFileStore + ?Sized> RemoteFileStore for Box<T> {
    fn fetch(&self, file_id: &str, destination: &Path) -> Result<(), FetchError> {
        (**self).fetch(file_id, destination)
    }
}

/// Google Drive media download with a bearer token
#[derive(Debug, Clone)]
pub struct DriveFileStore {
    access_token: String,
    client: Client,
    retry: RetryConfig,
}

impl DriveFileStore {
    pub fn new(
        access_token: impl Into<String>,
        timeout: Duration,
        max_attempts: u32,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            access_token: access_token.into(),
            client,
            retry: RetryConfig::with_max_attempts(max_attempts),
        })
    }

    fn download_once(&self, file_id: &str, destination: &Path) -> Result<(), FetchError> {
        let url = format!("{DRIVE_FILES_BASE}/{file_id}");
        let mut response = self
            .client
            .get(&url)
            .query(&[("alt", "media")])
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|e| FetchError::network(file_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(file_id, status.as_u16()));
        }

        let file = File::create(destination).map_err(|source| FetchError::Io {
            id: file_id.to_string(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        // Body errors mid-stream are network failures, not local ones
        response
            .copy_to(&mut writer)
            .map_err(|e| FetchError::network(file_id, e))?;
        writer.flush().map_err(|source| FetchError::Io {
            id: file_id.to_string(),
            source,
        })
    }
}

impl RemoteFileStore for DriveFileStore {
    fn fetch(&self, file_id: &str, destination: &Path) -> Result<(), FetchError> {
        let policy = ExponentialBackoff::new(self.retry.clone());
        retry_with_policy(
            || self.download_once(file_id, destination),
            &policy,
            "drive_download",
        )
    }
}

/// Serves ids from a local directory: `<root>/<id>` or `<root>/<id>.<ext>`
#[derive(Debug, Clone)]
pub struct MirrorFileStore {
    root: PathBuf,
}

impl MirrorFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, file_id: &str) -> Option<PathBuf> {
        let exact = self.root.join(file_id);
        if exact.is_file() {
            return Some(exact);
        }
        let mut candidates: Vec<PathBuf> = fs::read_dir(&self.root)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && path.file_stem().is_some_and(|stem| stem == file_id)
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }
}

impl RemoteFileStore for MirrorFileStore {
    fn fetch(&self, file_id: &str, destination: &Path) -> Result<(), FetchError> {
        let source = self.locate(file_id).ok_or_else(|| FetchError::NotFound {
            id: file_id.to_string(),
        })?;
        fs::copy(&source, destination).map_err(|source| FetchError::Io {
            id: file_id.to_string(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mirror_serves_exact_and_extension_matches() {
        let tmp = tempdir().expect("tempdir");
        let mirror = tmp.path().join("mirror");
        fs::create_dir_all(&mirror).expect("mkdir");
        fs::write(mirror.join("exact-id"), b"one").expect("write");
        fs::write(mirror.join("with-ext.png"), b"two").expect("write");

        let store = MirrorFileStore::new(&mirror);
        let dest = tmp.path().join("out.jpg");

        store.fetch("exact-id", &dest).expect("exact");
        assert_eq!(fs::read(&dest).expect("read"), b"one");

        store.fetch("with-ext", &dest).expect("by stem");
        assert_eq!(fs::read(&dest).expect("read"), b"two");
    }

    #[test]
    fn test_mirror_reports_not_found() {
        let tmp = tempdir().expect("tempdir");
        let store = MirrorFileStore::new(tmp.path());
        let err = store
            .fetch("missing", &tmp.path().join("out.jpg"))
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
        assert!(!err.is_transient());
    }
}
