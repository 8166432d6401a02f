//! Dataset acquisition from the hosting API: credentials, archive download,
//! guarded extraction and dataset-root discovery.

pub mod archive;
pub mod credentials;
pub mod download;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use archive::ArchiveError;
pub use credentials::{CredentialError, CredentialResolver, CredentialSource, KaggleCredentials};
pub use download::{DatasetDownload, DownloadOptions, fetch_dataset};

/// Acquisition failures. All of them are fatal to the download.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("Invalid dataset name '{0}', expected owner/name")]
    InvalidDataset(String),
    #[error("Invalid download URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid SHA-256 digest '{0}'")]
    InvalidChecksum(String),
    #[error("{0}")]
    Http(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Archive SHA-256 mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("No label directories found under {0}")]
    NoDatasetRoot(PathBuf),
}

impl AcquireError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
