use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::dataset::layout::{DatasetCensus, census, locate_dataset_root};
use crate::http_client;

use super::AcquireError;
use super::archive::{ZipExtractionLimits, normalize_sha256, sha256_file, unzip_to_dir_with_limits};
use super::credentials::{CredentialError, KaggleCredentials};

pub const DEFAULT_DATASET: &str = "ayuraj/asl-dataset";
pub const DEFAULT_OUTPUT_DIR: &str = "asl_dataset";
pub const DEFAULT_API_BASE: &str = "https://www.kaggle.com/api/v1";
const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 2 * 1024 * 1024 * 1024;
/// Levels below the output directory searched for the dataset root.
const DATASET_ROOT_SEARCH_DEPTH: usize = 3;

/// The `[download]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// `owner/name` on the dataset host.
    pub dataset: String,
    pub output_dir: PathBuf,
    pub api_base: String,
    /// Expected SHA-256 of the archive, checked when set.
    pub sha256: Option<String>,
    /// Remove `output_dir` before extracting.
    pub cleanup: bool,
    pub max_archive_bytes: u64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            api_base: DEFAULT_API_BASE.to_string(),
            sha256: None,
            cleanup: false,
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
        }
    }
}

/// Result of a completed download.
#[derive(Debug, Clone)]
pub struct DatasetDownload {
    pub archive_bytes: u64,
    pub archive_sha256: String,
    pub extracted_files: usize,
    pub dataset_root: PathBuf,
    pub census: DatasetCensus,
}

/// Download, verify and extract the dataset archive into `options.output_dir`.
pub fn fetch_dataset(
    options: &DownloadOptions,
    credentials: &KaggleCredentials,
) -> Result<DatasetDownload, AcquireError> {
    let url = download_url(&options.api_base, &options.dataset)?;
    let expected = match &options.sha256 {
        Some(value) => Some(
            normalize_sha256(value)
                .ok_or_else(|| AcquireError::InvalidChecksum(value.to_string()))?,
        ),
        None => None,
    };
    if options.cleanup && options.output_dir.exists() {
        info!("Removing {}", options.output_dir.display());
        fs::remove_dir_all(&options.output_dir)
            .map_err(|source| AcquireError::io(&options.output_dir, source))?;
    }
    fs::create_dir_all(&options.output_dir)
        .map_err(|source| AcquireError::io(&options.output_dir, source))?;

    info!("Downloading {} from {}", options.dataset, redact(&url));
    let archive = tempfile::Builder::new()
        .prefix("asl-dataset-")
        .suffix(".zip")
        .tempfile()
        .map_err(|source| AcquireError::io(&std::env::temp_dir(), source))?;
    let archive_bytes = download_archive(&url, credentials, archive.path(), options.max_archive_bytes)?;
    let archive_sha256 = sha256_file(archive.path()).map_err(|source| AcquireError::io(archive.path(), source))?;
    if let Some(expected) = expected
        && expected != archive_sha256
    {
        return Err(AcquireError::ChecksumMismatch {
            expected,
            actual: archive_sha256,
        });
    }
    info!("Downloaded {archive_bytes} bytes (sha256 {archive_sha256})");

    let extracted_files =
        unzip_to_dir_with_limits(archive.path(), &options.output_dir, ZipExtractionLimits::standard())?;
    let dataset_root = locate_dataset_root(&options.output_dir, DATASET_ROOT_SEARCH_DEPTH)
        .ok_or_else(|| AcquireError::NoDatasetRoot(options.output_dir.clone()))?;
    let census = census(&dataset_root).map_err(|source| AcquireError::io(&dataset_root, source))?;
    let missing = census.missing_labels();
    if !missing.is_empty() {
        let names: String = missing.iter().map(|label| label.as_char()).collect();
        warn!("Dataset has no directory for labels: {names}");
    }
    info!(
        "Extracted {extracted_files} files; dataset root {} with {} images in {} classes",
        dataset_root.display(),
        census.total_images(),
        census.classes.len()
    );
    Ok(DatasetDownload {
        archive_bytes,
        archive_sha256,
        extracted_files,
        dataset_root,
        census,
    })
}

/// Build the archive URL for `dataset` (`owner/name`) under `api_base`.
pub fn download_url(api_base: &str, dataset: &str) -> Result<Url, AcquireError> {
    let (owner, name) = dataset
        .split_once('/')
        .filter(|(owner, name)| valid_slug(owner) && valid_slug(name))
        .ok_or_else(|| AcquireError::InvalidDataset(dataset.to_string()))?;
    let base = Url::parse(api_base.trim_end_matches('/'))
        .map_err(|err| AcquireError::InvalidUrl(format!("{api_base}: {err}")))?;
    validate_scheme(&base)?;
    let url = format!(
        "{}/datasets/download/{owner}/{name}",
        base.as_str().trim_end_matches('/')
    );
    Url::parse(&url).map_err(|err| AcquireError::InvalidUrl(format!("{url}: {err}")))
}

fn valid_slug(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && value != "."
        && value != ".."
}

/// Only https is accepted, except plain http to a loopback host.
fn validate_scheme(url: &Url) -> Result<(), AcquireError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(url) => Ok(()),
        other => Err(AcquireError::InvalidUrl(format!(
            "Unsupported scheme '{other}' in {url}"
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    let _ = shown.set_password(None);
    let _ = shown.set_username("");
    shown.to_string()
}

fn download_archive(
    url: &Url,
    credentials: &KaggleCredentials,
    dest: &Path,
    max_bytes: u64,
) -> Result<u64, AcquireError> {
    let response = http_client::agent()
        .get(url.as_str())
        .set("Authorization", &credentials.basic_auth_header())
        .call()
        .map_err(|err| match err {
            ureq::Error::Status(status @ (401 | 403), _) => {
                AcquireError::Credentials(CredentialError::Rejected { status })
            }
            ureq::Error::Status(status, _) => {
                AcquireError::Http(format!("Failed to download {}: HTTP {status}", redact(url)))
            }
            other => AcquireError::Http(format!("Failed to download {}: {other}", redact(url))),
        })?;
    let mut file = fs::File::create(dest).map_err(|source| AcquireError::io(dest, source))?;
    let written = http_client::copy_response_to_writer(response, &mut file, max_bytes)
        .map_err(|source| AcquireError::io(dest, source))?;
    file.flush().map_err(|source| AcquireError::io(dest, source))?;
    Ok(written)
}
