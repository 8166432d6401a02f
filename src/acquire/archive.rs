use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

const MAX_ZIP_ENTRIES: usize = 10_000;
const MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES: u64 = 512 * 1024 * 1024;
const MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES: u64 = 4 * 1024 * 1024 * 1024;
const MAX_ZIP_COMPRESSION_RATIO: u64 = 200;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid zip archive: {0}")]
    Zip(String),
    #[error("{0}")]
    Limit(String),
    #[error("Failed to extract {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Caps applied while unpacking a downloaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipExtractionLimits {
    pub max_entries: usize,
    pub max_entry_uncompressed_bytes: u64,
    pub max_total_uncompressed_bytes: u64,
    pub max_compression_ratio: u64,
}

impl ZipExtractionLimits {
    pub fn standard() -> Self {
        Self {
            max_entries: MAX_ZIP_ENTRIES,
            max_entry_uncompressed_bytes: MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES,
            max_total_uncompressed_bytes: MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES,
            max_compression_ratio: MAX_ZIP_COMPRESSION_RATIO,
        }
    }
}

impl Default for ZipExtractionLimits {
    fn default() -> Self {
        Self::standard()
    }
}

/// Compute the SHA-256 hex digest for a local file.
pub fn sha256_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Normalize a user-supplied SHA-256 digest to 64 lowercase hex characters.
pub fn normalize_sha256(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.len() != 64 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

/// Extract `zip_path` into `dest_dir`, returning the number of files written.
///
/// Entries whose names escape `dest_dir` are skipped.
pub fn unzip_to_dir_with_limits(
    zip_path: &Path,
    dest_dir: &Path,
    limits: ZipExtractionLimits,
) -> Result<usize, ArchiveError> {
    let file = File::open(zip_path).map_err(|source| io_error(zip_path, source))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| ArchiveError::Zip(err.to_string()))?;
    let entry_count = archive.len();
    if entry_count > limits.max_entries {
        return Err(ArchiveError::Limit(format!(
            "Archive has {entry_count} entries, limit is {}",
            limits.max_entries
        )));
    }
    let mut total_uncompressed: u64 = 0;
    let mut written = 0;
    for i in 0..entry_count {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ArchiveError::Zip(err.to_string()))?;
        let uncompressed_size = entry.size();
        if uncompressed_size > limits.max_entry_uncompressed_bytes {
            return Err(ArchiveError::Limit(format!(
                "Archive entry '{}' is too large ({} bytes, limit {})",
                entry.name(),
                uncompressed_size,
                limits.max_entry_uncompressed_bytes
            )));
        }
        if uncompressed_size > 0 {
            let compressed_size = entry.compressed_size();
            if compressed_size == 0
                || uncompressed_size > compressed_size.saturating_mul(limits.max_compression_ratio)
            {
                return Err(ArchiveError::Limit(format!(
                    "Archive entry '{}' exceeds compression ratio limit",
                    entry.name()
                )));
            }
        }
        total_uncompressed = total_uncompressed
            .checked_add(uncompressed_size)
            .ok_or_else(|| ArchiveError::Limit("Archive size overflow".into()))?;
        if total_uncompressed > limits.max_total_uncompressed_bytes {
            return Err(ArchiveError::Limit(format!(
                "Archive extracted size {} exceeds limit {}",
                total_uncompressed, limits.max_total_uncompressed_bytes
            )));
        }
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let outpath = dest_dir.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|source| io_error(&outpath, source))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        let mut outfile = File::create(&outpath).map_err(|source| io_error(&outpath, source))?;
        std::io::copy(&mut entry, &mut outfile).map_err(|source| io_error(&outpath, source))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if entry.unix_mode().is_some() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(0o644))
                    .map_err(|source| io_error(&outpath, source))?;
            }
        }
        written += 1;
    }
    Ok(written)
}

fn io_error(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn small_limits() -> ZipExtractionLimits {
        ZipExtractionLimits {
            max_entries: 10,
            max_entry_uncompressed_bytes: 100,
            max_total_uncompressed_bytes: 100,
            max_compression_ratio: 100,
        }
    }

    #[test]
    fn extracts_nested_entries() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("data.zip");
        write_zip(
            &zip_path,
            &[("asl_dataset/a/1.jpeg", b"one"), ("asl_dataset/b/2.jpeg", b"two")],
        );
        let out = temp.path().join("out");
        let written = unzip_to_dir_with_limits(&zip_path, &out, small_limits()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read(out.join("asl_dataset/b/2.jpeg")).unwrap(), b"two");
    }

    #[test]
    fn rejects_entry_over_size_limit() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("oversize.zip");
        write_zip(&zip_path, &[("big.bin", &[1u8; 8])]);
        let limits = ZipExtractionLimits {
            max_entry_uncompressed_bytes: 4,
            ..small_limits()
        };
        let err = unzip_to_dir_with_limits(&zip_path, &temp.path().join("out"), limits).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn rejects_total_over_limit() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("total.zip");
        write_zip(&zip_path, &[("a.bin", &[1u8; 60]), ("b.bin", &[2u8; 60])]);
        let limits = ZipExtractionLimits {
            max_compression_ratio: 1_000,
            ..small_limits()
        };
        let err = unzip_to_dir_with_limits(&zip_path, &temp.path().join("out"), limits).unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }

    #[test]
    fn rejects_too_many_entries() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("many.zip");
        write_zip(&zip_path, &[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        let limits = ZipExtractionLimits {
            max_entries: 2,
            ..small_limits()
        };
        let err = unzip_to_dir_with_limits(&zip_path, &temp.path().join("out"), limits).unwrap_err();
        assert!(matches!(err, ArchiveError::Limit(_)));
    }

    #[test]
    fn skips_entries_escaping_destination() {
        let temp = tempdir().unwrap();
        let zip_path = temp.path().join("escape.zip");
        write_zip(&zip_path, &[("../evil.txt", b"x"), ("ok.txt", b"y")]);
        let out = temp.path().join("out");
        let written = unzip_to_dir_with_limits(&zip_path, &out, small_limits()).unwrap();
        assert_eq!(written, 1);
        assert!(!temp.path().join("evil.txt").exists());
        assert!(out.join("ok.txt").is_file());
    }

    #[test]
    fn normalizes_digests() {
        let upper = "A".repeat(64);
        assert_eq!(normalize_sha256(&format!(" {upper} ")), Some("a".repeat(64)));
        assert_eq!(normalize_sha256("abc"), None);
        assert_eq!(normalize_sha256(&"g".repeat(64)), None);
    }
}
