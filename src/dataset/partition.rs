use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::alphabet::Label;

use super::images::list_image_files;
use super::layout::class_directories;
use super::work_dir::WorkDir;

#[derive(Debug, Error)]
pub enum PartitionError {
    /// The dataset root has no subdirectory for the target label.
    #[error("No directory found for label '{label}' at {path}")]
    MissingLabelDirectory { label: Label, path: PathBuf },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to prepare work directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// A materialized binary layout for one target label.
///
/// Paths point at the copies inside the work directory, sorted by file name.
#[derive(Clone, Debug)]
pub struct Partition {
    pub label: Label,
    pub positive: Vec<PathBuf>,
    pub negative: Vec<PathBuf>,
    pub fingerprint: String,
}

/// Counts and fingerprint recorded alongside trained artifacts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub positive: usize,
    pub negative: usize,
    pub fingerprint: String,
}

impl Partition {
    pub fn summary(&self) -> PartitionSummary {
        PartitionSummary {
            positive: self.positive.len(),
            negative: self.negative.len(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    pub fn total(&self) -> usize {
        self.positive.len() + self.negative.len()
    }
}

/// Copy the images of `label` into `positive/` and every other class's images
/// into `negative/` under `work`.
///
/// The work directory is emptied first, so a missing label leaves it clean
/// rather than holding the previous label's layout.
pub fn materialize(
    dataset_root: &Path,
    label: Label,
    work: &mut WorkDir,
) -> Result<Partition, PartitionError> {
    work.reset().map_err(|source| PartitionError::WorkDir {
        path: work.root().to_path_buf(),
        source,
    })?;

    let source_dir = dataset_root.join(label.dir_name());
    if !source_dir.is_dir() {
        return Err(PartitionError::MissingLabelDirectory {
            label,
            path: source_dir,
        });
    }

    let positive_dir = work.positive_dir();
    let negative_dir = work.negative_dir();

    let mut positive = Vec::new();
    for file in read_images(&source_dir)? {
        positive.push(copy_unique(&file, &positive_dir)?);
    }

    let siblings = class_directories(dataset_root).map_err(|source| PartitionError::Read {
        path: dataset_root.to_path_buf(),
        source,
    })?;
    let mut negative = Vec::new();
    for class in siblings.iter().filter(|class| class.name != label.dir_name()) {
        let files = read_images(&class.path)?;
        debug!("Pooling {} images from class '{}'", files.len(), class.name);
        for file in files {
            negative.push(copy_unique(&file, &negative_dir)?);
        }
    }

    positive.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    negative.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    let fingerprint = fingerprint(&positive, &negative)?;
    info!(
        "Partition for '{label}': {} positive, {} negative",
        positive.len(),
        negative.len()
    );
    Ok(Partition {
        label,
        positive,
        negative,
        fingerprint,
    })
}

fn read_images(dir: &Path) -> Result<Vec<PathBuf>, PartitionError> {
    list_image_files(dir).map_err(|source| PartitionError::Read {
        path: dir.to_path_buf(),
        source,
    })
}

/// Copy `file` into `dest_dir`, suffixing the name when a pooled sibling
/// already claimed it.
fn copy_unique(file: &Path, dest_dir: &Path) -> Result<PathBuf, PartitionError> {
    let name = file.file_name().map(PathBuf::from).unwrap_or_default();
    let mut dest = dest_dir.join(&name);
    let mut attempt = 1usize;
    while dest.exists() {
        let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
        let renamed = match name.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}-{attempt}.{ext}"),
            None => format!("{stem}-{attempt}"),
        };
        dest = dest_dir.join(renamed);
        attempt += 1;
    }
    fs::copy(file, &dest).map_err(|source| PartitionError::Copy {
        from: file.to_path_buf(),
        to: dest.clone(),
        source,
    })?;
    Ok(dest)
}

fn fingerprint(positive: &[PathBuf], negative: &[PathBuf]) -> Result<String, PartitionError> {
    let mut hasher = blake3::Hasher::new();
    for (class, files) in [("positive", positive), ("negative", negative)] {
        for file in files {
            let len = fs::metadata(file)
                .map_err(|source| PartitionError::Read {
                    path: file.clone(),
                    source,
                })?
                .len();
            let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            hasher.update(format!("{class}|{name}|{len}\n").as_bytes());
        }
    }
    Ok(hasher.finalize().to_hex().to_string())
}
