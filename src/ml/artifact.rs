//! Persisted per-label models: a burnpack weights file plus a JSON sidecar.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn_store::{BurnpackStore, ModuleSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::alphabet::Label;
use crate::dataset::partition::PartitionSummary;

use super::history::TrainingHistory;
use super::model::{SignCnn, SignCnnConfig};
use super::train::TrainOptions;

pub const MODEL_EXTENSION: &str = "bpk";
pub const METADATA_EXTENSION: &str = "json";
const METADATA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to create models directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid metadata in {path}: {source}")]
    Metadata {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Model store error for {path}: {message}")]
    Store { path: PathBuf, message: String },
    #[error("No model for label '{label}' at {path}")]
    Missing { label: Label, path: PathBuf },
    #[error("Model path {0} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
}

/// Everything recorded about how an artifact was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub version: u32,
    pub label: Label,
    pub model: SignCnnConfig,
    pub options: TrainOptions,
    pub history: TrainingHistory,
    pub partition: PartitionSummary,
    pub skipped_images: usize,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
}

impl ArtifactMetadata {
    pub fn new(
        label: Label,
        model: SignCnnConfig,
        options: TrainOptions,
        history: TrainingHistory,
        partition: PartitionSummary,
        skipped_images: usize,
    ) -> Self {
        Self {
            version: METADATA_VERSION,
            label,
            model,
            options,
            history,
            partition,
            skipped_images,
            created_at: now_rfc3339(),
        }
    }

    pub fn image_size(&self) -> usize {
        self.model.image_size
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

/// Locations of a label's artifact files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn for_label(models_dir: &Path, label: Label) -> Self {
        let stem = label.artifact_stem();
        Self {
            model: models_dir.join(format!("{stem}.{MODEL_EXTENSION}")),
            metadata: models_dir.join(format!("{stem}.{METADATA_EXTENSION}")),
        }
    }

    pub fn exists(&self) -> bool {
        self.model.is_file() && self.metadata.is_file()
    }
}

/// Write `model` and `metadata`, replacing any earlier artifact of the label.
pub fn save_artifact<B: Backend>(
    models_dir: &Path,
    model: &SignCnn<B>,
    metadata: &ArtifactMetadata,
) -> Result<ArtifactPaths, ArtifactError> {
    fs::create_dir_all(models_dir).map_err(|source| ArtifactError::CreateDir {
        path: models_dir.to_path_buf(),
        source,
    })?;
    let paths = ArtifactPaths::for_label(models_dir, metadata.label);
    let staged = staging_paths(models_dir, metadata.label);
    remove_if_exists(&staged.model)?;
    let mut store = BurnpackStore::from_file(path_str(&staged.model)?);
    if let Err(err) = model.save_into(&mut store) {
        discard(&staged);
        return Err(ArtifactError::Store {
            path: staged.model,
            message: format!("{err:?}"),
        });
    }
    if let Err(err) = write_metadata(&staged.metadata, metadata) {
        discard(&staged);
        return Err(err);
    }
    // Both files are complete; the earlier artifact is only replaced from here on.
    for (from, to) in [(&staged.model, &paths.model), (&staged.metadata, &paths.metadata)] {
        if let Err(source) = fs::rename(from, to) {
            discard(&staged);
            return Err(ArtifactError::Write {
                path: to.clone(),
                source,
            });
        }
    }
    info!("Saved model for '{}' to {}", metadata.label, paths.model.display());
    Ok(paths)
}

fn staging_paths(models_dir: &Path, label: Label) -> ArtifactPaths {
    let stem = label.artifact_stem();
    ArtifactPaths {
        model: models_dir.join(format!("{stem}.partial.{MODEL_EXTENSION}")),
        metadata: models_dir.join(format!("{stem}.partial.{METADATA_EXTENSION}")),
    }
}

fn discard(staged: &ArtifactPaths) {
    let _ = fs::remove_file(&staged.model);
    let _ = fs::remove_file(&staged.metadata);
}

fn write_metadata(path: &Path, metadata: &ArtifactMetadata) -> Result<(), ArtifactError> {
    let json = serde_json::to_vec_pretty(metadata).map_err(|source| ArtifactError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_metadata(path: &Path) -> Result<ArtifactMetadata, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Metadata {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the artifact of `label` from `models_dir`.
pub fn load_artifact<B: Backend>(
    models_dir: &Path,
    label: Label,
    device: &B::Device,
) -> Result<(SignCnn<B>, ArtifactMetadata), ArtifactError> {
    let paths = ArtifactPaths::for_label(models_dir, label);
    if !paths.exists() {
        return Err(ArtifactError::Missing {
            label,
            path: paths.model,
        });
    }
    let metadata = load_metadata(&paths.metadata)?;
    let mut model = metadata.model.init::<B>(device);
    let mut store = BurnpackStore::from_file(path_str(&paths.model)?);
    model
        .load_from(&mut store)
        .map_err(|err| ArtifactError::Store {
            path: paths.model.clone(),
            message: format!("{err:?}"),
        })?;
    Ok((model, metadata))
}

/// Labels with a complete artifact in `models_dir`, in alphabet order.
pub fn available_labels(models_dir: &Path) -> Vec<Label> {
    Label::all()
        .filter(|label| ArtifactPaths::for_label(models_dir, *label).exists())
        .collect()
}

fn remove_if_exists(path: &Path) -> Result<(), ArtifactError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ArtifactError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn path_str(path: &Path) -> Result<&str, ArtifactError> {
    path.to_str()
        .ok_or_else(|| ArtifactError::NonUtf8Path(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use tempfile::tempdir;

    type B = NdArray;

    fn metadata(label: Label, image_size: usize) -> ArtifactMetadata {
        ArtifactMetadata::new(
            label,
            SignCnnConfig::new().with_image_size(image_size),
            TrainOptions::default(),
            TrainingHistory::default(),
            PartitionSummary {
                positive: 3,
                negative: 9,
                fingerprint: "abc".into(),
            },
            0,
        )
    }

    #[test]
    fn paths_follow_naming_convention() {
        let paths = ArtifactPaths::for_label(Path::new("models"), Label::new('Q').unwrap());
        assert_eq!(paths.model, Path::new("models/asl_model_q.bpk"));
        assert_eq!(paths.metadata, Path::new("models/asl_model_q.json"));
    }

    #[test]
    fn saved_model_reloads_with_identical_outputs() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let label = Label::new('7').unwrap();
        let meta = metadata(label, 24);
        let model = meta.model.init::<B>(&device);
        let paths = save_artifact(dir.path(), &model, &meta).unwrap();
        assert!(paths.exists());
        assert_eq!(available_labels(dir.path()), vec![label]);

        let (loaded, loaded_meta) = load_artifact::<B>(dir.path(), label, &device).unwrap();
        assert_eq!(loaded_meta.label, label);
        assert_eq!(loaded_meta.image_size(), 24);
        assert_eq!(loaded_meta.partition.negative, 9);

        let input = Tensor::<B, 4>::ones([1, 3, 24, 24], &device);
        let before = model.predict_proba(input.clone()).into_data().to_vec::<f32>().unwrap();
        let after = loaded.predict_proba(input).into_data().to_vec::<f32>().unwrap();
        assert!((before[0] - after[0]).abs() < 1e-6);
    }

    #[test]
    fn saving_twice_replaces_artifact() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let label = Label::new('a').unwrap();
        let meta = metadata(label, 24);
        let model = meta.model.init::<B>(&device);
        save_artifact(dir.path(), &model, &meta).unwrap();
        save_artifact(dir.path(), &model, &meta).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "{names:?}");
    }

    #[test]
    fn failed_save_keeps_previous_artifact() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let label = Label::new('a').unwrap();
        let meta = metadata(label, 24);
        let model = meta.model.init::<B>(&device);
        let paths = save_artifact(dir.path(), &model, &meta).unwrap();
        let model_bytes = fs::read(&paths.model).unwrap();
        let meta_bytes = fs::read(&paths.metadata).unwrap();

        // A directory in the way makes the staged metadata write fail.
        let staged = staging_paths(dir.path(), label);
        fs::create_dir(&staged.metadata).unwrap();
        let retrained = metadata(label, 32);
        let err = save_artifact(dir.path(), &retrained.model.init::<B>(&device), &retrained)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Write { .. }));

        assert_eq!(fs::read(&paths.model).unwrap(), model_bytes);
        assert_eq!(fs::read(&paths.metadata).unwrap(), meta_bytes);
        assert!(!staged.model.exists());
        assert_eq!(available_labels(dir.path()), vec![label]);
        assert_eq!(load_metadata(&paths.metadata).unwrap().image_size(), 24);
    }

    #[test]
    fn missing_artifact_is_reported() {
        let dir = tempdir().unwrap();
        let err = load_artifact::<B>(dir.path(), Label::new('b').unwrap(), &Default::default())
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Missing { .. }));
    }
}
