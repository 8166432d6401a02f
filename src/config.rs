//! `asl_classifier.toml`: paths, backend choice and training hyperparameters.
//!
//! Every field has a default, so a missing or empty file is a valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::acquire::DownloadOptions;
use crate::alphabet::{Label, parse_label_list};
use crate::app_dirs;
use crate::ml::augment::AugmentOptions;
use crate::ml::backend::BackendKind;
use crate::ml::train::TrainOptions;

pub const CONFIG_FILE_NAME: &str = "asl_classifier.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A value parsed but is out of range.
    #[error("Invalid config at {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding one subdirectory per label.
    pub dataset_root: PathBuf,
    /// Where per-label artifacts and the batch report are written.
    pub models_dir: PathBuf,
    /// Scratch directory for partitions; a fresh temporary directory when unset.
    pub work_dir: Option<PathBuf>,
    pub backend: BackendKind,
    /// Subset of the alphabet to train, e.g. `"abc019"`. All labels when unset.
    pub labels: Option<String>,
    pub training: TrainOptions,
    pub augmentation: AugmentOptions,
    pub download: DownloadOptions,
    /// File the config was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("asl_dataset"),
            models_dir: PathBuf::from("models"),
            work_dir: None,
            backend: BackendKind::default(),
            labels: None,
            training: TrainOptions::default(),
            augmentation: AugmentOptions::default(),
            download: DownloadOptions::default(),
            source: None,
        }
    }
}

impl AppConfig {
    /// Load `explicit` if given, else the app directory config if present,
    /// else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match app_config_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        config.source = Some(path.to_path_buf());
        if nests_augmentation(&text) {
            return Err(config.invalid(
                "[training.augmentation] is not read; use the [augmentation] section".into(),
            ));
        }
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.train_options()
            .validate()
            .map_err(|err| self.invalid(err.to_string()))?;
        self.label_set()?;
        Ok(())
    }

    /// Training options with the `[augmentation]` section applied.
    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            augmentation: self.augmentation.clone(),
            ..self.training.clone()
        }
    }

    /// Labels to train, in alphabet order.
    pub fn label_set(&self) -> Result<Vec<Label>, ConfigError> {
        match &self.labels {
            Some(list) => parse_label_list(list).map_err(|err| self.invalid(err.to_string())),
            None => Ok(Label::all().collect()),
        }
    }

    fn invalid(&self, message: String) -> ConfigError {
        ConfigError::Invalid {
            path: self.source.clone().unwrap_or_default(),
            message,
        }
    }
}

/// Whether the file sets `training.augmentation`, which `[augmentation]` replaces.
fn nests_augmentation(text: &str) -> bool {
    toml::from_str::<toml::Table>(text).is_ok_and(|table| {
        table
            .get("training")
            .and_then(|training| training.get("augmentation"))
            .is_some()
    })
}

/// `asl_classifier.toml` inside the application directory.
pub fn app_config_path() -> Option<PathBuf> {
    app_dirs::app_root_dir()
        .ok()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_dirs::ConfigBaseGuard;
    use tempfile::tempdir;

    #[test]
    fn empty_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.training, TrainOptions::default());
        assert_eq!(config.label_set().unwrap().len(), 36);
        assert_eq!(config.source, Some(path));
    }

    #[test]
    fn sections_override_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
dataset_root = "data/asl"
backend = "cpu"
labels = "ab7"

[training]
epochs = 3
batch_size = 8

[augmentation]
enabled = false

[download]
dataset = "someone/signs"
sha256 = "abc"
"#,
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.dataset_root, PathBuf::from("data/asl"));
        assert_eq!(config.backend, BackendKind::Cpu);
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.learning_rate, 1e-3);
        assert!(!config.train_options().augmentation.enabled);
        assert_eq!(config.download.dataset, "someone/signs");
        let labels: String = config.label_set().unwrap().iter().map(|l| l.as_char()).collect();
        assert_eq!(labels, "ab7");
    }

    #[test]
    fn invalid_values_are_reported_with_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "[training]\nbatch_size = 0\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("bad.toml"));

        std::fs::write(&path, "labels = \"a?\"\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path).unwrap_err(),
            ConfigError::Invalid { .. }
        ));

        std::fs::write(&path, "epochs = [\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path).unwrap_err(),
            ConfigError::ParseToml { .. }
        ));
    }

    #[test]
    fn nested_training_augmentation_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested.toml");
        std::fs::write(&path, "[training.augmentation]\nenabled = false\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("[augmentation]"));

        std::fs::write(&path, "[training]\nepochs = 4\n\n[augmentation]\nenabled = false\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.train_options().epochs, 4);
        assert!(!config.train_options().augmentation.enabled);
    }

    #[test]
    fn resolves_app_dir_file_when_no_explicit_path() {
        let base = tempdir().unwrap();
        let _guard = ConfigBaseGuard::set(base.path().to_path_buf());
        assert_eq!(AppConfig::resolve(None).unwrap(), AppConfig::default());

        let path = app_config_path().unwrap();
        std::fs::write(&path, "models_dir = \"trained\"\n").unwrap();
        let config = AppConfig::resolve(None).unwrap();
        assert_eq!(config.models_dir, PathBuf::from("trained"));
    }
}
