use std::path::Path;

use burn::prelude::*;
use thiserror::Error;
use tracing::warn;

use crate::alphabet::Label;
use crate::dataset::batch::hwc_to_chw;
use crate::dataset::images::{RgbRaster, load_rgb_raster, resize_raster};

use super::artifact::{ArtifactError, ArtifactMetadata, available_labels, load_artifact};
use super::model::{SignCnn, SignCnnConfig};

#[derive(Debug, Error)]
pub enum InferError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("Failed to load image {path}: {message}")]
    Image { path: String, message: String },
    #[error("No trained models found in {0}")]
    NoModels(String),
}

/// One loaded per-label classifier.
pub struct SignClassifier<B: Backend> {
    model: SignCnn<B>,
    metadata: ArtifactMetadata,
    device: B::Device,
}

impl<B: Backend> SignClassifier<B> {
    pub fn load(models_dir: &Path, label: Label, device: &B::Device) -> Result<Self, InferError> {
        let (model, metadata) = load_artifact::<B>(models_dir, label, device)?;
        Ok(Self {
            model,
            metadata,
            device: device.clone(),
        })
    }

    pub fn label(&self) -> Label {
        self.metadata.label
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Probability that `raster` shows this classifier's sign. Rasters of a
    /// different size are resized first.
    pub fn predict(&self, raster: &RgbRaster) -> f32 {
        let size = self.metadata.image_size();
        let resized;
        let raster = if raster.width == size && raster.height == size {
            raster
        } else {
            resized = resize_raster(raster, size as u32);
            &resized
        };
        let chw = hwc_to_chw(&raster.to_unit_f32(), size);
        let input = Tensor::<B, 4>::from_data(TensorData::new(chw, [1, 3, size, size]), &self.device);
        self.model
            .predict_proba(input)
            .into_data()
            .to_vec::<f32>()
            .ok()
            .and_then(|values| values.first().copied())
            .unwrap_or(0.0)
    }
}

/// A set of per-label classifiers scored together.
pub struct ClassifierSet<B: Backend> {
    classifiers: Vec<SignClassifier<B>>,
}

impl<B: Backend> ClassifierSet<B> {
    /// Load every artifact found in `models_dir`, skipping unreadable ones.
    pub fn load_all(models_dir: &Path, device: &B::Device) -> Result<Self, InferError> {
        let mut classifiers = Vec::new();
        for label in available_labels(models_dir) {
            match SignClassifier::load(models_dir, label, device) {
                Ok(classifier) => classifiers.push(classifier),
                Err(err) => warn!("Skipping model for '{label}': {err}"),
            }
        }
        if classifiers.is_empty() {
            return Err(InferError::NoModels(models_dir.display().to_string()));
        }
        Ok(Self { classifiers })
    }

    pub fn labels(&self) -> Vec<Label> {
        self.classifiers.iter().map(SignClassifier::label).collect()
    }

    /// Input side length of the first model; the others resize as needed.
    pub fn image_size(&self) -> usize {
        self.classifiers
            .first()
            .map_or(SignCnnConfig::new().image_size, |c| c.metadata.image_size())
    }

    /// Every label's probability for `raster`, highest first.
    pub fn rank(&self, raster: &RgbRaster) -> Vec<(Label, f32)> {
        let mut scores: Vec<(Label, f32)> = self
            .classifiers
            .iter()
            .map(|classifier| (classifier.label(), classifier.predict(raster)))
            .collect();
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        scores
    }
}

/// Decode an image for scoring at `size`×`size`.
pub fn load_query_image(path: &Path, size: u32) -> Result<RgbRaster, InferError> {
    load_rgb_raster(path, size).map_err(|err| InferError::Image {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}
