//! Binary classifier training loop.

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::dataset::batch::{Batch, ImageSample, ImageSet, assemble_batch, epoch_order, load_image_set};
use crate::dataset::partition::Partition;
use crate::dataset::split::{BinaryClass, split_by_class};

use super::augment::AugmentOptions;
use super::callbacks::{EarlyStopDecision, EarlyStopping, PlateauOptions, ReduceLrOnPlateau};
use super::history::{EpochMetrics, TrainingHistory};
use super::metrics::{BinaryConfusion, MeanLoss};
use super::model::{SignCnn, SignCnnConfig, binary_cross_entropy_with_logits};

/// Adam epsilon as used by Keras.
const ADAM_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    /// Square input resolution in pixels.
    pub image_size: u32,
    pub batch_size: usize,
    /// Fraction of each class held out for validation.
    pub validation_split: f64,
    /// Upper bound on epochs; early stopping usually ends sooner.
    pub epochs: usize,
    pub learning_rate: f64,
    pub early_stopping_patience: usize,
    pub lr_plateau: PlateauOptions,
    /// Seed for the per-epoch shuffle.
    pub seed: u64,
    pub augmentation: AugmentOptions,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            image_size: 64,
            batch_size: 32,
            validation_split: 0.2,
            epochs: 20,
            learning_rate: 1e-3,
            early_stopping_patience: 5,
            lr_plateau: PlateauOptions::default(),
            seed: 42,
            augmentation: AugmentOptions::default(),
        }
    }
}

impl TrainOptions {
    pub fn model_config(&self) -> SignCnnConfig {
        SignCnnConfig::new().with_image_size(self.image_size as usize)
    }

    pub fn validate(&self) -> Result<(), TrainError> {
        let invalid = |msg: String| -> Result<(), TrainError> { Err(TrainError::InvalidOptions(msg)) };
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if self.epochs == 0 {
            return invalid("epochs must be at least 1".into());
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return invalid(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.model_config().flattened_features().is_none() {
            return invalid(format!("image_size {} is too small for the network", self.image_size));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Invalid training options: {0}")]
    InvalidOptions(String),
    #[error("No {class} images to train on")]
    EmptyClass { class: &'static str },
    #[error("Validation split left no {class} images for validation")]
    EmptyValidation { class: &'static str },
    #[error("Validation split left no images for training")]
    EmptyTraining,
}

/// A trained model in its inference form plus how it got there.
#[derive(Debug)]
pub struct TrainedModel<B: Backend> {
    pub model: SignCnn<B>,
    pub config: SignCnnConfig,
    pub history: TrainingHistory,
    /// Files that could not be decoded and were left out.
    pub skipped_images: usize,
}

/// Split, decode and train on a materialized partition.
pub fn train_on_partition<B: AutodiffBackend>(
    partition: &Partition,
    options: &TrainOptions,
    device: &B::Device,
) -> Result<TrainedModel<B::InnerBackend>, TrainError> {
    options.validate()?;
    let plan = split_by_class(&partition.positive, &partition.negative, options.validation_split);
    let images = load_image_set(&plan, options.image_size);
    debug!(
        "Decoded {} training and {} validation images for '{}'",
        images.train.len(),
        images.validation.len(),
        partition.label
    );
    train_binary::<B>(&images, options, device)
}

/// Fit a fresh network on `images`.
///
/// When early stopping fires, the returned model carries the weights of the
/// epoch with the best validation accuracy. A run that reaches `epochs` keeps
/// the final weights and records the last epoch as `best_epoch`.
pub fn train_binary<B: AutodiffBackend>(
    images: &ImageSet,
    options: &TrainOptions,
    device: &B::Device,
) -> Result<TrainedModel<B::InnerBackend>, TrainError> {
    options.validate()?;
    check_classes(images)?;

    let config = options.model_config();
    let size = options.image_size as usize;
    let mut model: SignCnn<B> = config.init(device);
    let mut optimizer = AdamConfig::new().with_epsilon(ADAM_EPSILON).init();
    let mut shuffle_rng = StdRng::seed_from_u64(options.seed);
    let mut augment_rng = options.augmentation.rng();
    let mut stopper = EarlyStopping::new(options.early_stopping_patience);
    let mut plateau = ReduceLrOnPlateau::new(options.lr_plateau);
    let mut lr = options.learning_rate;
    let mut history = TrainingHistory::default();
    let mut best: Option<SignCnn<B::InnerBackend>> = None;

    for epoch in 1..=options.epochs {
        let order = epoch_order(images.train.len(), &mut shuffle_rng);
        let mut train_loss = MeanLoss::default();
        let mut train_confusion = BinaryConfusion::default();
        for chunk in order.chunks(options.batch_size) {
            let samples: Vec<&ImageSample> = chunk.iter().map(|&idx| &images.train[idx]).collect();
            let batch = assemble_batch(
                &samples,
                size,
                Some((&mut augment_rng, &options.augmentation)),
            );
            let batch_len = batch.len();
            let target_values = batch.targets.clone();
            let (inputs, targets) = batch_tensors::<B>(batch, device);
            let logits = model.forward(inputs);
            let loss = binary_cross_entropy_with_logits(logits.clone(), targets);
            let probabilities = sigmoid(logits.detach())
                .into_data()
                .to_vec::<f32>()
                .unwrap_or_default();
            train_confusion.merge(&BinaryConfusion::from_probabilities(
                &probabilities,
                &target_values,
            ));
            train_loss.add(loss.clone().into_scalar().elem::<f32>(), batch_len);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(lr, model, grads);
        }

        let valid_model = model.valid();
        let (val_loss, val_confusion) =
            evaluate(&valid_model, &images.validation, options.batch_size, size, device);
        let metrics = EpochMetrics {
            epoch,
            loss: train_loss.mean(),
            accuracy: train_confusion.accuracy(),
            val_loss,
            val_accuracy: val_confusion.accuracy(),
            learning_rate: lr,
        };
        info!(
            "Epoch {}/{}: loss={:.4}, accuracy={:.4}, val_loss={:.4}, val_accuracy={:.4}",
            epoch,
            options.epochs,
            metrics.loss,
            metrics.accuracy,
            metrics.val_loss,
            metrics.val_accuracy
        );
        history.push(metrics);

        match stopper.observe(epoch, metrics.val_accuracy) {
            EarlyStopDecision::Improved => best = Some(valid_model),
            EarlyStopDecision::Continue => {}
            EarlyStopDecision::Stop { best_epoch } => {
                info!("Early stopping at epoch {epoch}; restoring weights from epoch {best_epoch}");
                history.stopped_early = true;
                break;
            }
        }
        if let Some(reduced) = plateau.observe(val_loss, lr) {
            info!("Reducing learning rate to {reduced:e}");
            lr = reduced;
        }
    }

    let model = match best {
        Some(best) if history.stopped_early => {
            history.best_epoch = stopper.best_epoch();
            best
        }
        _ => {
            history.best_epoch = history.last().map(|m| m.epoch);
            model.valid()
        }
    };
    Ok(TrainedModel {
        model,
        config,
        history,
        skipped_images: images.skipped,
    })
}

/// Mean loss and confusion counts of `model` over `samples`, without
/// augmentation.
pub fn evaluate<B: Backend>(
    model: &SignCnn<B>,
    samples: &[ImageSample],
    batch_size: usize,
    size: usize,
    device: &B::Device,
) -> (f32, BinaryConfusion) {
    let mut loss = MeanLoss::default();
    let mut confusion = BinaryConfusion::default();
    let refs: Vec<&ImageSample> = samples.iter().collect();
    for chunk in refs.chunks(batch_size.max(1)) {
        let batch = assemble_batch(chunk, size, None);
        let batch_len = batch.len();
        let target_values = batch.targets.clone();
        let (inputs, targets) = batch_tensors::<B>(batch, device);
        let logits = model.forward(inputs);
        let batch_loss = binary_cross_entropy_with_logits(logits.clone(), targets);
        loss.add(batch_loss.into_scalar().elem::<f32>(), batch_len);
        let probabilities = sigmoid(logits).into_data().to_vec::<f32>().unwrap_or_default();
        confusion.merge(&BinaryConfusion::from_probabilities(&probabilities, &target_values));
    }
    (loss.mean(), confusion)
}

fn check_classes(images: &ImageSet) -> Result<(), TrainError> {
    for class in [BinaryClass::Positive, BinaryClass::Negative] {
        let name = class_name(class);
        if images.count(class) == 0 {
            return Err(TrainError::EmptyClass { class: name });
        }
        if !images.validation.iter().any(|s| s.class == class) {
            return Err(TrainError::EmptyValidation { class: name });
        }
    }
    if images.train.is_empty() {
        return Err(TrainError::EmptyTraining);
    }
    Ok(())
}

fn class_name(class: BinaryClass) -> &'static str {
    match class {
        BinaryClass::Positive => "positive",
        BinaryClass::Negative => "negative",
    }
}

fn batch_tensors<B: Backend>(batch: Batch, device: &B::Device) -> (Tensor<B, 4>, Tensor<B, 2>) {
    let shape = batch.shape();
    let len = batch.len();
    let inputs = Tensor::<B, 4>::from_data(TensorData::new(batch.pixels, shape), device);
    let targets = Tensor::<B, 2>::from_data(TensorData::new(batch.targets, [len, 1]), device);
    (inputs, targets)
}
