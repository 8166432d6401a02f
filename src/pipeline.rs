//! Per-label orchestration: materialize, train and persist each sign in turn,
//! containing every failure to the label that raised it.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alphabet::Label;
use crate::dataset::partition::{Partition, PartitionSummary, materialize};
use crate::dataset::work_dir::WorkDir;
use crate::ml::artifact::{ArtifactError, ArtifactMetadata, ArtifactPaths, now_rfc3339, save_artifact};
use crate::ml::backend::BackendTask;
use crate::ml::train::{TrainError, TrainOptions, train_on_partition};

/// File name of the per-run report written next to the models.
pub const REPORT_FILE_NAME: &str = "training_report.json";

/// Failure while fitting or persisting one label's model.
#[derive(Debug, Error)]
pub enum TrainingFailure {
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("Trainer panicked: {0}")]
    Panic(String),
}

/// Summary of a model a trainer produced and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub paths: ArtifactPaths,
    pub epochs_run: usize,
    pub best_epoch: Option<usize>,
    pub best_val_accuracy: Option<f32>,
    pub stopped_early: bool,
}

/// Trains and persists the model of one label from its partition.
pub trait LabelTrainer {
    fn train_label(
        &mut self,
        partition: &Partition,
        models_dir: &Path,
    ) -> Result<TrainedArtifact, TrainingFailure>;
}

/// Convolutional trainer on an autodiff backend.
pub struct CnnTrainer<B: AutodiffBackend> {
    device: B::Device,
    options: TrainOptions,
}

impl<B: AutodiffBackend> CnnTrainer<B> {
    pub fn new(device: B::Device, options: TrainOptions) -> Self {
        Self { device, options }
    }
}

impl<B: AutodiffBackend> LabelTrainer for CnnTrainer<B> {
    fn train_label(
        &mut self,
        partition: &Partition,
        models_dir: &Path,
    ) -> Result<TrainedArtifact, TrainingFailure> {
        let trained = train_on_partition::<B>(partition, &self.options, &self.device)?;
        let metadata = ArtifactMetadata::new(
            partition.label,
            trained.config.clone(),
            self.options.clone(),
            trained.history.clone(),
            partition.summary(),
            trained.skipped_images,
        );
        let paths = save_artifact(models_dir, &trained.model, &metadata)?;
        let best = trained.history.best();
        Ok(TrainedArtifact {
            paths,
            epochs_run: trained.history.epochs_run(),
            best_epoch: trained.history.best_epoch,
            best_val_accuracy: best.map(|m| m.val_accuracy),
            stopped_early: trained.history.stopped_early,
        })
    }
}

/// Where in a label's cycle a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Materializing,
    Training,
    Persisting,
}

/// Lifecycle of one label within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelState {
    Pending,
    Materializing,
    Training,
    Persisted,
    Failed(FailureStage),
}

/// One state transition, reported to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelProgress {
    pub label: Label,
    /// 0-based position of the label in the batch.
    pub index: usize,
    pub total: usize,
    pub state: LabelState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LabelOutcome {
    Trained {
        label: Label,
        partition: PartitionSummary,
        artifact: TrainedArtifact,
    },
    Failed {
        label: Label,
        stage: FailureStage,
        reason: String,
    },
}

impl LabelOutcome {
    pub fn label(&self) -> Label {
        match self {
            LabelOutcome::Trained { label, .. } | LabelOutcome::Failed { label, .. } => *label,
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, LabelOutcome::Trained { .. })
    }
}

/// Inputs of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dataset_root: PathBuf,
    pub models_dir: PathBuf,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: String,
    pub finished_at: String,
    pub dataset_root: PathBuf,
    pub models_dir: PathBuf,
    pub outcomes: Vec<LabelOutcome>,
}

impl BatchReport {
    pub fn trained(&self) -> impl Iterator<Item = &LabelOutcome> {
        self.outcomes.iter().filter(|o| o.is_trained())
    }

    pub fn failed(&self) -> impl Iterator<Item = &LabelOutcome> {
        self.outcomes.iter().filter(|o| !o.is_trained())
    }

    /// Write the report as pretty JSON into the models directory.
    pub fn write(&self) -> Result<PathBuf, ArtifactError> {
        fs::create_dir_all(&self.models_dir).map_err(|source| ArtifactError::CreateDir {
            path: self.models_dir.clone(),
            source,
        })?;
        let path = self.models_dir.join(REPORT_FILE_NAME);
        let json = serde_json::to_vec_pretty(self).map_err(|source| ArtifactError::Metadata {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| ArtifactError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Run materialize, train and persist for every label in order.
///
/// No failure aborts the batch; each label ends as one [`LabelOutcome`].
pub fn run_batch<T: LabelTrainer + ?Sized>(
    options: &BatchOptions,
    work: &mut WorkDir,
    trainer: &mut T,
    progress: &mut dyn FnMut(LabelProgress),
) -> BatchReport {
    let run_id = Uuid::new_v4();
    let started_at = now_rfc3339();
    let total = options.labels.len();
    info!("Starting training run {run_id} over {total} labels");
    for (index, &label) in options.labels.iter().enumerate() {
        progress(LabelProgress {
            label,
            index,
            total,
            state: LabelState::Pending,
        });
    }

    let mut outcomes = Vec::with_capacity(total);
    for (index, &label) in options.labels.iter().enumerate() {
        let mut notify = |state: LabelState| {
            progress(LabelProgress {
                label,
                index,
                total,
                state,
            })
        };
        info!("[{}/{}] Label '{label}'", index + 1, total);
        notify(LabelState::Materializing);
        let partition = match materialize(&options.dataset_root, label, work) {
            Ok(partition) => partition,
            Err(err) => {
                log_failure(label, FailureStage::Materializing, &err);
                notify(LabelState::Failed(FailureStage::Materializing));
                outcomes.push(failed(label, FailureStage::Materializing, &err));
                continue;
            }
        };

        notify(LabelState::Training);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            trainer.train_label(&partition, &options.models_dir)
        }))
        .unwrap_or_else(|payload| Err(TrainingFailure::Panic(panic_message(payload.as_ref()))));
        match result {
            Ok(artifact) => {
                info!(
                    "Label '{label}' persisted after {} epochs (best val_accuracy {:?})",
                    artifact.epochs_run, artifact.best_val_accuracy
                );
                notify(LabelState::Persisted);
                outcomes.push(LabelOutcome::Trained {
                    label,
                    partition: partition.summary(),
                    artifact,
                });
            }
            Err(err) => {
                let stage = match &err {
                    TrainingFailure::Artifact(_) => FailureStage::Persisting,
                    _ => FailureStage::Training,
                };
                log_failure(label, stage, &err);
                notify(LabelState::Failed(stage));
                outcomes.push(failed(label, stage, &err));
            }
        }
    }

    let report = BatchReport {
        run_id,
        started_at,
        finished_at: now_rfc3339(),
        dataset_root: options.dataset_root.clone(),
        models_dir: options.models_dir.clone(),
        outcomes,
    };
    let trained = report.trained().count();
    let failed_labels: Vec<String> = report.failed().map(|o| o.label().to_string()).collect();
    if failed_labels.is_empty() {
        info!("Run {run_id} finished: {trained}/{total} labels trained");
    } else {
        warn!(
            "Run {run_id} finished: {trained}/{total} labels trained; failed: {}",
            failed_labels.join(", ")
        );
    }
    report
}

fn failed(label: Label, stage: FailureStage, err: &dyn std::error::Error) -> LabelOutcome {
    LabelOutcome::Failed {
        label,
        stage,
        reason: err.to_string(),
    }
}

fn log_failure(label: Label, stage: FailureStage, err: &dyn std::error::Error) {
    error!("Label '{label}' failed while {stage:?}: {err}");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Backend-agnostic batch run, dispatched through [`crate::ml::backend::dispatch`].
pub struct BatchTask<'a> {
    pub options: &'a BatchOptions,
    pub train: TrainOptions,
    pub work: &'a mut WorkDir,
    pub progress: &'a mut dyn FnMut(LabelProgress),
}

impl BackendTask for BatchTask<'_> {
    type Output = BatchReport;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> BatchReport {
        let mut trainer = CnnTrainer::<B>::new(device, self.train);
        run_batch(self.options, self.work, &mut trainer, self.progress)
    }
}
