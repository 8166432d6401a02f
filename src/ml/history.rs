use serde::{Deserialize, Serialize};

/// Metrics recorded at the end of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch index.
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
    /// Learning rate in effect during the epoch.
    pub learning_rate: f64,
}

/// Per-epoch training history plus the outcome of early stopping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch whose weights the model ended with.
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Metrics of the epoch the final weights came from.
    pub fn best(&self) -> Option<&EpochMetrics> {
        let epoch = self.best_epoch?;
        self.epochs.iter().find(|m| m.epoch == epoch)
    }
}
