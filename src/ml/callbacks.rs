//! Epoch-end training policies, kept free of any tensor state so they can be
//! driven and tested directly.

use serde::{Deserialize, Serialize};

/// What the training loop should do after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStopDecision {
    /// The monitored value improved; snapshot the current weights.
    Improved,
    Continue,
    /// Stop now and restore the weights of `best_epoch`.
    Stop { best_epoch: usize },
}

/// Stops training once validation accuracy has not strictly improved for
/// `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<f32>,
    best_epoch: Option<usize>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            best_epoch: None,
            wait: 0,
        }
    }

    /// Record the monitored value for `epoch` (1-based).
    pub fn observe(&mut self, epoch: usize, value: f32) -> EarlyStopDecision {
        let improved = match self.best {
            None => !value.is_nan(),
            Some(best) => value > best,
        };
        if improved {
            self.best = Some(value);
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return EarlyStopDecision::Improved;
        }
        self.wait += 1;
        match self.best_epoch {
            Some(best_epoch) if self.wait >= self.patience => EarlyStopDecision::Stop { best_epoch },
            _ => EarlyStopDecision::Continue,
        }
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best_value(&self) -> Option<f32> {
        self.best
    }
}

/// Learning-rate reduction settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauOptions {
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
    pub min_delta: f32,
}

impl Default for PlateauOptions {
    fn default() -> Self {
        Self {
            factor: 0.2,
            patience: 3,
            min_lr: 1e-6,
            min_delta: 1e-4,
        }
    }
}

/// Multiplies the learning rate by `factor` when validation loss stalls.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    options: PlateauOptions,
    best: f32,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(options: PlateauOptions) -> Self {
        Self {
            options,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    /// Record the epoch's validation loss; returns the reduced learning rate
    /// when a reduction fires.
    pub fn observe(&mut self, loss: f32, lr: f64) -> Option<f64> {
        if loss < self.best - self.options.min_delta {
            self.best = loss;
            self.wait = 0;
            return None;
        }
        self.wait += 1;
        if self.wait < self.options.patience {
            return None;
        }
        self.wait = 0;
        if lr > self.options.min_lr {
            Some((lr * self.options.factor).max(self.options.min_lr))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plateau_from_epoch_six_stops_at_eleven() {
        let accuracies = [0.5, 0.6, 0.65, 0.7, 0.72, 0.8, 0.79, 0.8, 0.78, 0.75, 0.8];
        let mut stopper = EarlyStopping::new(5);
        let mut stopped = None;
        for (idx, acc) in accuracies.iter().enumerate() {
            let epoch = idx + 1;
            if let EarlyStopDecision::Stop { best_epoch } = stopper.observe(epoch, *acc) {
                stopped = Some((epoch, best_epoch));
                break;
            }
        }
        assert_eq!(stopped, Some((11, 6)));
        assert_eq!(stopper.best_value(), Some(0.8));
    }

    #[test]
    fn improvement_resets_patience() {
        let mut stopper = EarlyStopping::new(2);
        assert_eq!(stopper.observe(1, 0.5), EarlyStopDecision::Improved);
        assert_eq!(stopper.observe(2, 0.5), EarlyStopDecision::Continue);
        assert_eq!(stopper.observe(3, 0.6), EarlyStopDecision::Improved);
        assert_eq!(stopper.observe(4, 0.6), EarlyStopDecision::Continue);
        assert_eq!(stopper.observe(5, 0.1), EarlyStopDecision::Stop { best_epoch: 3 });
    }

    #[test]
    fn nan_never_counts_as_best() {
        let mut stopper = EarlyStopping::new(1);
        assert_eq!(stopper.observe(1, f32::NAN), EarlyStopDecision::Continue);
        assert_eq!(stopper.best_epoch(), None);
        assert_eq!(stopper.observe(2, 0.4), EarlyStopDecision::Improved);
    }

    #[test]
    fn lr_drops_after_three_stalled_epochs() {
        let mut plateau = ReduceLrOnPlateau::new(PlateauOptions::default());
        let mut lr = 1e-3;
        assert_eq!(plateau.observe(0.7, lr), None);
        // Improvements smaller than min_delta do not count.
        assert_eq!(plateau.observe(0.69995, lr), None);
        assert_eq!(plateau.observe(0.71, lr), None);
        let reduced = plateau.observe(0.70, lr).unwrap();
        assert!((reduced - 2e-4).abs() < 1e-12);
        lr = reduced;
        // Counter resets after a reduction.
        assert_eq!(plateau.observe(0.70, lr), None);
        assert_eq!(plateau.observe(0.70, lr), None);
        assert!(plateau.observe(0.70, lr).is_some());
    }

    #[test]
    fn lr_is_floored_and_stops_at_minimum() {
        let options = PlateauOptions {
            patience: 1,
            ..PlateauOptions::default()
        };
        let mut plateau = ReduceLrOnPlateau::new(options);
        assert_eq!(plateau.observe(0.5, 2e-6), None);
        assert_eq!(plateau.observe(0.5, 2e-6), Some(1e-6));
        assert_eq!(plateau.observe(0.5, 1e-6), None);
    }
}
