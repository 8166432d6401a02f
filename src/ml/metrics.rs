//! Evaluation metrics for binary classifiers.

use serde::{Deserialize, Serialize};

/// Probabilities strictly above this count as a positive prediction.
pub const DECISION_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Confusion counts for a binary classifier.
pub struct BinaryConfusion {
    pub true_positive: u32,
    pub false_positive: u32,
    pub true_negative: u32,
    pub false_negative: u32,
}

impl BinaryConfusion {
    /// Tally predictions against `targets` (`1.0` positive, `0.0` negative).
    pub fn from_probabilities(probabilities: &[f32], targets: &[f32]) -> Self {
        let mut cm = Self::default();
        for (&p, &t) in probabilities.iter().zip(targets) {
            cm.add(t > 0.5, p > DECISION_THRESHOLD);
        }
        cm
    }

    pub fn add(&mut self, truth: bool, predicted: bool) {
        let slot = match (truth, predicted) {
            (true, true) => &mut self.true_positive,
            (false, true) => &mut self.false_positive,
            (false, false) => &mut self.true_negative,
            (true, false) => &mut self.false_negative,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn merge(&mut self, other: &BinaryConfusion) {
        self.true_positive = self.true_positive.saturating_add(other.true_positive);
        self.false_positive = self.false_positive.saturating_add(other.false_positive);
        self.true_negative = self.true_negative.saturating_add(other.true_negative);
        self.false_negative = self.false_negative.saturating_add(other.false_negative);
    }

    pub fn total(&self) -> u64 {
        self.true_positive as u64
            + self.false_positive as u64
            + self.true_negative as u64
            + self.false_negative as u64
    }

    /// Fraction of correct predictions; `0.0` when empty.
    pub fn accuracy(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.true_positive as u64 + self.true_negative as u64) as f32 / total as f32
    }

    /// `TP / (TP + FP)`.
    pub fn precision(&self) -> f32 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// `TP / (TP + FN)`.
    pub fn recall(&self) -> f32 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }
}

fn ratio(num: u32, den: u32) -> f32 {
    if den == 0 { 0.0 } else { num as f32 / den as f32 }
}

/// Running mean of per-batch losses weighted by batch size.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanLoss {
    sum: f64,
    count: usize,
}

impl MeanLoss {
    pub fn add(&mut self, mean_batch_loss: f32, batch_len: usize) {
        if mean_batch_loss.is_finite() {
            self.sum += mean_batch_loss as f64 * batch_len as f64;
        } else {
            self.sum = f64::NAN;
        }
        self.count += batch_len;
    }

    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64) as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_counts_threshold_strictly() {
        let cm = BinaryConfusion::from_probabilities(&[0.9, 0.5, 0.2, 0.7], &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(cm.true_positive, 1);
        assert_eq!(cm.false_negative, 1);
        assert_eq!(cm.true_negative, 1);
        assert_eq!(cm.false_positive, 1);
        assert_eq!(cm.accuracy(), 0.5);
        assert_eq!(cm.precision(), 0.5);
        assert_eq!(cm.recall(), 0.5);
    }

    #[test]
    fn empty_confusion_is_zero() {
        let cm = BinaryConfusion::default();
        assert_eq!(cm.accuracy(), 0.0);
        assert_eq!(cm.precision(), 0.0);
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = BinaryConfusion::from_probabilities(&[0.9], &[1.0]);
        let b = BinaryConfusion::from_probabilities(&[0.1, 0.1], &[0.0, 1.0]);
        a.merge(&b);
        assert_eq!(a.total(), 3);
        assert!((a.accuracy() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn mean_loss_weights_by_batch_size() {
        let mut loss = MeanLoss::default();
        loss.add(1.0, 3);
        loss.add(2.0, 1);
        assert!((loss.mean() - 1.25).abs() < 1e-6);
        assert_eq!(MeanLoss::default().mean(), 0.0);
    }
}
