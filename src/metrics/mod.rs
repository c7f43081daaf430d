//! Detection metrics: confusion counts, precision/recall/F1, AP and mAP.

pub mod ap;

pub use ap::{average_precision, map_sweep, mean_average_precision};

use crate::matching::MatchResult;
use serde::{Deserialize, Serialize};

/// True-positive / false-positive / false-negative counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    /// Predictions matched to a ground-truth box.
    pub true_positives: usize,
    /// Predictions matched to nothing.
    pub false_positives: usize,
    /// Ground-truth boxes nothing matched.
    pub false_negatives: usize,
}

impl ConfusionCounts {
    /// Derive counts from one image's match result.
    pub fn from_match(result: &MatchResult) -> Self {
        Self {
            true_positives: result.matches.len(),
            false_positives: result.unmatched_predictions.len(),
            false_negatives: result.unmatched_ground_truth.len(),
        }
    }

    /// Accumulate another set of counts into this one.
    pub fn add(&mut self, other: Self) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }

    /// Precision: `TP / (TP + FP)`, 0.0 when the denominator is zero.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// Recall: `TP / (TP + FN)`, 0.0 when the denominator is zero.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// F1 score: harmonic mean of precision and recall, 0.0 when both are 0.
    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}
