//! Greedy matching of predictions to ground truth.
//!
//! Predictions are visited in confidence-descending order (ties keep their
//! original order). Each prediction claims the not-yet-claimed ground-truth
//! box of the *same class* with the highest IoU, and the pair is committed
//! only when that IoU meets the threshold. Single pass, no backtracking:
//! a lower-confidence prediction can never steal a ground truth already
//! claimed by an earlier one.

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, iou};
use serde::{Deserialize, Serialize};

/// A single detection produced by the external detector collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Predicted bounding box.
    pub bbox: BoundingBox,
    /// Detection confidence (0.0 - 1.0).
    pub confidence: f64,
    /// Numeric class id.
    pub class_id: u32,
    /// Human-readable class name (species).
    pub class_name: String,
}

impl Detection {
    /// Create a detection, validating the confidence range.
    pub fn new(bbox: BoundingBox, confidence: f64, class_id: u32, class_name: &str) -> Result<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidConfidence { value: confidence });
        }
        Ok(Self {
            bbox,
            confidence,
            class_id,
            class_name: class_name.to_string(),
        })
    }
}

/// A verified ground-truth box. Confidence is 1.0 by definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Annotated bounding box.
    pub bbox: BoundingBox,
    /// Numeric class id.
    pub class_id: u32,
    /// Human-readable class name (species).
    pub class_name: String,
}

/// A committed prediction/ground-truth pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxMatch {
    /// Index into the prediction slice.
    pub prediction: usize,
    /// Index into the ground-truth slice.
    pub ground_truth: usize,
    /// IoU of the committed pair.
    pub iou: f64,
}

/// Outcome of matching one image's predictions against its ground truth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResult {
    /// Committed pairs with their IoU.
    pub matches: Vec<BoxMatch>,
    /// Indices of predictions that claimed nothing.
    pub unmatched_predictions: Vec<usize>,
    /// Indices of ground-truth boxes nothing claimed.
    pub unmatched_ground_truth: Vec<usize>,
}

impl MatchResult {
    /// Mean IoU over committed pairs, 0.0 when there are none.
    pub fn mean_iou(&self) -> f64 {
        if self.matches.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.matches.len() as f64;
        self.matches.iter().map(|m| m.iou).sum::<f64>() / n
    }
}

/// Match predictions to ground truth at the given IoU threshold.
pub fn match_detections(
    predictions: &[Detection],
    ground_truth: &[GroundTruth],
    iou_threshold: f64,
) -> MatchResult {
    // Confidence descending; sort_by is stable so ties keep input order.
    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| {
        predictions[b]
            .confidence
            .partial_cmp(&predictions[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut claimed = vec![false; ground_truth.len()];
    let mut matches = Vec::new();
    let mut unmatched_predictions = Vec::new();

    for pred_idx in order {
        let pred = &predictions[pred_idx];

        let mut best_iou = 0.0;
        let mut best_gt: Option<usize> = None;

        for (gt_idx, gt) in ground_truth.iter().enumerate() {
            if claimed[gt_idx] || gt.class_id != pred.class_id {
                continue;
            }
            let overlap = iou(&pred.bbox, &gt.bbox);
            if overlap > best_iou {
                best_iou = overlap;
                best_gt = Some(gt_idx);
            }
        }

        match best_gt {
            Some(gt_idx) if best_iou >= iou_threshold => {
                claimed[gt_idx] = true;
                matches.push(BoxMatch {
                    prediction: pred_idx,
                    ground_truth: gt_idx,
                    iou: best_iou,
                });
            }
            _ => unmatched_predictions.push(pred_idx),
        }
    }

    let unmatched_ground_truth = claimed
        .iter()
        .enumerate()
        .filter_map(|(idx, &taken)| (!taken).then_some(idx))
        .collect();

    MatchResult {
        matches,
        unmatched_predictions,
        unmatched_ground_truth,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pred(x: f64, y: f64, w: f64, h: f64, conf: f64, class_id: u32) -> Detection {
        Detection::new(
            BoundingBox::from_corners(x, y, x + w, y + h).unwrap(),
            conf,
            class_id,
            "deer",
        )
        .unwrap()
    }

    fn gt(x: f64, y: f64, w: f64, h: f64, class_id: u32) -> GroundTruth {
        GroundTruth {
            bbox: BoundingBox::from_corners(x, y, x + w, y + h).unwrap(),
            class_id,
            class_name: "deer".to_string(),
        }
    }

    #[test]
    fn test_single_match_scenario() {
        // Spec-level scenario: two GT boxes, one close prediction.
        let gts = vec![gt(10.0, 10.0, 50.0, 50.0, 0), gt(100.0, 100.0, 50.0, 50.0, 0)];
        let preds = vec![pred(12.0, 12.0, 48.0, 48.0, 0.9, 0)];

        let result = match_detections(&preds, &gts, 0.5);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.unmatched_predictions.len(), 0);
        assert_eq!(result.unmatched_ground_truth, vec![1]);
        assert!(result.matches[0].iou > 0.8, "iou = {}", result.matches[0].iou);
    }

    #[test]
    fn test_no_cross_class_match() {
        let gts = vec![gt(0.0, 0.0, 10.0, 10.0, 1)];
        let preds = vec![pred(0.0, 0.0, 10.0, 10.0, 0.9, 2)];

        let result = match_detections(&preds, &gts, 0.5);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_predictions, vec![0]);
        assert_eq!(result.unmatched_ground_truth, vec![0]);
    }

    #[test]
    fn test_higher_confidence_claims_first() {
        let gts = vec![gt(0.0, 0.0, 10.0, 10.0, 0)];
        let preds = vec![
            pred(1.0, 1.0, 10.0, 10.0, 0.4, 0),
            pred(0.0, 0.0, 10.0, 10.0, 0.9, 0),
        ];

        let result = match_detections(&preds, &gts, 0.5);
        assert_eq!(result.matches.len(), 1);
        // Index 1 has the higher confidence and claims the only GT.
        assert_eq!(result.matches[0].prediction, 1);
        assert_eq!(result.unmatched_predictions, vec![0]);
    }

    #[test]
    fn test_each_side_claimed_at_most_once() {
        let gts = vec![gt(0.0, 0.0, 10.0, 10.0, 0), gt(8.0, 0.0, 10.0, 10.0, 0)];
        let preds = vec![
            pred(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            pred(0.5, 0.0, 10.0, 10.0, 0.8, 0),
            pred(1.0, 0.0, 10.0, 10.0, 0.7, 0),
        ];

        let result = match_detections(&preds, &gts, 0.3);
        let total = preds.len();
        assert_eq!(result.matches.len() + result.unmatched_predictions.len(), total);

        let mut seen_gt: Vec<usize> = result.matches.iter().map(|m| m.ground_truth).collect();
        seen_gt.sort_unstable();
        seen_gt.dedup();
        assert_eq!(seen_gt.len(), result.matches.len());
    }

    #[test]
    fn test_below_threshold_rejected() {
        let gts = vec![gt(0.0, 0.0, 10.0, 10.0, 0)];
        let preds = vec![pred(9.0, 9.0, 10.0, 10.0, 0.9, 0)];

        let result = match_detections(&preds, &gts, 0.5);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        let result = match_detections(&[], &[], 0.5);
        assert!(result.matches.is_empty());
        assert!(result.unmatched_predictions.is_empty());
        assert!(result.unmatched_ground_truth.is_empty());
    }

    #[test]
    fn test_detection_rejects_bad_confidence() {
        let bbox = BoundingBox::from_corners(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(Detection::new(bbox, 1.1, 0, "deer").is_err());
        assert!(Detection::new(bbox, -0.1, 0, "deer").is_err());
    }

    #[test]
    fn test_mean_iou_empty_is_zero() {
        assert_eq!(MatchResult::default().mean_iou(), 0.0);
    }
}
