//! Average Precision over the interpolated precision-recall curve.
//!
//! PASCAL VOC 2010+ all-point interpolation: precision is made
//! non-increasing from the right, then the curve is integrated as a step
//! function over recall deltas.

use crate::constants::MAP_SWEEP_THRESHOLDS;
use crate::geometry::iou;
use crate::matching::{Detection, GroundTruth};

/// One image's predictions and ground truth, borrowed for AP computation.
pub type ImageSample<'a> = (&'a [Detection], &'a [GroundTruth]);

/// Average Precision for one class across a set of images.
///
/// Returns `None` when the class has no ground truth anywhere; such
/// classes are excluded from the mAP mean rather than scored 0.
pub fn average_precision(
    images: &[ImageSample<'_>],
    class_id: u32,
    iou_threshold: f64,
) -> Option<f64> {
    let total_gt: usize = images
        .iter()
        .map(|(_, gts)| gts.iter().filter(|g| g.class_id == class_id).count())
        .sum();

    if total_gt == 0 {
        return None;
    }

    // All predictions of this class, confidence descending across images.
    let mut class_preds: Vec<(usize, usize, f64)> = Vec::new();
    for (image_idx, (preds, _)) in images.iter().enumerate() {
        for (pred_idx, pred) in preds.iter().enumerate() {
            if pred.class_id == class_id {
                class_preds.push((image_idx, pred_idx, pred.confidence));
            }
        }
    }
    if class_preds.is_empty() {
        return Some(0.0);
    }
    class_preds.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    // Greedy claiming per image: a detection is a TP only if it takes an
    // as-yet-unclaimed ground truth of its class at or above the threshold.
    let mut claimed: Vec<Vec<bool>> = images.iter().map(|(_, gts)| vec![false; gts.len()]).collect();

    let mut cumulative_tp = 0usize;
    let mut cumulative_fp = 0usize;
    let mut recalls = Vec::with_capacity(class_preds.len());
    let mut precisions = Vec::with_capacity(class_preds.len());

    #[allow(clippy::cast_precision_loss)]
    for (image_idx, pred_idx, _) in class_preds {
        let (preds, gts) = images[image_idx];
        let pred = &preds[pred_idx];

        let mut best_iou = 0.0;
        let mut best_gt: Option<usize> = None;
        for (gt_idx, gt) in gts.iter().enumerate() {
            if claimed[image_idx][gt_idx] || gt.class_id != class_id {
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
                claimed[image_idx][gt_idx] = true;
                cumulative_tp += 1;
            }
            _ => cumulative_fp += 1,
        }

        precisions.push(cumulative_tp as f64 / (cumulative_tp + cumulative_fp) as f64);
        recalls.push(cumulative_tp as f64 / total_gt as f64);
    }

    Some(area_under_curve(&recalls, &precisions))
}

/// Integrate the precision-recall step function.
///
/// Prepends `(recall = 0, first precision)`, appends `(recall = 1,
/// precision = 0)`, enforces the non-increasing-from-right precision
/// envelope, then sums `precision * recall-delta`.
fn area_under_curve(recalls: &[f64], precisions: &[f64]) -> f64 {
    if recalls.is_empty() {
        return 0.0;
    }

    let mut r = Vec::with_capacity(recalls.len() + 2);
    let mut p = Vec::with_capacity(precisions.len() + 2);
    r.push(0.0);
    p.push(precisions[0]);
    r.extend_from_slice(recalls);
    p.extend_from_slice(precisions);
    r.push(1.0);
    p.push(0.0);

    for i in (0..p.len() - 1).rev() {
        p[i] = p[i].max(p[i + 1]);
    }

    let mut ap = 0.0;
    for i in 1..r.len() {
        ap += (r[i] - r[i - 1]) * p[i];
    }
    ap.clamp(0.0, 1.0)
}

/// Mean AP over the classes that have ground truth.
///
/// `class_ids` is the set of classes in the current filter; members with
/// zero ground truth contribute nothing to the mean.
pub fn mean_average_precision(
    images: &[ImageSample<'_>],
    class_ids: &[u32],
    iou_threshold: f64,
) -> f64 {
    let aps: Vec<f64> = class_ids
        .iter()
        .filter_map(|&class_id| average_precision(images, class_id, iou_threshold))
        .collect();

    if aps.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = aps.len() as f64;
    aps.iter().sum::<f64>() / n
}

/// COCO-style mAP@0.5:0.95: mean of mAP over the IoU threshold sweep.
pub fn map_sweep(images: &[ImageSample<'_>], class_ids: &[u32]) -> f64 {
    let total: f64 = MAP_SWEEP_THRESHOLDS
        .iter()
        .map(|&t| mean_average_precision(images, class_ids, t))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let n = MAP_SWEEP_THRESHOLDS.len() as f64;
    total / n
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn pred(x: f64, y: f64, conf: f64, class_id: u32) -> Detection {
        Detection::new(
            BoundingBox::from_corners(x, y, x + 10.0, y + 10.0).unwrap(),
            conf,
            class_id,
            "lynx",
        )
        .unwrap()
    }

    fn gt(x: f64, y: f64, class_id: u32) -> GroundTruth {
        GroundTruth {
            bbox: BoundingBox::from_corners(x, y, x + 10.0, y + 10.0).unwrap(),
            class_id,
            class_name: "lynx".to_string(),
        }
    }

    #[test]
    fn test_perfect_detection_ap_is_one() {
        let preds = vec![pred(0.0, 0.0, 0.9, 0), pred(50.0, 50.0, 0.8, 0)];
        let gts = vec![gt(0.0, 0.0, 0), gt(50.0, 50.0, 0)];
        let images = vec![(preds.as_slice(), gts.as_slice())];

        let ap = average_precision(&images, 0, 0.5).unwrap();
        assert!((ap - 1.0).abs() < 1e-10, "ap = {ap}");
    }

    #[test]
    fn test_no_ground_truth_is_excluded() {
        let preds = vec![pred(0.0, 0.0, 0.9, 0)];
        let gts: Vec<GroundTruth> = Vec::new();
        let images = vec![(preds.as_slice(), gts.as_slice())];

        assert!(average_precision(&images, 0, 0.5).is_none());
    }

    #[test]
    fn test_no_predictions_ap_is_zero() {
        let preds: Vec<Detection> = Vec::new();
        let gts = vec![gt(0.0, 0.0, 0)];
        let images = vec![(preds.as_slice(), gts.as_slice())];

        assert_eq!(average_precision(&images, 0, 0.5), Some(0.0));
    }

    #[test]
    fn test_half_recall_half_ap() {
        // One of two GT boxes found, perfectly, with no false positives.
        let preds = vec![pred(0.0, 0.0, 0.9, 0)];
        let gts = vec![gt(0.0, 0.0, 0), gt(100.0, 100.0, 0)];
        let images = vec![(preds.as_slice(), gts.as_slice())];

        let ap = average_precision(&images, 0, 0.5).unwrap();
        assert!((ap - 0.5).abs() < 1e-10, "ap = {ap}");
    }

    #[test]
    fn test_false_positive_before_true_positive_lowers_ap() {
        // High-confidence FP, then a TP.
        let preds = vec![pred(500.0, 500.0, 0.95, 0), pred(0.0, 0.0, 0.5, 0)];
        let gts = vec![gt(0.0, 0.0, 0)];
        let images = vec![(preds.as_slice(), gts.as_slice())];

        let ap = average_precision(&images, 0, 0.5).unwrap();
        assert!((ap - 0.5).abs() < 1e-10, "ap = {ap}");
    }

    #[test]
    fn test_map_excludes_zero_gt_classes() {
        // Class 0 evaluates to AP 1.0; class 1 has no GT and must not
        // drag the mean down to 0.5.
        let preds = vec![pred(0.0, 0.0, 0.9, 0), pred(50.0, 50.0, 0.8, 1)];
        let gts = vec![gt(0.0, 0.0, 0)];
        let images = vec![(preds.as_slice(), gts.as_slice())];

        let map = mean_average_precision(&images, &[0, 1], 0.5);
        assert!((map - 1.0).abs() < 1e-10, "map = {map}");
    }

    #[test]
    fn test_map_empty_when_no_class_has_gt() {
        let preds = vec![pred(0.0, 0.0, 0.9, 0)];
        let gts: Vec<GroundTruth> = Vec::new();
        let images = vec![(preds.as_slice(), gts.as_slice())];

        assert_eq!(mean_average_precision(&images, &[0, 1], 0.5), 0.0);
    }

    #[test]
    fn test_sweep_not_above_map_at_half() {
        // Stricter thresholds can only lose matches.
        let preds = vec![pred(2.0, 2.0, 0.9, 0)];
        let gts = vec![gt(0.0, 0.0, 0)];
        let images = vec![(preds.as_slice(), gts.as_slice())];

        let at_half = mean_average_precision(&images, &[0], 0.5);
        let swept = map_sweep(&images, &[0]);
        assert!(swept <= at_half + 1e-10);
    }
}
