//! Persisted record types for evaluation runs.
//!
//! These are logical records: one `EvaluationRun` owns its `ModelMetrics`
//! rows (each nesting `SpeciesMetrics`), its `ImageEvaluationResult` rows
//! and its pairwise model comparisons. Children are created exactly once
//! and never updated in place; deleting a run cascades to all of them.

use crate::matching::{BoxMatch, Detection, GroundTruth};
use crate::metrics::ConfusionCounts;
use crate::stats::TTestResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an evaluation run.
///
/// Transitions are monotonic: `Pending -> Processing -> Completed | Failed`,
/// and terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Created, worker not yet started.
    Pending,
    /// Worker executing.
    Processing,
    /// Finished successfully; aggregate metrics are set.
    Completed,
    /// Aborted; `error_message` is set.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Inclusive capture-date window restricting which images are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest capture time included, unbounded when `None`.
    pub from: Option<DateTime<Utc>>,
    /// Latest capture time included, unbounded when `None`.
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Whether a capture timestamp falls inside the window.
    ///
    /// Images without a timestamp pass an unbounded window only.
    pub fn contains(&self, captured_at: Option<DateTime<Utc>>) -> bool {
        match captured_at {
            Some(at) => {
                self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
            }
            None => self.from.is_none() && self.to.is_none(),
        }
    }
}

/// Run-level aggregate metrics, set only once the run completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunAggregates {
    /// Overall precision across all models and images.
    pub precision: f64,
    /// Overall recall.
    pub recall: f64,
    /// Overall F1.
    pub f1: f64,
    /// Mean AP at IoU 0.5, averaged over models.
    pub map_50: f64,
    /// Mean AP over the 0.5:0.95 IoU sweep, averaged over models.
    pub map_50_95: f64,
}

/// One evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Unique run identifier.
    pub id: String,
    /// Human-readable run name.
    pub name: String,
    /// IoU threshold used for matching.
    pub iou_threshold: f64,
    /// Confidence threshold the detector filtered with (recorded, not
    /// re-applied by the engine).
    pub confidence_threshold: f64,
    /// Models included in the run.
    pub model_filters: Vec<String>,
    /// Species (class names) included; empty means all.
    pub species_filter: Vec<String>,
    /// Capture-date window; default is unbounded.
    #[serde(default)]
    pub date_range: DateRange,
    /// Number of folds (1 = no fold split).
    pub folds: usize,
    /// Significance level for pairwise model comparisons.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Aggregates, `None` until the run is COMPLETED.
    pub aggregates: Option<RunAggregates>,
    /// Number of images that contributed to the aggregates.
    pub total_images_evaluated: usize,
    /// Error message, set only when FAILED.
    pub error_message: Option<String>,
    /// Wall-clock processing duration in seconds, set at terminal state.
    pub processing_duration_secs: Option<f64>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
}

fn default_alpha() -> f64 {
    crate::constants::DEFAULT_ALPHA
}

/// Per-class AP entry inside a `ModelMetrics` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAp {
    /// Numeric class id.
    pub class_id: u32,
    /// Class name.
    pub class_name: String,
    /// AP at the run's IoU threshold; `None` when the class has no ground
    /// truth in the evaluated slice (excluded from the mAP mean).
    pub ap: Option<f64>,
}

/// Fold mean/standard-deviation pairs carried by the aggregate row in
/// k-fold mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldSpread {
    /// Precision mean and standard deviation across folds.
    pub precision: (f64, f64),
    /// Recall mean and standard deviation across folds.
    pub recall: (f64, f64),
    /// F1 mean and standard deviation across folds.
    pub f1: (f64, f64),
    /// mAP@0.5 mean and standard deviation across folds.
    pub map_50: (f64, f64),
}

/// Metrics for one model (or one model x fold) within a run. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Model name, suffixed with the fold label in k-fold mode.
    pub label: String,
    /// Plain model name without fold decoration.
    pub model_name: String,
    /// Fold index, `None` for plain and aggregate rows.
    pub fold: Option<usize>,
    /// Number of images this row covers.
    pub images_processed: usize,
    /// Accumulated confusion counts.
    pub counts: ConfusionCounts,
    /// Precision over the row's images.
    pub precision: f64,
    /// Recall over the row's images.
    pub recall: f64,
    /// F1 over the row's images.
    pub f1: f64,
    /// Per-class AP at the run's IoU threshold.
    pub per_class_ap: Vec<ClassAp>,
    /// Mean AP at IoU 0.5 (classes with ground truth only).
    pub map_50: f64,
    /// Mean AP over the 0.5:0.95 sweep.
    pub map_50_95: f64,
    /// Fold mean/std rows, present on the aggregate row in k-fold mode.
    pub fold_spread: Option<FoldSpread>,
    /// Per-species breakdown nested under this row.
    pub species: Vec<SpeciesMetrics>,
}

/// Per-species metrics nested under exactly one `ModelMetrics` row.
/// Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesMetrics {
    /// Numeric class id.
    pub class_id: u32,
    /// Species (class) name.
    pub class_name: String,
    /// Confusion counts restricted to this class.
    pub counts: ConfusionCounts,
    /// Precision for this class.
    pub precision: f64,
    /// Recall for this class.
    pub recall: f64,
    /// F1 for this class.
    pub f1: f64,
    /// AP for this class, `None` without ground truth.
    pub ap: Option<f64>,
    /// Mean confidence of this class's predictions.
    pub avg_confidence: f64,
    /// Ground-truth boxes of this class in the evaluated slice.
    pub ground_truth_count: usize,
    /// Predictions of this class in the evaluated slice.
    pub detected_count: usize,
}

/// Scoring outcome for one (image, model) pair. One row per pair per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEvaluationResult {
    /// Model that produced the predictions.
    pub model_name: String,
    /// Image filename.
    pub filename: String,
    /// Ground-truth boxes for the image.
    pub ground_truth: Vec<GroundTruth>,
    /// Predictions for the image (pre-filtered by the detector).
    pub predictions: Vec<Detection>,
    /// Committed matches.
    pub matches: Vec<BoxMatch>,
    /// Prediction indices left unmatched.
    pub unmatched_predictions: Vec<usize>,
    /// Ground-truth indices left unmatched.
    pub unmatched_ground_truth: Vec<usize>,
    /// Image-level precision.
    pub precision: f64,
    /// Image-level recall.
    pub recall: f64,
    /// Image-level F1.
    pub f1: f64,
    /// Mean IoU over committed matches.
    pub mean_iou: f64,
    /// Detector inference time for this image, when reported.
    pub inference_time_ms: Option<f64>,
}

/// A persisted pairwise model comparison over per-fold metric samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    /// First model name.
    pub model_a: String,
    /// Second model name.
    pub model_b: String,
    /// Metric the samples were drawn from (e.g. "f1").
    pub metric: String,
    /// Test outcome.
    pub result: TTestResult,
}

/// The complete persisted document for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDocument {
    /// The run header.
    pub run: EvaluationRun,
    /// Per-model rows (per model x fold plus aggregate in k-fold mode).
    pub model_metrics: Vec<ModelMetrics>,
    /// One row per (image, model) pair.
    pub image_results: Vec<ImageEvaluationResult>,
    /// Pairwise comparisons (k-fold mode with at least two models).
    pub comparisons: Vec<ModelComparison>,
}
