//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "wildeval";

/// Default IoU threshold for matching predictions to ground truth.
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Default confidence threshold recorded with a run.
///
/// The detector collaborator filters by confidence before handing
/// detections to the engine; this value is only recorded as a run
/// parameter, never re-applied.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.25;

/// Default number of folds (1 = plain evaluation, no fold split).
pub const DEFAULT_FOLDS: usize = 1;

/// Default significance level for statistical comparisons.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// IoU value bounds.
pub mod iou {
    /// Minimum valid IoU threshold.
    pub const MIN: f64 = 0.0;
    /// Maximum valid IoU threshold.
    pub const MAX: f64 = 1.0;
}

/// Confidence value bounds.
pub mod confidence {
    /// Minimum valid confidence value.
    pub const MIN: f64 = 0.0;
    /// Maximum valid confidence value.
    pub const MAX: f64 = 1.0;
}

/// IoU thresholds swept for the COCO-style mAP@0.5:0.95 aggregate.
pub const MAP_SWEEP_THRESHOLDS: [f64; 10] = [
    0.50, 0.55, 0.60, 0.65, 0.70, 0.75, 0.80, 0.85, 0.90, 0.95,
];

/// File layout of a dataset directory consumed by the CLI.
pub mod dataset {
    /// Subdirectory holding ground-truth annotation files.
    pub const GROUND_TRUTH_DIR: &str = "groundtruth";
    /// Subdirectory holding one prediction directory per model.
    pub const PREDICTIONS_DIR: &str = "predictions";
    /// Class-name list file inside the ground-truth directory.
    pub const CLASSES_FILE: &str = "classes.txt";
    /// Extension of ground-truth annotation files.
    pub const ANNOTATION_EXTENSION: &str = "txt";
    /// Extension of per-image prediction files.
    pub const PREDICTION_EXTENSION: &str = "json";
}

/// Output file names written by the CLI.
pub mod output_files {
    /// Run document filename template (`{run_id}` substituted).
    pub const RUN_DOCUMENT_SUFFIX: &str = ".wildeval.json";
    /// Metrics table CSV suffix.
    pub const METRICS_CSV_SUFFIX: &str = ".wildeval.metrics.csv";
}

/// Label appended to the per-model aggregate row in k-fold mode.
pub const FOLD_AGGREGATE_LABEL: &str = "[all folds]";

/// Poll interval for the CLI progress bar, in milliseconds.
pub const PROGRESS_POLL_INTERVAL_MS: u64 = 100;
