//! Collaborator boundaries and default implementations.
//!
//! The engine consumes three external collaborators, specified here as
//! traits: a [`Detector`] producing pre-filtered predictions, a
//! [`GroundTruthProvider`] producing verified annotations, and an
//! [`EvaluationStore`] accepting append-only result records. The default
//! implementations work off plain files so the CLI is usable end to end.

mod csv_export;
mod detector;
mod ground_truth;
mod json_store;
mod records;

pub use csv_export::export_metrics_csv;
pub use detector::FileDetector;
pub use ground_truth::YoloGroundTruth;
pub use json_store::JsonStore;
pub use records::{
    ClassAp, DateRange, EvaluationRun, FoldSpread, ImageEvaluationResult, ModelComparison,
    ModelMetrics, RunAggregates, RunDocument, RunStatus, SpeciesMetrics,
};

use crate::error::Result;
use crate::matching::{Detection, GroundTruth};
use chrono::{DateTime, Utc};

/// One evaluable image as listed by a ground-truth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Image filename (annotation stem plus image extension when known).
    pub filename: String,
    /// Capture timestamp when the provider knows it.
    pub captured_at: Option<DateTime<Utc>>,
}

/// The external detector collaborator.
///
/// Implementations filter by the given confidence threshold themselves;
/// the engine records the threshold as a run parameter but never
/// re-applies it.
pub trait Detector: Send + Sync {
    /// Model name for reporting.
    fn name(&self) -> &str;

    /// Predictions for one image at the given confidence threshold.
    ///
    /// An error from this method is image-scoped: the engine logs it,
    /// excludes the image from every aggregate and continues the run.
    fn detect(&self, image: &str, confidence_threshold: f64) -> Result<Vec<Detection>>;
}

/// The external ground-truth collaborator.
pub trait GroundTruthProvider: Send + Sync {
    /// All images this provider has annotations for.
    fn list_images(&self) -> Result<Vec<ImageEntry>>;

    /// Verified boxes for one image; empty when none are available.
    fn load(&self, image: &str) -> Result<Vec<GroundTruth>>;

    /// Class names known to this provider, indexed by class id.
    fn class_names(&self) -> &[String];
}

/// The external persistence collaborator. All child-record writes are
/// append-only; only the run header is rewritten, and only until it
/// reaches a terminal state.
pub trait EvaluationStore: Send + Sync {
    /// Create or update the run header.
    fn save_run(&self, run: &EvaluationRun) -> Result<()>;

    /// Append one model-metrics row (children included) to the run.
    fn append_model_metrics(&self, run_id: &str, metrics: ModelMetrics) -> Result<()>;

    /// Append one (image, model) result row to the run.
    fn append_image_result(&self, run_id: &str, result: ImageEvaluationResult) -> Result<()>;

    /// Append one pairwise model comparison to the run.
    fn append_comparison(&self, run_id: &str, comparison: ModelComparison) -> Result<()>;

    /// Read the complete document for a run.
    fn load_document(&self, run_id: &str) -> Result<RunDocument>;

    /// Delete a run and, by cascade, everything it owns.
    fn delete_run(&self, run_id: &str) -> Result<()>;
}
