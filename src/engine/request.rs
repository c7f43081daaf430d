//! Evaluation request parameters and synchronous validation.

use crate::constants::{confidence, iou};
use crate::error::{Error, Result};
use crate::store::{DateRange, EvaluationRun, RunStatus};
use chrono::Utc;

/// Parameters for starting an evaluation run.
///
/// Validation happens synchronously in `EvaluationEngine::start_evaluation`,
/// before any run record is persisted.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// Explicit run id; derived from the name when `None`.
    pub id: Option<String>,
    /// Human-readable run name.
    pub name: String,
    /// IoU threshold for matching.
    pub iou_threshold: f64,
    /// Confidence threshold handed to the detector.
    pub confidence_threshold: f64,
    /// Models to evaluate; must be non-empty and registered.
    pub models: Vec<String>,
    /// Species filter by class name; empty means all.
    pub species_filter: Vec<String>,
    /// Capture-date window.
    pub date_range: DateRange,
    /// Number of folds (1 = no fold split).
    pub folds: usize,
    /// Significance level for pairwise model comparisons.
    pub alpha: f64,
}

impl EvaluationRequest {
    /// Validate all parameters. Errors surface to the caller before a run
    /// record exists anywhere.
    pub fn validate(&self) -> Result<()> {
        if !(iou::MIN..=iou::MAX).contains(&self.iou_threshold) {
            return Err(Error::InvalidRequest {
                message: format!(
                    "iou_threshold must be between {} and {}, got {}",
                    iou::MIN,
                    iou::MAX,
                    self.iou_threshold
                ),
            });
        }

        if !(confidence::MIN..=confidence::MAX).contains(&self.confidence_threshold) {
            return Err(Error::InvalidRequest {
                message: format!(
                    "confidence_threshold must be between {} and {}, got {}",
                    confidence::MIN,
                    confidence::MAX,
                    self.confidence_threshold
                ),
            });
        }

        if self.models.is_empty() {
            return Err(Error::InvalidRequest {
                message: "at least one model must be selected".to_string(),
            });
        }

        if self.folds == 0 {
            return Err(Error::InvalidRequest {
                message: "folds must be at least 1".to_string(),
            });
        }

        if !(0.0..1.0).contains(&self.alpha) || self.alpha == 0.0 {
            return Err(Error::InvalidRequest {
                message: format!("alpha must be in (0, 1), got {}", self.alpha),
            });
        }

        if let (Some(from), Some(to)) = (self.date_range.from, self.date_range.to)
            && from > to
        {
            return Err(Error::InvalidRequest {
                message: format!("date range is empty: {from} is after {to}"),
            });
        }

        Ok(())
    }

    /// The run id: explicit, or derived from the name plus start time.
    pub fn run_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            let slug: String = self
                .name
                .to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '-' })
                .collect();
            format!("{slug}-{}", Utc::now().timestamp_millis())
        })
    }

    /// Build the initial PENDING run record.
    pub fn into_run(self, run_id: String) -> EvaluationRun {
        EvaluationRun {
            id: run_id,
            name: self.name,
            iou_threshold: self.iou_threshold,
            confidence_threshold: self.confidence_threshold,
            model_filters: self.models,
            species_filter: self.species_filter,
            date_range: self.date_range,
            folds: self.folds,
            alpha: self.alpha,
            status: RunStatus::Pending,
            aggregates: None,
            total_images_evaluated: 0,
            error_message: None,
            processing_duration_secs: None,
            created_at: Utc::now(),
        }
    }
}
