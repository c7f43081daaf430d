//! Configuration type definitions.

use crate::constants::{
    DEFAULT_ALPHA, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FOLDS, DEFAULT_IOU_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default evaluation settings.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Default evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// IoU threshold for matching.
    pub iou_threshold: f64,

    /// Confidence threshold handed to the detector.
    pub confidence_threshold: f64,

    /// Number of folds (1 = no fold split).
    pub folds: usize,

    /// Significance level for model comparisons.
    pub alpha: f64,

    /// Species filter; empty means all species.
    pub species: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            folds: DEFAULT_FOLDS,
            alpha: DEFAULT_ALPHA,
            species: Vec::new(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for run documents (default: dataset directory).
    pub dir: Option<PathBuf>,

    /// Also write the metrics table as CSV.
    pub csv: bool,
}
