//! File-backed detector collaborator.
//!
//! Reads pre-computed predictions from one directory per model, one
//! `{image}.json` per image. This is how detector output reaches the
//! engine when inference ran elsewhere (the usual case for camera-trap
//! pipelines, where the GPU box and the evaluation box are different
//! machines).

use crate::constants::dataset::PREDICTION_EXTENSION;
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::matching::Detection;
use crate::store::Detector;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One prediction as stored on disk: normalized corner-form box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Box corners `[x1, y1, x2, y2]`, normalized to the image. Same unit
    /// square as the ground-truth annotations; corner-form rather than
    /// the annotations' center-form.
    pub bbox: [f64; 4],
    /// Detection confidence.
    pub confidence: f64,
    /// Numeric class id.
    pub class_id: u32,
    /// Class name.
    pub class_name: String,
}

/// Detector reading per-image prediction JSON files from a directory.
#[derive(Debug)]
pub struct FileDetector {
    name: String,
    dir: PathBuf,
}

impl FileDetector {
    /// Create a detector named after its prediction directory.
    pub fn new(name: &str, dir: &Path) -> Self {
        Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
        }
    }

    fn prediction_path(&self, image: &str) -> PathBuf {
        self.dir
            .join(Path::new(image).with_extension(PREDICTION_EXTENSION))
    }
}

impl Detector for FileDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, image: &str, confidence_threshold: f64) -> Result<Vec<Detection>> {
        let path = self.prediction_path(image);
        if !path.exists() {
            // The detector saw the image and found nothing worth keeping.
            debug!("No prediction file for '{image}' ({})", self.name);
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)?;
        let records: Vec<PredictionRecord> = serde_json::from_str(&content)
            .map_err(|source| Error::PredictionParse { path, source })?;

        let mut detections = Vec::with_capacity(records.len());
        for record in records {
            if record.confidence < confidence_threshold {
                continue;
            }
            let [x1, y1, x2, y2] = record.bbox;
            let bbox = BoundingBox::from_corners(x1, y1, x2, y2).map_err(|e| Error::Detection {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
            detections.push(Detection::new(
                bbox,
                record.confidence,
                record.class_id,
                &record.class_name,
            )?);
        }
        Ok(detections)
    }
}
