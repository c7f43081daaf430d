//! CSV export of the per-model metrics table.

use crate::error::{Error, Result};
use crate::store::RunDocument;
use std::path::Path;

/// Write one CSV row per model-metrics row in the run document.
pub fn export_metrics_csv(document: &RunDocument, path: &Path) -> Result<()> {
    let map_err = |source| Error::CsvWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(map_err)?;
    writer
        .write_record([
            "model",
            "fold",
            "images",
            "tp",
            "fp",
            "fn",
            "precision",
            "recall",
            "f1",
            "map_50",
            "map_50_95",
        ])
        .map_err(map_err)?;

    for row in &document.model_metrics {
        let fold = row.fold.map_or_else(String::new, |f| f.to_string());
        writer
            .write_record([
                row.label.clone(),
                fold,
                row.images_processed.to_string(),
                row.counts.true_positives.to_string(),
                row.counts.false_positives.to_string(),
                row.counts.false_negatives.to_string(),
                format!("{:.4}", row.precision),
                format!("{:.4}", row.recall),
                format!("{:.4}", row.f1),
                format!("{:.4}", row.map_50),
                format!("{:.4}", row.map_50_95),
            ])
            .map_err(map_err)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metrics::ConfusionCounts;
    use crate::store::{DateRange, EvaluationRun, ModelMetrics, RunStatus};
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn test_export_writes_header_and_rows() {
        let run = EvaluationRun {
            id: "run-1".to_string(),
            name: "export test".to_string(),
            iou_threshold: 0.5,
            confidence_threshold: 0.25,
            model_filters: vec!["mdv5".to_string()],
            species_filter: Vec::new(),
            date_range: DateRange::default(),
            folds: 1,
            alpha: 0.05,
            status: RunStatus::Completed,
            aggregates: None,
            total_images_evaluated: 3,
            error_message: None,
            processing_duration_secs: Some(0.1),
            created_at: Utc::now(),
        };
        let document = RunDocument {
            run,
            model_metrics: vec![ModelMetrics {
                label: "mdv5".to_string(),
                model_name: "mdv5".to_string(),
                fold: None,
                images_processed: 3,
                counts: ConfusionCounts {
                    true_positives: 4,
                    false_positives: 1,
                    false_negatives: 2,
                },
                precision: 0.8,
                recall: 2.0 / 3.0,
                f1: 0.727_272,
                per_class_ap: Vec::new(),
                map_50: 0.75,
                map_50_95: 0.5,
                fold_spread: None,
                species: Vec::new(),
            }],
            image_results: Vec::new(),
            comparisons: Vec::new(),
        };

        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        export_metrics_csv(&document, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("model,fold,images"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("mdv5,,3,4,1,2,0.8000"));
    }
}
