//! End-to-end evaluation runs over on-disk dataset fixtures.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wildeval::engine::{EvaluationEngine, EvaluationRequest, ModelRegistry};
use wildeval::error::{Error, Result};
use wildeval::matching::Detection;
use wildeval::store::{
    DateRange, Detector, EvaluationStore, FileDetector, JsonStore, RunStatus, YoloGroundTruth,
};
use wildeval::constants::FOLD_AGGREGATE_LABEL;

/// Write a dataset with `images` annotated images, one `red_deer` box
/// each, and matching predictions for every model in `models`.
///
/// The first model predicts the ground-truth box exactly; later models
/// predict a shifted box that still clears IoU 0.5.
fn write_dataset(root: &Path, images: usize, models: &[&str]) {
    let gt_dir = root.join("groundtruth");
    std::fs::create_dir_all(&gt_dir).unwrap();
    std::fs::write(gt_dir.join("classes.txt"), "red_deer\nwild_boar\n").unwrap();

    for i in 0..images {
        std::fs::write(
            gt_dir.join(format!("cam01_{i:04}.txt")),
            "0 0.5 0.5 0.2 0.2\n",
        )
        .unwrap();
    }

    for (m, model) in models.iter().enumerate() {
        let pred_dir = root.join("predictions").join(model);
        std::fs::create_dir_all(&pred_dir).unwrap();
        let bbox = if m == 0 {
            [0.4, 0.4, 0.6, 0.6]
        } else {
            [0.45, 0.4, 0.65, 0.6]
        };
        for i in 0..images {
            let json = format!(
                r#"[{{"bbox": [{}, {}, {}, {}], "confidence": 0.9, "class_id": 0, "class_name": "red_deer"}}]"#,
                bbox[0], bbox[1], bbox[2], bbox[3]
            );
            std::fs::write(pred_dir.join(format!("cam01_{i:04}.json")), json).unwrap();
        }
    }
}

fn engine_for(root: &Path, models: &[&str]) -> (EvaluationEngine, Arc<JsonStore>) {
    let ground_truth = Arc::new(YoloGroundTruth::open(&root.join("groundtruth")).unwrap());
    let registry = Arc::new(ModelRegistry::new());
    for model in models {
        let dir = root.join("predictions").join(model);
        registry.register(Arc::new(FileDetector::new(model, &dir)));
    }
    let store = Arc::new(JsonStore::new(&root.join("out")).unwrap());
    let engine = EvaluationEngine::new(
        registry,
        ground_truth,
        Arc::clone(&store) as Arc<dyn EvaluationStore>,
    );
    (engine, store)
}

fn request(id: &str, models: &[&str], folds: usize) -> EvaluationRequest {
    EvaluationRequest {
        id: Some(id.to_string()),
        name: "survey".to_string(),
        iou_threshold: 0.5,
        confidence_threshold: 0.25,
        models: models.iter().map(ToString::to_string).collect(),
        species_filter: Vec::new(),
        date_range: DateRange::default(),
        folds,
        alpha: 0.05,
    }
}

#[test]
fn test_full_run_completes_with_perfect_predictions() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 6, &["mdv5"]);
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 1)).unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Completed);
    assert_eq!(document.run.total_images_evaluated, 6);
    assert!(document.run.processing_duration_secs.is_some());
    assert!(document.run.error_message.is_none());

    let aggregates = document.run.aggregates.unwrap();
    assert!((aggregates.precision - 1.0).abs() < 1e-10);
    assert!((aggregates.recall - 1.0).abs() < 1e-10);
    assert!((aggregates.f1 - 1.0).abs() < 1e-10);
    assert!((aggregates.map_50 - 1.0).abs() < 1e-10);

    assert_eq!(document.model_metrics.len(), 1);
    let row = &document.model_metrics[0];
    assert_eq!(row.label, "mdv5");
    assert_eq!(row.images_processed, 6);
    assert_eq!(row.counts.true_positives, 6);
    assert!(row.fold_spread.is_none());

    // One species row for red_deer; wild_boar never appears.
    assert_eq!(row.species.len(), 1);
    assert_eq!(row.species[0].class_name, "red_deer");
    assert_eq!(row.species[0].ground_truth_count, 6);
    assert!((row.species[0].avg_confidence - 0.9).abs() < 1e-10);

    // One image result per (image, model) pair.
    assert_eq!(document.image_results.len(), 6);
    assert!(document.comparisons.is_empty());
}

#[test]
fn test_progress_reaches_terminal_state() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 3, &["mdv5"]);
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 1)).unwrap();
    handle.wait().unwrap();

    let snapshot = engine.get_progress("run-1").unwrap();
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert!(snapshot.is_terminal());
    assert_eq!(snapshot.progress_percentage(), 100);
}

#[test]
fn test_duplicate_run_id_rejected() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 3, &["mdv5"]);
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 1)).unwrap();
    handle.wait().unwrap();

    // A terminal run is never restarted under the same id.
    let second = engine.start_evaluation(request("run-1", &["mdv5"], 1));
    assert!(matches!(second, Err(Error::RunAlreadyStarted { .. })));
}

#[test]
fn test_invalid_request_rejected_before_any_record_exists() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 3, &["mdv5"]);
    let (engine, store) = engine_for(dir.path(), &["mdv5"]);

    let mut bad = request("run-1", &["mdv5"], 1);
    bad.iou_threshold = 1.5;
    assert!(matches!(
        engine.start_evaluation(bad),
        Err(Error::InvalidRequest { .. })
    ));

    // Nothing was persisted and the id stays available.
    assert!(store.load_document("run-1").is_err());
    assert!(engine.get_progress("run-1").is_none());
    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 1)).unwrap();
    handle.wait().unwrap();
}

#[test]
fn test_empty_dataset_fails_run() {
    let dir = TempDir::new().unwrap();
    let gt_dir = dir.path().join("groundtruth");
    std::fs::create_dir_all(&gt_dir).unwrap();
    std::fs::write(gt_dir.join("classes.txt"), "red_deer\n").unwrap();
    let (engine, _store) = engine_for(dir.path(), &[]);

    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 1)).unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Failed);
    assert!(document.run.error_message.unwrap().contains("no evaluable images"));

    let snapshot = engine.get_progress("run-1").unwrap();
    assert_eq!(snapshot.status, RunStatus::Failed);
}

#[test]
fn test_unregistered_model_fails_run() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 3, &["mdv5"]);
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let handle = engine.start_evaluation(request("run-1", &["ghost"], 1)).unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Failed);
    assert!(document.run.error_message.unwrap().contains("ghost"));
}

#[test]
fn test_images_without_ground_truth_are_excluded() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 4, &["mdv5"]);
    // A verified-empty annotation: the image is not evaluable.
    std::fs::write(dir.path().join("groundtruth/cam01_9999.txt"), "").unwrap();
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 1)).unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Completed);
    assert_eq!(document.run.total_images_evaluated, 4);
}

#[test]
fn test_corrupt_prediction_excludes_image_and_continues() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 5, &["mdv5"]);
    std::fs::write(
        dir.path().join("predictions/mdv5/cam01_0002.json"),
        "not json",
    )
    .unwrap();
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 1)).unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Completed);
    assert_eq!(document.run.total_images_evaluated, 4);
    assert!(
        !document
            .image_results
            .iter()
            .any(|r| r.filename == "cam01_0002")
    );
}

#[test]
fn test_corrupt_annotation_excludes_image_and_continues() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 5, &["mdv5"]);
    std::fs::write(
        dir.path().join("groundtruth/cam01_0002.txt"),
        "0 not-a-number 0.5 0.2 0.2\n",
    )
    .unwrap();
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 1)).unwrap();
    handle.wait().unwrap();

    // A bad annotation costs one image, not the run.
    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Completed);
    assert_eq!(document.run.total_images_evaluated, 4);
    assert!(
        !document
            .image_results
            .iter()
            .any(|r| r.filename == "cam01_0002")
    );
}

#[test]
fn test_date_window_in_the_past_fails_run() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 3, &["mdv5"]);
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let mut req = request("run-1", &["mdv5"], 1);
    req.date_range = DateRange {
        from: chrono::DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .map(Into::into)
            .ok(),
        to: chrono::DateTime::parse_from_rfc3339("2020-12-31T23:59:59Z")
            .map(Into::into)
            .ok(),
    };
    let handle = engine.start_evaluation(req).unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Failed);
}

#[test]
fn test_species_filter_narrows_species_rows() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 4, &["mdv5"]);
    // Add a wild_boar box to one image; no model predicts it.
    std::fs::write(
        dir.path().join("groundtruth/cam01_0000.txt"),
        "0 0.5 0.5 0.2 0.2\n1 0.2 0.2 0.1 0.1\n",
    )
    .unwrap();
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let mut req = request("run-1", &["mdv5"], 1);
    req.species_filter = vec!["red_deer".to_string()];
    let handle = engine.start_evaluation(req).unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Completed);
    let row = &document.model_metrics[0];
    // The boar box is outside the filter: no false negative, full marks.
    assert_eq!(row.counts.false_negatives, 0);
    assert_eq!(row.species.len(), 1);
    assert_eq!(row.species[0].class_name, "red_deer");
}

#[test]
fn test_kfold_writes_fold_rows_and_aggregate() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 12, &["mdv5"]);
    let (engine, _store) = engine_for(dir.path(), &["mdv5"]);

    let handle = engine.start_evaluation(request("run-1", &["mdv5"], 3)).unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Completed);

    // Three fold rows plus the aggregate row.
    assert_eq!(document.model_metrics.len(), 4);
    let fold_rows: Vec<_> = document
        .model_metrics
        .iter()
        .filter(|r| r.fold.is_some())
        .collect();
    assert_eq!(fold_rows.len(), 3);
    let total_fold_images: usize = fold_rows.iter().map(|r| r.images_processed).sum();
    assert_eq!(total_fold_images, 12);

    let aggregate = document
        .model_metrics
        .iter()
        .find(|r| r.fold.is_none())
        .unwrap();
    assert_eq!(aggregate.label, format!("mdv5 {FOLD_AGGREGATE_LABEL}"));
    assert_eq!(aggregate.images_processed, 12);
    let spread = aggregate.fold_spread.unwrap();
    // Perfect predictions in every fold: mean 1.0, no spread.
    assert!((spread.f1.0 - 1.0).abs() < 1e-10);
    assert!(spread.f1.1.abs() < 1e-10);
}

#[test]
fn test_single_fold_equals_plain_evaluation() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 5, &["mdv5", "yolov8"]);
    let (engine, _store) = engine_for(dir.path(), &["mdv5", "yolov8"]);

    let handle = engine
        .start_evaluation(request("run-1", &["mdv5", "yolov8"], 1))
        .unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Completed);
    // k = 1: plain rows only, no fold decoration, no comparisons.
    assert_eq!(document.model_metrics.len(), 2);
    assert!(document.model_metrics.iter().all(|r| r.fold.is_none()));
    assert!(document.model_metrics.iter().all(|r| r.fold_spread.is_none()));
    assert!(document.comparisons.is_empty());
}

#[test]
fn test_kfold_two_models_produces_comparison() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 10, &["mdv5", "yolov8"]);
    let (engine, _store) = engine_for(dir.path(), &["mdv5", "yolov8"]);

    let handle = engine
        .start_evaluation(request("run-1", &["mdv5", "yolov8"], 2))
        .unwrap();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    assert_eq!(document.run.status, RunStatus::Completed);
    assert_eq!(document.comparisons.len(), 1);

    let comparison = &document.comparisons[0];
    assert_eq!(comparison.model_a, "mdv5");
    assert_eq!(comparison.model_b, "yolov8");
    assert_eq!(comparison.metric, "f1");
    assert_eq!(comparison.result.degrees_of_freedom, 2);
    // Both models score perfectly in this fixture: no significant gap.
    assert!(!comparison.result.significant);
}

/// Detector that sleeps per image, for exercising cancellation.
struct SlowDetector;

impl Detector for SlowDetector {
    fn name(&self) -> &str {
        "slow"
    }

    fn detect(&self, _image: &str, _confidence_threshold: f64) -> Result<Vec<Detection>> {
        std::thread::sleep(std::time::Duration::from_millis(30));
        Ok(Vec::new())
    }
}

#[test]
fn test_cancellation_stops_run_at_image_boundary() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), 30, &[]);
    let ground_truth =
        Arc::new(YoloGroundTruth::open(&dir.path().join("groundtruth")).unwrap());
    let registry = Arc::new(ModelRegistry::new());
    registry.register(Arc::new(SlowDetector));
    let store = Arc::new(JsonStore::new(&dir.path().join("out")).unwrap());
    let engine = EvaluationEngine::new(
        registry,
        ground_truth,
        Arc::clone(&store) as Arc<dyn EvaluationStore>,
    );

    let handle = engine.start_evaluation(request("run-1", &["slow"], 1)).unwrap();
    handle.cancel();
    handle.wait().unwrap();

    let document = engine.run_document("run-1").unwrap();
    // Cancellation lands in a terminal state, never a stuck PROCESSING.
    assert_eq!(document.run.status, RunStatus::Failed);
    assert!(document.run.error_message.unwrap().contains("cancelled"));
}
