//! Evaluation run orchestration.
//!
//! `EvaluationEngine::start_evaluation` validates the request, persists a
//! PENDING run and hands the rest to a background worker thread; the call
//! returns immediately and progress is obtained only by polling. Within a
//! run, (image, model) pairs are processed in a fixed single-threaded
//! sequence, so results are deterministic for deterministic inputs;
//! different runs may execute concurrently.

use crate::constants::FOLD_AGGREGATE_LABEL;
use crate::engine::{EvaluationRequest, ModelRegistry};
use crate::error::{Error, Result};
use crate::folds::{fold_spread, partition};
use crate::matching::{Detection, GroundTruth, MatchResult, match_detections};
use crate::metrics::{ConfusionCounts, average_precision, map_sweep, mean_average_precision};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::stats::t_test;
use crate::store::{
    ClassAp, Detector, EvaluationRun, EvaluationStore, FoldSpread, GroundTruthProvider,
    ImageEvaluationResult, ModelComparison, ModelMetrics, RunAggregates, RunDocument, RunStatus,
    SpeciesMetrics,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Steps assumed before the workload size is known (initialize, gather,
/// load, aggregate, save).
const PROVISIONAL_STEPS: usize = 5;

/// Cooperative cancellation token, checked at the image-iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The worker notices before the next image.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle for a started evaluation run.
pub struct RunHandle {
    /// Identifier of the started run.
    pub run_id: String,
    cancel: CancellationToken,
    join: Option<std::thread::JoinHandle<()>>,
}

impl RunHandle {
    /// Request cooperative cancellation of the run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clone of this run's cancellation token, for signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the worker thread has finished.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(std::thread::JoinHandle::is_finished)
    }

    /// Block until the worker finishes. The run outcome (COMPLETED or
    /// FAILED) is read from the store or the progress tracker, not from
    /// this method.
    pub fn wait(mut self) -> Result<()> {
        let run_id = self.run_id.clone();
        match self.join.take() {
            Some(join) => join.join().map_err(|_| Error::WorkerLost { run_id }),
            None => Ok(()),
        }
    }
}

/// Top-level evaluation engine owning the run lifecycle.
pub struct EvaluationEngine {
    registry: Arc<ModelRegistry>,
    ground_truth: Arc<dyn GroundTruthProvider>,
    store: Arc<dyn EvaluationStore>,
    tracker: Arc<ProgressTracker>,
    // Every run id ever started in this process; enforces at most one
    // execution per id, terminal ids included.
    started: Mutex<HashSet<String>>,
}

impl EvaluationEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        registry: Arc<ModelRegistry>,
        ground_truth: Arc<dyn GroundTruthProvider>,
        store: Arc<dyn EvaluationStore>,
    ) -> Self {
        Self {
            registry,
            ground_truth,
            store,
            tracker: Arc::new(ProgressTracker::new()),
            started: Mutex::new(HashSet::new()),
        }
    }

    /// Poll one run's progress.
    pub fn get_progress(&self, run_id: &str) -> Option<ProgressSnapshot> {
        self.tracker.snapshot(run_id)
    }

    /// Read the persisted document for a run.
    pub fn run_document(&self, run_id: &str) -> Result<RunDocument> {
        self.store.load_document(run_id)
    }

    /// Delete a run and everything it owns.
    pub fn delete_run(&self, run_id: &str) -> Result<()> {
        self.store.delete_run(run_id)
    }

    /// Validate and start an evaluation in the background.
    ///
    /// Returns immediately with a [`RunHandle`]. Validation failures
    /// surface here, before any run record is persisted. Starting a second
    /// evaluation for an id that is already active or terminal is
    /// rejected.
    pub fn start_evaluation(&self, request: EvaluationRequest) -> Result<RunHandle> {
        request.validate()?;
        let run_id = request.run_id();

        {
            let mut started = lock(&self.started);
            if started.contains(&run_id) {
                let state = self
                    .tracker
                    .snapshot(&run_id)
                    .map_or_else(|| "active".to_string(), |s| s.status.to_string());
                return Err(Error::RunAlreadyStarted { run_id, state });
            }
            started.insert(run_id.clone());
        }

        let run = request.into_run(run_id.clone());
        if let Err(e) = self.store.save_run(&run) {
            lock(&self.started).remove(&run_id);
            return Err(e);
        }

        info!("Starting evaluation run '{run_id}' ({} models)", run.model_filters.len());

        let cancel = CancellationToken::new();
        let worker = Worker {
            run,
            registry: Arc::clone(&self.registry),
            ground_truth: Arc::clone(&self.ground_truth),
            store: Arc::clone(&self.store),
            tracker: Arc::clone(&self.tracker),
            cancel: cancel.clone(),
        };

        let join = std::thread::Builder::new()
            .name(format!("wildeval-{run_id}"))
            .spawn(move || worker.run())
            .map_err(|e| {
                lock(&self.started).remove(&run_id);
                Error::Io(e)
            })?;

        Ok(RunHandle {
            run_id,
            cancel,
            join: Some(join),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// One evaluable image with its (species-filtered) ground truth.
struct EvaluableImage {
    filename: String,
    ground_truth: Vec<GroundTruth>,
}

/// Scoring outcome for one (image, model) pair, staged in memory until
/// aggregation.
struct ImageScore {
    filename: String,
    predictions: Vec<Detection>,
    ground_truth: Vec<GroundTruth>,
    result: MatchResult,
    counts: ConfusionCounts,
    inference_time_ms: f64,
}

/// Background worker executing one run to a terminal state.
struct Worker {
    run: EvaluationRun,
    registry: Arc<ModelRegistry>,
    ground_truth: Arc<dyn GroundTruthProvider>,
    store: Arc<dyn EvaluationStore>,
    tracker: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

impl Worker {
    /// Drive the run to COMPLETED or FAILED. Never leaves PROCESSING
    /// behind: every error path lands in `fail`.
    fn run(mut self) {
        let started = Instant::now();
        let run_id = self.run.id.clone();

        self.tracker.start(&run_id, PROVISIONAL_STEPS);
        self.run.status = RunStatus::Processing;
        if let Err(e) = self.store.save_run(&self.run) {
            self.fail(started, &e);
            return;
        }

        match self.execute(started) {
            Ok(()) => {
                info!(
                    "Run '{run_id}' completed: {} images in {:.2}s",
                    self.run.total_images_evaluated,
                    started.elapsed().as_secs_f64()
                );
            }
            Err(e) => self.fail(started, &e),
        }
    }

    fn fail(&mut self, started: Instant, e: &Error) {
        let run_id = self.run.id.clone();
        error!("Run '{run_id}' failed: {e}");

        self.run.status = RunStatus::Failed;
        self.run.error_message = Some(e.to_string());
        self.run.processing_duration_secs = Some(started.elapsed().as_secs_f64());
        if let Err(save_err) = self.store.save_run(&self.run) {
            error!("Could not persist FAILED state for run '{run_id}': {save_err}");
        }
        self.tracker.fail(&run_id, &e.to_string());
    }

    fn execute(&mut self, started: Instant) -> Result<()> {
        let run_id = self.run.id.clone();

        self.tracker.update(&run_id, "gather images");
        let images = self.gather_images()?;

        self.tracker.update(&run_id, "load models");
        let detectors = self.load_models()?;

        let pairs = images.len() * detectors.len();
        self.tracker.set_total(&run_id, 2 + pairs + 3);

        let (per_model, evaluated) = self.score_pairs(&run_id, &images, &detectors)?;
        if evaluated == 0 {
            return Err(Error::NoEvaluableImages {
                message: format!(
                    "all {} gathered image(s) failed during scoring; no metrics were measured",
                    images.len()
                ),
            });
        }

        self.tracker.update(&run_id, "model aggregation");
        let catalog = self.class_catalog();
        let mut base_rows = Vec::with_capacity(detectors.len());
        let mut fold_f1_samples: Vec<(String, Vec<f64>)> = Vec::new();

        for (detector, scores) in detectors.iter().zip(&per_model) {
            let model_name = detector.name();
            let all: Vec<&ImageScore> = scores.iter().collect();

            let mut spread = None;
            if self.run.folds > 1 {
                let fold_rows = self.fold_rows(model_name, scores, &catalog);
                fold_f1_samples.push((
                    model_name.to_string(),
                    fold_rows.iter().map(|row| row.f1).collect(),
                ));
                spread = Some(spread_across(&fold_rows));
                for row in fold_rows {
                    self.store.append_model_metrics(&run_id, row)?;
                }
            }

            let label = if self.run.folds > 1 {
                format!("{model_name} {FOLD_AGGREGATE_LABEL}")
            } else {
                model_name.to_string()
            };
            let mut base = self.build_model_metrics(model_name, &label, None, &all, &catalog);
            base.fold_spread = spread;
            base_rows.push(base);
        }

        self.tracker.update(&run_id, "species aggregation");
        for row in &base_rows {
            debug!(
                "Model '{}': {} species rows, mAP@0.5 = {:.4}",
                row.model_name,
                row.species.len(),
                row.map_50
            );
        }
        for row in base_rows.clone() {
            self.store.append_model_metrics(&run_id, row)?;
        }

        for comparison in self.compare_models(&fold_f1_samples)? {
            self.store.append_comparison(&run_id, comparison)?;
        }

        self.tracker.update(&run_id, "saving results");
        for (detector, scores) in detectors.iter().zip(&per_model) {
            for score in scores {
                self.store
                    .append_image_result(&run_id, image_result(detector.name(), score))?;
            }
        }

        self.run.aggregates = Some(run_aggregates(&base_rows));
        self.run.total_images_evaluated = evaluated;
        self.run.status = RunStatus::Completed;
        self.run.processing_duration_secs = Some(started.elapsed().as_secs_f64());
        self.store.save_run(&self.run)?;
        self.tracker.complete(&run_id);
        Ok(())
    }

    /// Gather evaluable images: annotated, inside the date window, with at
    /// least one ground-truth box left after the species filter. Images
    /// without usable ground truth are excluded here, before any fold
    /// assignment. A corrupt or unreadable annotation is image-scoped:
    /// it excludes that image and the run continues.
    fn gather_images(&self) -> Result<Vec<EvaluableImage>> {
        let entries = self.ground_truth.list_images()?;
        let mut images = Vec::new();
        let mut skipped = 0usize;

        for entry in entries {
            if !self.run.date_range.contains(entry.captured_at) {
                continue;
            }
            let mut boxes = match self.ground_truth.load(&entry.filename) {
                Ok(boxes) => boxes,
                Err(e) => {
                    warn!(
                        "Excluding image '{}' from run '{}': {e}",
                        entry.filename, self.run.id
                    );
                    continue;
                }
            };
            if !self.run.species_filter.is_empty() {
                boxes.retain(|b| self.run.species_filter.contains(&b.class_name));
            }
            if boxes.is_empty() {
                skipped += 1;
                continue;
            }
            images.push(EvaluableImage {
                filename: entry.filename,
                ground_truth: boxes,
            });
        }

        if skipped > 0 {
            debug!("Skipped {skipped} image(s) without usable ground truth");
        }
        if images.is_empty() {
            return Err(Error::NoEvaluableImages {
                message: "no annotated images match the run's filters; \
                          check the species filter and date range"
                    .to_string(),
            });
        }
        Ok(images)
    }

    /// Resolve every requested model from the registry. A missing model is
    /// not image-scoped: it aborts the whole run.
    fn load_models(&self) -> Result<Vec<Arc<dyn Detector>>> {
        self.run
            .model_filters
            .iter()
            .map(|name| {
                self.registry.get(name).ok_or_else(|| Error::ModelLoad {
                    model: name.clone(),
                    reason: "not present in the model registry".to_string(),
                })
            })
            .collect()
    }

    /// Run the per-(image, model) scoring loop: exactly one matcher and
    /// metrics pass per pair. Image-scoped failures exclude the image from
    /// every aggregate (all models) and the run continues. Returns the
    /// per-model scores and the number of surviving images.
    fn score_pairs(
        &self,
        run_id: &str,
        images: &[EvaluableImage],
        detectors: &[Arc<dyn Detector>],
    ) -> Result<(Vec<Vec<ImageScore>>, usize)> {
        let mut per_model: Vec<Vec<ImageScore>> = detectors.iter().map(|_| Vec::new()).collect();
        let mut evaluated = 0usize;

        for image in images {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    run_id: run_id.to_string(),
                });
            }

            let mut staged = Vec::with_capacity(detectors.len());
            let mut image_failed = false;

            for detector in detectors {
                self.tracker.update(
                    run_id,
                    &format!("scoring {} [{}]", image.filename, detector.name()),
                );

                let inference_start = Instant::now();
                match detector.detect(&image.filename, self.run.confidence_threshold) {
                    Ok(mut predictions) => {
                        if !self.run.species_filter.is_empty() {
                            predictions
                                .retain(|p| self.run.species_filter.contains(&p.class_name));
                        }
                        let result = match_detections(
                            &predictions,
                            &image.ground_truth,
                            self.run.iou_threshold,
                        );
                        let counts = ConfusionCounts::from_match(&result);
                        staged.push(ImageScore {
                            filename: image.filename.clone(),
                            predictions,
                            ground_truth: image.ground_truth.clone(),
                            result,
                            counts,
                            inference_time_ms: inference_start.elapsed().as_secs_f64() * 1000.0,
                        });
                    }
                    Err(e) => {
                        warn!(
                            "Excluding image '{}' from run '{run_id}': {e}",
                            image.filename
                        );
                        image_failed = true;
                        break;
                    }
                }
            }

            if !image_failed {
                evaluated += 1;
                for (bucket, score) in per_model.iter_mut().zip(staged) {
                    bucket.push(score);
                }
            }
        }

        Ok((per_model, evaluated))
    }

    /// Classes in scope for this run: the provider's catalog, narrowed by
    /// the species filter when one is set.
    fn class_catalog(&self) -> Vec<(u32, String)> {
        self.ground_truth
            .class_names()
            .iter()
            .enumerate()
            .filter(|(_, name)| {
                self.run.species_filter.is_empty() || self.run.species_filter.contains(name)
            })
            .map(|(id, name)| {
                #[allow(clippy::cast_possible_truncation)]
                let id = id as u32;
                (id, name.clone())
            })
            .collect()
    }

    /// One metrics row over a set of scored images.
    fn build_model_metrics(
        &self,
        model_name: &str,
        label: &str,
        fold: Option<usize>,
        scores: &[&ImageScore],
        catalog: &[(u32, String)],
    ) -> ModelMetrics {
        let mut counts = ConfusionCounts::default();
        for score in scores {
            counts.add(score.counts);
        }

        let samples: Vec<(&[Detection], &[GroundTruth])> = scores
            .iter()
            .map(|s| (s.predictions.as_slice(), s.ground_truth.as_slice()))
            .collect();
        let class_ids: Vec<u32> = catalog.iter().map(|(id, _)| *id).collect();

        let per_class_ap: Vec<ClassAp> = catalog
            .iter()
            .map(|(class_id, class_name)| ClassAp {
                class_id: *class_id,
                class_name: class_name.clone(),
                ap: average_precision(&samples, *class_id, self.run.iou_threshold),
            })
            .collect();

        let species = catalog
            .iter()
            .zip(&per_class_ap)
            .map(|((class_id, class_name), class_ap)| {
                species_metrics(*class_id, class_name, scores, class_ap.ap)
            })
            .collect();

        ModelMetrics {
            label: label.to_string(),
            model_name: model_name.to_string(),
            fold,
            images_processed: scores.len(),
            counts,
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1(),
            per_class_ap,
            map_50: mean_average_precision(&samples, &class_ids, 0.5),
            map_50_95: map_sweep(&samples, &class_ids),
            fold_spread: None,
            species: species_or_empty(species),
        }
    }

    /// Per-fold rows for one model. Fold membership comes from the stable
    /// filename hash, so the split is identical across runs and processes.
    fn fold_rows(
        &self,
        model_name: &str,
        scores: &[ImageScore],
        catalog: &[(u32, String)],
    ) -> Vec<ModelMetrics> {
        let refs: Vec<&ImageScore> = scores.iter().collect();
        let folds = partition(refs, self.run.folds, |s| s.filename.as_str());

        folds
            .iter()
            .enumerate()
            .map(|(fold_index, members)| {
                self.build_model_metrics(
                    model_name,
                    &format!("{model_name} [fold {fold_index}]"),
                    Some(fold_index),
                    members,
                    catalog,
                )
            })
            .collect()
    }

    /// Pairwise t-tests over per-fold F1 samples, k-fold mode only.
    fn compare_models(
        &self,
        fold_f1_samples: &[(String, Vec<f64>)],
    ) -> Result<Vec<ModelComparison>> {
        let mut comparisons = Vec::new();
        for (i, (model_a, samples_a)) in fold_f1_samples.iter().enumerate() {
            for (model_b, samples_b) in &fold_f1_samples[i + 1..] {
                let result = t_test(samples_a, samples_b, self.run.alpha)?;
                comparisons.push(ModelComparison {
                    model_a: model_a.clone(),
                    model_b: model_b.clone(),
                    metric: "f1".to_string(),
                    result,
                });
            }
        }
        Ok(comparisons)
    }
}

fn species_metrics(
    class_id: u32,
    class_name: &str,
    scores: &[&ImageScore],
    ap: Option<f64>,
) -> SpeciesMetrics {
    let mut counts = ConfusionCounts::default();
    let mut confidence_sum = 0.0;
    let mut detected_count = 0usize;
    let mut ground_truth_count = 0usize;

    for score in scores {
        for m in &score.result.matches {
            if score.ground_truth[m.ground_truth].class_id == class_id {
                counts.true_positives += 1;
            }
        }
        for &p in &score.result.unmatched_predictions {
            if score.predictions[p].class_id == class_id {
                counts.false_positives += 1;
            }
        }
        for &g in &score.result.unmatched_ground_truth {
            if score.ground_truth[g].class_id == class_id {
                counts.false_negatives += 1;
            }
        }
        for p in &score.predictions {
            if p.class_id == class_id {
                confidence_sum += p.confidence;
                detected_count += 1;
            }
        }
        ground_truth_count += score
            .ground_truth
            .iter()
            .filter(|g| g.class_id == class_id)
            .count();
    }

    #[allow(clippy::cast_precision_loss)]
    let avg_confidence = if detected_count > 0 {
        confidence_sum / detected_count as f64
    } else {
        0.0
    };

    SpeciesMetrics {
        class_id,
        class_name: class_name.to_string(),
        counts,
        precision: counts.precision(),
        recall: counts.recall(),
        f1: counts.f1(),
        ap,
        avg_confidence,
        ground_truth_count,
        detected_count,
    }
}

/// Drop species rows with nothing observed, keeping the document compact.
fn species_or_empty(species: Vec<SpeciesMetrics>) -> Vec<SpeciesMetrics> {
    species
        .into_iter()
        .filter(|s| s.ground_truth_count > 0 || s.detected_count > 0)
        .collect()
}

fn image_result(model_name: &str, score: &ImageScore) -> ImageEvaluationResult {
    ImageEvaluationResult {
        model_name: model_name.to_string(),
        filename: score.filename.clone(),
        ground_truth: score.ground_truth.clone(),
        predictions: score.predictions.clone(),
        matches: score.result.matches.clone(),
        unmatched_predictions: score.result.unmatched_predictions.clone(),
        unmatched_ground_truth: score.result.unmatched_ground_truth.clone(),
        precision: score.counts.precision(),
        recall: score.counts.recall(),
        f1: score.counts.f1(),
        mean_iou: score.result.mean_iou(),
        inference_time_ms: Some(score.inference_time_ms),
    }
}

/// Mean and standard deviation across fold rows, for the aggregate row.
fn spread_across(rows: &[ModelMetrics]) -> FoldSpread {
    let collect = |extract: fn(&ModelMetrics) -> f64| {
        let values: Vec<f64> = rows.iter().map(extract).collect();
        fold_spread(&values)
    };
    FoldSpread {
        precision: collect(|r| r.precision),
        recall: collect(|r| r.recall),
        f1: collect(|r| r.f1),
        map_50: collect(|r| r.map_50),
    }
}

/// Run-level aggregates over the per-model base rows.
fn run_aggregates(base_rows: &[ModelMetrics]) -> RunAggregates {
    let mut counts = ConfusionCounts::default();
    for row in base_rows {
        counts.add(row.counts);
    }

    #[allow(clippy::cast_precision_loss)]
    let n = base_rows.len().max(1) as f64;
    RunAggregates {
        precision: counts.precision(),
        recall: counts.recall(),
        f1: counts.f1(),
        map_50: base_rows.iter().map(|r| r.map_50).sum::<f64>() / n,
        map_50_95: base_rows.iter().map(|r| r.map_50_95).sum::<f64>() / n,
    }
}
