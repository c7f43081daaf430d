//! Wildeval - object-detection evaluation for conservation monitoring.
//!
//! This crate scores detector predictions against verified ground-truth
//! annotations: IoU matching, precision/recall/F1, AP/mAP, deterministic
//! k-fold splits and pairwise statistical model comparisons.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod folds;
pub mod geometry;
pub mod matching;
pub mod metrics;
pub mod progress;
pub mod stats;
pub mod store;

use chrono::NaiveDate;
use clap::Parser;
use cli::{Cli, Command, EvalArgs};
use config::{Config, config_file_path, load_default_config, save_default_config};
use constants::{PROGRESS_POLL_INTERVAL_MS, dataset, output_files};
use engine::{EvaluationEngine, EvaluationRequest, ModelRegistry};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use store::{
    DateRange, EvaluationStore, FileDetector, JsonStore, RunDocument, RunStatus, YoloGroundTruth,
    export_metrics_csv,
};
use tracing::{info, warn};

pub use error::{Error, Result};

/// Main entry point for the wildeval CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.eval.verbose, cli.eval.quiet);

    let config = load_default_config()?;

    if let Some(command) = cli.command {
        return handle_command(command);
    }

    let Some(dataset_dir) = cli.dataset else {
        return Err(Error::InvalidRequest {
            message: "no dataset directory given (see --help)".to_string(),
        });
    };

    evaluate_dataset(&dataset_dir, &cli.eval, &config)
}

/// Run one evaluation over a dataset directory and report the results.
fn evaluate_dataset(dataset_dir: &Path, args: &EvalArgs, config: &Config) -> Result<()> {
    let ground_truth_dir = dataset_dir.join(dataset::GROUND_TRUTH_DIR);
    let predictions_dir = dataset_dir.join(dataset::PREDICTIONS_DIR);

    let ground_truth = Arc::new(YoloGroundTruth::open(&ground_truth_dir)?);

    let models = match &args.models {
        Some(models) => models.clone(),
        None => discover_models(&predictions_dir)?,
    };
    if models.is_empty() {
        return Err(Error::InvalidRequest {
            message: format!(
                "no prediction directories found under '{}'",
                predictions_dir.display()
            ),
        });
    }

    let registry = Arc::new(ModelRegistry::new());
    for model in &models {
        let dir = predictions_dir.join(model);
        registry.register(Arc::new(FileDetector::new(model, &dir)));
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.output.dir.clone())
        .unwrap_or_else(|| dataset_dir.to_path_buf());
    let json_store = Arc::new(JsonStore::new(&output_dir)?);
    let store: Arc<dyn EvaluationStore> = Arc::clone(&json_store) as Arc<dyn EvaluationStore>;

    let engine = EvaluationEngine::new(registry, ground_truth, store);

    let name = args.name.clone().unwrap_or_else(|| {
        dataset_dir
            .file_name()
            .map_or_else(|| "evaluation".to_string(), |n| n.to_string_lossy().into_owned())
    });

    #[allow(clippy::cast_possible_truncation)]
    let request = EvaluationRequest {
        id: None,
        name,
        iou_threshold: args.iou.unwrap_or(config.defaults.iou_threshold),
        confidence_threshold: args.confidence.unwrap_or(config.defaults.confidence_threshold),
        models,
        species_filter: args
            .species
            .clone()
            .unwrap_or_else(|| config.defaults.species.clone()),
        date_range: date_range_from(args.from, args.to),
        folds: args.folds.map_or(config.defaults.folds, |k| k as usize),
        alpha: args.alpha.unwrap_or(config.defaults.alpha),
    };

    info!(
        "Evaluating {} model(s) against '{}'",
        request.models.len(),
        dataset_dir.display()
    );

    let handle = engine.start_evaluation(request)?;
    let run_id = handle.run_id.clone();

    // Ctrl+C requests cooperative cancellation; the worker stops at the
    // next image boundary and marks the run FAILED.
    let token = handle.cancellation_token();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    let bar = cli::progress::create_run_progress(!args.quiet && !args.no_progress);
    while !handle.is_finished() {
        if let Some(snapshot) = engine.get_progress(&run_id) {
            cli::progress::render_snapshot(bar.as_ref(), &snapshot);
        }
        std::thread::sleep(Duration::from_millis(PROGRESS_POLL_INTERVAL_MS));
    }
    handle.wait()?;

    let document = engine.run_document(&run_id)?;
    if document.run.status != RunStatus::Completed {
        cli::progress::finish_progress(bar, "Failed");
        return Err(Error::Internal {
            message: document
                .run
                .error_message
                .unwrap_or_else(|| "evaluation failed".to_string()),
        });
    }
    cli::progress::finish_progress(bar, "Complete");

    print_summary(&document);

    if args.csv || config.output.csv {
        let csv_path = output_dir.join(format!("{run_id}{}", output_files::METRICS_CSV_SUFFIX));
        export_metrics_csv(&document, &csv_path)?;
        info!("Metrics CSV written to {}", csv_path.display());
    }
    info!(
        "Run document written to {}",
        json_store.document_path(&run_id).display()
    );

    Ok(())
}

/// Model names are the subdirectories of `predictions/`, sorted.
fn discover_models(predictions_dir: &Path) -> Result<Vec<String>> {
    let mut models = Vec::new();
    for entry in std::fs::read_dir(predictions_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            models.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    models.sort();
    Ok(models)
}

/// Inclusive date window: `--from` starts at midnight, `--to` ends at
/// 23:59:59 of the given day.
fn date_range_from(from: Option<NaiveDate>, to: Option<NaiveDate>) -> DateRange {
    DateRange {
        from: from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc()),
        to: to
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|dt| dt.and_utc()),
    }
}

/// Print the per-model metrics table and model comparisons.
fn print_summary(document: &RunDocument) {
    println!();
    println!(
        "Run '{}': {} image(s) evaluated in {:.2}s",
        document.run.id,
        document.run.total_images_evaluated,
        document.run.processing_duration_secs.unwrap_or(0.0)
    );
    println!();
    println!(
        "{:<30} {:>7} {:>9} {:>7} {:>7} {:>8} {:>11}",
        "model", "images", "precision", "recall", "f1", "mAP@.5", "mAP@.5:.95"
    );

    for row in &document.model_metrics {
        println!(
            "{:<30} {:>7} {:>9.4} {:>7.4} {:>7.4} {:>8.4} {:>11.4}",
            row.label,
            row.images_processed,
            row.precision,
            row.recall,
            row.f1,
            row.map_50,
            row.map_50_95
        );
        if let Some(spread) = &row.fold_spread {
            println!(
                "{:<30} {:>7} f1 {:.4} ± {:.4}, mAP@.5 {:.4} ± {:.4}",
                "", "", spread.f1.0, spread.f1.1, spread.map_50.0, spread.map_50.1
            );
        }
    }

    if !document.comparisons.is_empty() {
        println!();
        println!("Model comparisons (per-fold {}):", document.comparisons[0].metric);
        for comparison in &document.comparisons {
            println!(
                "  {} vs {}: t = {:.4}, p = {:.4}, effect size = {:.2} ({})",
                comparison.model_a,
                comparison.model_b,
                comparison.result.t_statistic,
                comparison.result.p_value,
                comparison.result.effect_size,
                if comparison.result.significant {
                    "significant"
                } else {
                    "not significant"
                }
            );
        }
    }
    println!();
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter_str = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    fmt().with_env_filter(filter).init();
}

fn handle_command(command: Command) -> Result<()> {
    match command {
        Command::Config { action } => handle_config_command(action),
    }
}

fn handle_config_command(action: cli::ConfigAction) -> Result<()> {
    use cli::ConfigAction;

    match action {
        ConfigAction::Init => {
            let path = config_file_path()?;
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                let config = Config::default();
                let saved_path = save_default_config(&config)?;
                println!("Created configuration file: {}", saved_path.display());
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_default_config()?;
            println!("{config:#?}");
            Ok(())
        }
        ConfigAction::Path => {
            let path = config_file_path()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}
