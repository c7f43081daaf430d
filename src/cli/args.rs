//! CLI argument definitions.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Object-detection evaluation for conservation monitoring datasets.
#[derive(Debug, Parser)]
#[command(name = "wildeval")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Dataset directory (containing `groundtruth/` and `predictions/`).
    pub dataset: Option<PathBuf>,

    /// Common options for evaluation.
    #[command(flatten)]
    pub eval: EvalArgs,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Arguments for an evaluation run.
#[derive(Debug, Args)]
pub struct EvalArgs {
    /// Run name (default: dataset directory name).
    #[arg(short, long, env = "WILDEVAL_NAME")]
    pub name: Option<String>,

    /// Models to evaluate, by prediction directory name (comma-separated;
    /// default: every directory under `predictions/`).
    #[arg(short, long, value_delimiter = ',', env = "WILDEVAL_MODELS")]
    pub models: Option<Vec<String>>,

    /// IoU threshold for matching (0.0-1.0).
    #[arg(long, value_parser = parse_unit_interval, env = "WILDEVAL_IOU")]
    pub iou: Option<f64>,

    /// Minimum confidence threshold (0.0-1.0).
    #[arg(short = 'c', long, value_parser = parse_unit_interval, env = "WILDEVAL_MIN_CONFIDENCE")]
    pub confidence: Option<f64>,

    /// Number of folds for cross-validated metrics (1 = no fold split).
    #[arg(short = 'k', long, value_parser = clap::value_parser!(u64).range(1..=100))]
    pub folds: Option<u64>,

    /// Significance level for pairwise model comparisons.
    #[arg(long, value_parser = parse_alpha, env = "WILDEVAL_ALPHA")]
    pub alpha: Option<f64>,

    /// Species filter (comma-separated class names; default: all).
    #[arg(short, long, value_delimiter = ',')]
    pub species: Option<Vec<String>>,

    /// Earliest capture date to include (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Latest capture date to include (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// Output directory (default: the dataset directory).
    #[arg(short, long, env = "WILDEVAL_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Also write the metrics table as CSV.
    #[arg(long)]
    pub csv: bool,

    /// Suppress the progress bar.
    #[arg(long)]
    pub no_progress: bool,

    /// Suppress non-warning log output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse and validate a value in [0, 1].
fn parse_unit_interval(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!("value must be between 0.0 and 1.0, got {value}"));
    }

    Ok(value)
}

/// Parse and validate a significance level in (0, 1).
fn parse_alpha(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value <= 0.0 || value >= 1.0 {
        return Err(format!(
            "alpha must be strictly between 0.0 and 1.0, got {value}"
        ));
    }

    Ok(value)
}

/// Parse a YYYY-MM-DD date.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("'{s}' is not a YYYY-MM-DD date"))
}
