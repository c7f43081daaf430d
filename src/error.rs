//! Error types for wildeval.

/// Result type alias for wildeval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for wildeval.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// An evaluation request parameter is invalid.
    ///
    /// Rejected synchronously, before any run record is created.
    #[error("invalid evaluation request: {message}")]
    InvalidRequest {
        /// Description of the validation failure.
        message: String,
    },

    /// A bounding box has invalid coordinates.
    #[error("invalid bounding box: {message}")]
    InvalidBoundingBox {
        /// Description of the coordinate problem.
        message: String,
    },

    /// A confidence value is outside [0, 1].
    #[error("invalid confidence {value} (must be 0.0 to 1.0)")]
    InvalidConfidence {
        /// The offending value.
        value: f64,
    },

    /// No evaluable images were found for the run.
    #[error("no evaluable images: {message}")]
    NoEvaluableImages {
        /// Guidance for the caller.
        message: String,
    },

    /// A requested model could not be loaded.
    ///
    /// Aborts the whole run, unlike per-image detector failures.
    #[error("failed to load model '{model}': {reason}")]
    ModelLoad {
        /// Name of the model.
        model: String,
        /// Description of the load failure.
        reason: String,
    },

    /// The detector failed for a single image.
    ///
    /// Caught at the image-iteration boundary; the image is excluded from
    /// every aggregate and the run continues.
    #[error("detector failed on '{image}': {reason}")]
    Detection {
        /// Image identifier.
        image: String,
        /// Description of the failure.
        reason: String,
    },

    /// A ground-truth annotation could not be parsed.
    #[error("failed to parse annotation '{path}': {message}")]
    AnnotationParse {
        /// Path to the annotation file.
        path: std::path::PathBuf,
        /// Description of the parse failure.
        message: String,
    },

    /// Failed to parse a prediction file.
    #[error("failed to parse prediction file '{path}'")]
    PredictionParse {
        /// Path to the prediction file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An evaluation run id was not found.
    #[error("evaluation run '{run_id}' not found")]
    RunNotFound {
        /// The missing run id.
        run_id: String,
    },

    /// An evaluation is already active or finished for this run id.
    ///
    /// At most one execution per run id; a terminal run is never restarted.
    #[error("evaluation run '{run_id}' is already {state}")]
    RunAlreadyStarted {
        /// The run id.
        run_id: String,
        /// Current state of the existing run.
        state: String,
    },

    /// The run was cancelled cooperatively at an image boundary.
    #[error("evaluation run '{run_id}' was cancelled")]
    Cancelled {
        /// The cancelled run id.
        run_id: String,
    },

    /// Failed to write a run document to the store.
    #[error("failed to write run document '{path}'")]
    StoreWrite {
        /// Path to the run document.
        path: std::path::PathBuf,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to read a run document from the store.
    #[error("failed to read run document '{path}'")]
    StoreRead {
        /// Path to the run document.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to write the metrics CSV export.
    #[error("failed to write metrics CSV '{path}'")]
    CsvWrite {
        /// Path to the CSV file.
        path: std::path::PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// Not enough samples for a statistical operation.
    #[error("not enough samples for {operation}: need at least {needed}, got {got}")]
    InsufficientSamples {
        /// The statistical operation.
        operation: &'static str,
        /// Minimum number of samples required.
        needed: usize,
        /// Number of samples provided.
        got: usize,
    },

    /// The worker thread for a run panicked or was lost.
    #[error("evaluation worker for run '{run_id}' terminated abnormally")]
    WorkerLost {
        /// The run id.
        run_id: String,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}
