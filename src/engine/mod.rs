//! The evaluation engine: requests, model registry and run orchestration.

mod orchestrator;
mod registry;
mod request;

pub use orchestrator::{CancellationToken, EvaluationEngine, RunHandle};
pub use registry::ModelRegistry;
pub use request::EvaluationRequest;
