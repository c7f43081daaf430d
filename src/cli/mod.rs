//! CLI argument parsing and progress display.

mod args;
pub mod progress;

pub use args::{Cli, Command, ConfigAction, EvalArgs};
