//! Thread-safe, pollable progress state for evaluation runs.
//!
//! One writer (the run's worker thread) updates the entry for its run id;
//! any number of readers poll. All access goes through one mutex and reads
//! return an owned snapshot, so a concurrent update can never produce a
//! torn read.

use crate::store::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Immutable snapshot of one run's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Current run status.
    pub status: RunStatus,
    /// Human-readable label of the current step.
    pub current_step: String,
    /// Steps completed so far.
    pub completed_steps: usize,
    /// Total steps planned for the run.
    pub total_steps: usize,
    /// Error message, set only after `fail`.
    pub error_message: Option<String>,
    // Highest percentage reported before the last total revision; keeps
    // the percentage monotone when the planned total grows.
    #[serde(default)]
    percentage_floor: u8,
}

impl ProgressSnapshot {
    /// Progress percentage: `min(100, floor(completed / total * 100))`,
    /// never below any percentage reported earlier in the run.
    pub fn progress_percentage(&self) -> u8 {
        self.raw_percentage().max(self.percentage_floor)
    }

    fn raw_percentage(&self) -> u8 {
        if self.total_steps == 0 {
            return 0;
        }
        let pct = self.completed_steps * 100 / self.total_steps;
        #[allow(clippy::cast_possible_truncation)]
        let pct = pct.min(100) as u8;
        pct
    }

    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Tracker for all runs in this process, keyed by run id.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    runs: Mutex<HashMap<String, ProgressSnapshot>>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run entering the PROCESSING state with a known step count.
    pub fn start(&self, run_id: &str, total_steps: usize) {
        let mut runs = lock_or_recover(&self.runs);
        runs.insert(
            run_id.to_string(),
            ProgressSnapshot {
                status: RunStatus::Processing,
                current_step: "initialize".to_string(),
                completed_steps: 0,
                total_steps,
                error_message: None,
                percentage_floor: 0,
            },
        );
    }

    /// Revise the planned step count once the workload is known.
    ///
    /// The percentage already reported becomes a floor, so a larger total
    /// never moves the reported progress backwards.
    pub fn set_total(&self, run_id: &str, total_steps: usize) {
        let mut runs = lock_or_recover(&self.runs);
        if let Some(entry) = runs.get_mut(run_id) {
            entry.percentage_floor = entry.progress_percentage();
            entry.total_steps = total_steps;
        }
    }

    /// Record a completed step and set the new step label.
    pub fn update(&self, run_id: &str, step_name: &str) {
        let mut runs = lock_or_recover(&self.runs);
        if let Some(entry) = runs.get_mut(run_id) {
            entry.completed_steps += 1;
            entry.current_step = step_name.to_string();
        }
    }

    /// Mark the run COMPLETED; progress saturates at 100%.
    pub fn complete(&self, run_id: &str) {
        let mut runs = lock_or_recover(&self.runs);
        if let Some(entry) = runs.get_mut(run_id) {
            entry.status = RunStatus::Completed;
            entry.completed_steps = entry.total_steps;
            entry.current_step = "complete".to_string();
        }
    }

    /// Mark the run FAILED with a captured message.
    pub fn fail(&self, run_id: &str, message: &str) {
        let mut runs = lock_or_recover(&self.runs);
        if let Some(entry) = runs.get_mut(run_id) {
            entry.status = RunStatus::Failed;
            entry.current_step = "failed".to_string();
            entry.error_message = Some(message.to_string());
        }
    }

    /// Snapshot of one run's progress, if the run is known.
    pub fn snapshot(&self, run_id: &str) -> Option<ProgressSnapshot> {
        lock_or_recover(&self.runs).get(run_id).cloned()
    }
}

/// A poisoned mutex here means a worker panicked mid-update; the snapshot
/// data is plain values, so recovering the guard is safe and keeps pollers
/// alive to observe the failure.
fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
