//! Progress bar for a running evaluation.

use crate::progress::ProgressSnapshot;
use indicatif::{ProgressBar, ProgressStyle};

/// Create a percentage progress bar for one evaluation run.
pub fn create_run_progress(enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    Some(pb)
}

/// Sync the bar with a polled snapshot.
pub fn render_snapshot(pb: Option<&ProgressBar>, snapshot: &ProgressSnapshot) {
    if let Some(pb) = pb {
        pb.set_position(u64::from(snapshot.progress_percentage()));
        pb.set_message(snapshot.current_step.clone());
    }
}

/// Finish a progress bar with a message.
pub fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}
