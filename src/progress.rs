//! Progress indicators for the sacloud-converge CLI.

use std::time::Duration;

use colored::Colorize;
use converge::{PollObserver, ProgressCallback, ReconciliationResult};
use indicatif::{ProgressBar, ProgressStyle};
use sacloud::{ObservedStatus, ResourceRef};

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Spinner that follows the status waits of one reconciliation.
pub struct WaitSpinner {
    pb: ProgressBar,
}

impl WaitSpinner {
    pub fn new(visible: bool) -> Self {
        let pb = if visible {
            let pb = ProgressBar::new_spinner();
            pb.set_style(spinner_style());
            pb
        } else {
            ProgressBar::hidden()
        };
        Self { pb }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl PollObserver for WaitSpinner {
    fn on_observation(
        &self,
        resource: &ResourceRef,
        attempt: u32,
        observed: ObservedStatus,
        expected: ObservedStatus,
    ) {
        if attempt == 1 {
            self.pb.enable_steady_tick(Duration::from_millis(120));
        }
        self.pb.set_message(format!(
            "waiting for {resource} to become {expected} (now {observed}, check {attempt})"
        ));
    }
}

/// Progress bar over a batch of resources.
pub struct BatchProgress {
    pb: ProgressBar,
}

impl BatchProgress {
    pub fn new(visible: bool) -> Self {
        let pb = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(bar_style());
        Self { pb }
    }
}

impl ProgressCallback for BatchProgress {
    fn on_batch_start(&mut self, count: usize) {
        self.pb.set_length(count as u64);
        self.pb.enable_steady_tick(Duration::from_millis(120));
    }

    fn on_resource_start(&mut self, _resource: &ResourceRef, description: &str) {
        self.pb.set_message(description.to_string());
    }

    fn on_resource_complete(&mut self, resource: &ResourceRef, result: &ReconciliationResult) {
        let symbol = match (result.is_success(), result.changed) {
            (false, _) => "✗".red(),
            (true, true) => "✓".green(),
            (true, false) => "○".dimmed(),
        };
        self.pb.set_message(format!("{symbol} {resource}"));
        self.pb.inc(1);
    }

    fn on_batch_complete(&mut self) {
        self.pb.finish_and_clear();
    }
}
