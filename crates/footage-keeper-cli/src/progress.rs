use footage_keeper_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars. One bar at a time:
/// analysis, sizing, then execution.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn start_bar(&self, label: &str, total: usize) {
        let style = ProgressStyle::with_template(&format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} ({{eta}} remaining)",
            label
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICKS);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn set_position(&self, done: usize) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_position(done as u64);
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_discover_complete(&self, folders: usize, rejected: usize) {
        eprintln!(
            "  \x1b[32m✓\x1b[0m Discovery complete: {} date folders, {} rejected",
            folders, rejected
        );
    }

    fn on_analysis_start(&self, pending: usize) {
        self.start_bar("Analysing", pending);
    }

    fn on_analysis_progress(&self, analyzed: usize, _pending: usize) {
        self.set_position(analyzed);
    }

    fn on_analysis_complete(&self, analyzed: usize, failed: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Analysis complete: {} videos, {} failures",
            analyzed, failed
        );
    }

    fn on_sizing_start(&self, folders: usize) {
        self.start_bar("Sizing", folders);
    }

    fn on_sizing_progress(&self, sized: usize, _folders: usize) {
        self.set_position(sized);
    }

    fn on_sizing_complete(&self, computed: usize, cached: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Sizing complete: {} computed, {} cached in {:.2}s",
            computed, cached, duration_secs
        );
    }

    fn on_execute_start(&self, candidates: usize) {
        self.start_bar("Removing", candidates);
    }

    fn on_execute_progress(&self, processed: usize, _candidates: usize) {
        self.set_position(processed);
    }

    fn on_execute_complete(&self, removed: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Execution complete: {} removed, {} failed in {:.2}s",
            removed, failed, duration_secs
        );
    }
}
