/// Trait for reporting run progress.
///
/// The CLI implements it with indicatif; tests use `SilentReporter`.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_discover_complete(&self, _folders: usize, _rejected: usize) {}
    fn on_analysis_start(&self, _pending: usize) {}
    fn on_analysis_progress(&self, _analyzed: usize, _pending: usize) {}
    fn on_analysis_complete(&self, _analyzed: usize, _failed: usize) {}
    fn on_sizing_start(&self, _folders: usize) {}
    fn on_sizing_progress(&self, _sized: usize, _folders: usize) {}
    fn on_sizing_complete(&self, _computed: usize, _cached: usize, _duration_secs: f64) {}
    fn on_execute_start(&self, _candidates: usize) {}
    fn on_execute_progress(&self, _processed: usize, _candidates: usize) {}
    fn on_execute_complete(&self, _removed: usize, _failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
