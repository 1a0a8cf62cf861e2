pub mod cache;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod model;
pub mod progress;
pub mod report;
pub mod retention;
pub mod retry;
pub mod scanner;

pub use config::{load_configuration, RetentionConfig};
pub use detection::{CommandDetector, ObjectDetector};
pub use engine::{RetentionEngine, RetentionPlan, SizeMeasurement};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
pub use report::RunReport;
pub use retention::{FolderAction, RetentionPhase};
