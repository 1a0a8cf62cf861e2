pub mod detector;
pub mod record;
pub mod tracker;

pub use detector::{analyze_pending, AnalysisSummary, CommandDetector, ObjectDetector};
pub use record::DetectionRecord;
pub use tracker::ProcessingTracker;
