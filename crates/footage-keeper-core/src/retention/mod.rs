pub mod classifier;
pub mod executor;
pub mod planner;

pub use classifier::{classify, Budgets, Classification, ClassifiedFolder, PhaseTotals, RetentionPhase, SizedFolder};
pub use executor::{prune_empty_parents, DeletionExecutor, ExecutionReport, RemovalOutcome, RemovalStatus};
pub use planner::{collect_media, plan_folder, FolderAction, FolderPlan, RemovalCandidate, RemovalReason};
