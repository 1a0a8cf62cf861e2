use super::planner::{FolderAction, FolderPlan, RemovalCandidate};
use crate::cache::FolderSizeCache;
use crate::model::DatePath;
use crate::progress::ProgressReporter;
use crate::retry::retry_once;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RemovalStatus {
    Removed,
    WouldDelete,
    /// Vanished between planning and removal. Counts as done.
    AlreadyGone,
    Failed(String),
}

impl RemovalStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RemovalStatus::Removed => "removed",
            RemovalStatus::WouldDelete => "would delete",
            RemovalStatus::AlreadyGone => "already gone",
            RemovalStatus::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemovalOutcome {
    pub folder: DatePath,
    pub candidate: RemovalCandidate,
    pub status: RemovalStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub dry_run: bool,
    pub outcomes: Vec<RemovalOutcome>,
    /// Expired folders whose directory tree is gone.
    pub folders_removed: Vec<PathBuf>,
    /// Expired folders kept because one of their files could not be removed.
    /// That file is already counted as failed.
    pub folders_kept: Vec<PathBuf>,
    /// Expired folders whose tree removal itself failed.
    pub folder_failures: Vec<(PathBuf, String)>,
    pub folders_attempted: usize,
}

impl ExecutionReport {
    fn count(&self, pred: impl Fn(&RemovalStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn removed_count(&self) -> usize {
        self.count(|s| matches!(s, RemovalStatus::Removed))
    }

    pub fn would_delete_count(&self) -> usize {
        self.count(|s| matches!(s, RemovalStatus::WouldDelete))
    }

    pub fn already_gone_count(&self) -> usize {
        self.count(|s| matches!(s, RemovalStatus::AlreadyGone))
    }

    /// Failed file removals plus folders that could not be removed.
    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, RemovalStatus::Failed(_))) + self.folder_failures.len()
    }

    /// Physical removals tried, files and expired folder trees.
    pub fn attempted_count(&self) -> usize {
        self.count(|s| !matches!(s, RemovalStatus::WouldDelete)) + self.folders_attempted
    }

    pub fn bytes_freed(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.status == RemovalStatus::Removed)
            .map(|o| o.candidate.size_bytes)
            .sum()
    }

    pub fn bytes_would_free(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.status == RemovalStatus::WouldDelete)
            .map(|o| o.candidate.size_bytes)
            .sum()
    }
}

#[derive(Default)]
struct FolderExecution {
    outcomes: Vec<RemovalOutcome>,
    folder_removed: Option<PathBuf>,
    folder_kept: Option<PathBuf>,
    folder_failure: Option<(PathBuf, String)>,
    folder_attempted: bool,
}

/// The only component that deletes anything. Folders run in parallel on the
/// current rayon pool; candidates of one folder run in order on one thread,
/// so a folder's cache artifact is never raced.
pub struct DeletionExecutor<'a> {
    cache: &'a FolderSizeCache,
    dry_run: bool,
}

impl<'a> DeletionExecutor<'a> {
    pub fn new(cache: &'a FolderSizeCache, dry_run: bool) -> Self {
        Self { cache, dry_run }
    }

    pub fn execute(&self, plans: &[FolderPlan], reporter: &dyn ProgressReporter) -> ExecutionReport {
        let total: usize = plans.iter().map(|p| p.candidates.len()).sum();
        let processed = AtomicUsize::new(0);
        reporter.on_execute_start(total);

        let executions: Vec<FolderExecution> = plans
            .par_iter()
            .filter(|plan| plan.action != FolderAction::KeepAll)
            .map(|plan| self.execute_folder(plan, &processed, total, reporter))
            .collect();

        let mut report = ExecutionReport {
            dry_run: self.dry_run,
            ..Default::default()
        };
        for execution in executions {
            report.outcomes.extend(execution.outcomes);
            report.folders_removed.extend(execution.folder_removed);
            report.folders_kept.extend(execution.folder_kept);
            report.folder_failures.extend(execution.folder_failure);
            if execution.folder_attempted {
                report.folders_attempted += 1;
            }
        }
        report
    }

    fn execute_folder(
        &self,
        plan: &FolderPlan,
        processed: &AtomicUsize,
        total: usize,
        reporter: &dyn ProgressReporter,
    ) -> FolderExecution {
        let mut execution = FolderExecution::default();
        let mut mutated = false;
        let mut failed = false;

        for candidate in &plan.candidates {
            let status = self.remove_candidate(candidate);
            match status {
                RemovalStatus::Removed | RemovalStatus::AlreadyGone => mutated = true,
                RemovalStatus::Failed(_) => failed = true,
                RemovalStatus::WouldDelete => {}
            }
            execution.outcomes.push(RemovalOutcome {
                folder: plan.folder.date_path.clone(),
                candidate: candidate.clone(),
                status,
            });
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_execute_progress(done, total);
        }

        if self.dry_run {
            if plan.action == FolderAction::DeleteAll {
                info!(
                    folder = %plan.folder.path.display(),
                    phase = %plan.phase,
                    "would delete folder"
                );
            }
            return execution;
        }

        if mutated {
            if let Err(err) = self.cache.invalidate(&plan.folder.path) {
                warn!(
                    "Cannot invalidate size cache of {}: {}",
                    plan.folder.path.display(),
                    err
                );
            }
        }

        if plan.action == FolderAction::DeleteAll {
            if failed {
                warn!(
                    "Keeping folder {}: files left behind after failed removals",
                    plan.folder.path.display()
                );
                execution.folder_kept = Some(plan.folder.path.clone());
            } else {
                execution.folder_attempted = true;
                match remove_folder_tree(&plan.folder.path) {
                    Ok(()) => {
                        info!(
                            folder = %plan.folder.path.display(),
                            phase = %plan.phase,
                            "removed folder"
                        );
                        execution.folder_removed = Some(plan.folder.path.clone());
                    }
                    Err(err) => {
                        error!("Cannot remove folder {}: {}", plan.folder.path.display(), err);
                        execution.folder_failure = Some((plan.folder.path.clone(), err.to_string()));
                    }
                }
            }
        }

        execution
    }

    fn remove_candidate(&self, candidate: &RemovalCandidate) -> RemovalStatus {
        if self.dry_run {
            info!(
                path = %candidate.path.display(),
                reason = %candidate.reason,
                phase = %candidate.phase,
                "would delete"
            );
            return RemovalStatus::WouldDelete;
        }

        match retry_once("file removal", || fs::remove_file(&candidate.path)) {
            Ok(()) => {
                info!(
                    path = %candidate.path.display(),
                    reason = %candidate.reason,
                    phase = %candidate.phase,
                    bytes = candidate.size_bytes,
                    "removed"
                );
                RemovalStatus::Removed
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} already gone", candidate.path.display());
                RemovalStatus::AlreadyGone
            }
            Err(err) => {
                error!(
                    path = %candidate.path.display(),
                    reason = %candidate.reason,
                    phase = %candidate.phase,
                    "failed to remove: {}",
                    err
                );
                RemovalStatus::Failed(err.to_string())
            }
        }
    }
}

/// Remove the (by now file-less) directory tree of an expired folder,
/// deepest directories first. Fails if anything is still inside.
fn remove_folder_tree(folder: &Path) -> io::Result<()> {
    if !folder.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(folder).contents_first(true) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("unexpected entry {} in expired folder", entry.path().display()),
            ));
        }
        match retry_once("directory removal", || fs::remove_dir(entry.path())) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// After expired day folders are gone, drop their month and year directories
/// when those became empty. Never climbs to or above `root`.
pub fn prune_empty_parents(root: &Path, removed_folders: &[PathBuf]) -> usize {
    let mut removed = 0;
    let mut candidates: Vec<PathBuf> = removed_folders
        .iter()
        .flat_map(|folder| folder.ancestors().skip(1).take(2).map(Path::to_path_buf))
        .filter(|dir| dir.starts_with(root) && dir.as_path() != root)
        .collect();
    // Months before years: deeper paths first.
    candidates.sort_by(|a, b| b.components().count().cmp(&a.components().count()).then(a.cmp(b)));
    candidates.dedup();

    for dir in candidates {
        let is_empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty && fs::remove_dir(&dir).is_ok() {
            debug!("Removed empty directory {}", dir.display());
            removed += 1;
        }
    }
    removed
}
