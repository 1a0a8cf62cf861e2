use crate::cache::{FolderSizeCache, SizeLookup, SizeSource};
use crate::config::RetentionConfig;
use crate::detection::{analyze_pending, ObjectDetector, ProcessingTracker};
use crate::error::Error;
use crate::model::{CameraFolder, MediaKinds};
use crate::progress::ProgressReporter;
use crate::report::RunReport;
use crate::retention::{
    classify, collect_media, plan_folder, prune_empty_parents, Budgets, Classification, DeletionExecutor,
    FolderPlan, RetentionPhase, SizedFolder,
};
use crate::scanner::{self, Discovery};
use chrono::Utc;
use dashmap::DashMap;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Folder sizes resolved for one run.
#[derive(Debug, Default)]
pub struct SizeMeasurement {
    pub sized: Vec<SizedFolder>,
    pub cached: usize,
    pub computed: usize,
    pub failures: Vec<(PathBuf, String)>,
}

/// Classification plus the per-folder plans derived from it. Never persisted.
#[derive(Debug)]
pub struct RetentionPlan {
    pub discovery: Discovery,
    pub measurement: SizeMeasurement,
    pub classification: Classification,
    pub folder_plans: Vec<FolderPlan>,
    pub scan_failures: Vec<(PathBuf, String)>,
}

impl RetentionPlan {
    pub fn candidate_count(&self) -> usize {
        self.folder_plans.iter().map(|p| p.candidates.len()).sum()
    }
}

/// Wires the components together for one scheduled invocation.
pub struct RetentionEngine {
    config: RetentionConfig,
    kinds: MediaKinds,
    cache: FolderSizeCache,
    tracker: ProcessingTracker,
    pool: ThreadPool,
}

impl RetentionEngine {
    pub fn new(config: RetentionConfig) -> Result<Self, Error> {
        let kinds = MediaKinds::from_config(&config);
        let cache = if config.dry_run {
            FolderSizeCache::read_only(&config.folder_size_filename)
        } else {
            FolderSizeCache::new(&config.folder_size_filename)
        };
        let tracker = ProcessingTracker::new(kinds.clone(), config.force_reevaluation);
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .build()
            .map_err(|e| Error::Other(format!("Cannot build worker pool: {}", e)))?;

        Ok(Self {
            config,
            kinds,
            cache,
            tracker,
            pool,
        })
    }

    fn budgets(&self) -> Budgets {
        Budgets {
            recent_bytes: self.config.recent_budget_bytes,
            historical_bytes: self.config.historical_budget_bytes,
        }
    }

    pub fn discover(&self) -> Result<Discovery, Error> {
        let discovery = scanner::discover_folders(&self.config.root_path, &self.config.ignore_patterns)?;
        info!(
            "Discovered {} date folders under {} ({} rejected)",
            discovery.folders.len(),
            self.config.root_path.display(),
            discovery.rejected.len()
        );
        Ok(discovery)
    }

    /// Videos that have no detection result yet, oldest folder first.
    pub fn pending_files(&self, folders: &[CameraFolder]) -> Vec<PathBuf> {
        let mut pending = Vec::new();
        for folder in folders {
            match self.tracker.pending_in_folder(&folder.path) {
                Ok(videos) => pending.extend(videos),
                Err(err) => warn!("Cannot list videos in {}: {}", folder.path.display(), err),
            }
        }
        pending
    }

    /// Resolve every folder size on the worker pool. Folders whose size
    /// cannot be read are left out of classification for this run, which only
    /// ever makes the run keep more.
    pub fn measure(&self, folders: &[CameraFolder], reporter: &dyn ProgressReporter) -> SizeMeasurement {
        let start = Instant::now();
        let total = folders.len();
        let lookups: DashMap<usize, SizeLookup> = DashMap::new();
        let failures: DashMap<PathBuf, String> = DashMap::new();
        let done = AtomicUsize::new(0);
        reporter.on_sizing_start(total);

        self.pool.install(|| {
            folders.par_iter().enumerate().for_each(|(idx, folder)| {
                match self.cache.get_size(&folder.path) {
                    Ok(lookup) => {
                        lookups.insert(idx, lookup);
                    }
                    Err(err) => {
                        warn!("Cannot size {}: {}", folder.path.display(), err);
                        failures.insert(folder.path.clone(), err.to_string());
                    }
                }
                reporter.on_sizing_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
            })
        });

        let mut measurement = SizeMeasurement::default();
        for (idx, folder) in folders.iter().enumerate() {
            if let Some((_, lookup)) = lookups.remove(&idx) {
                match lookup.source {
                    SizeSource::Cached => measurement.cached += 1,
                    SizeSource::Computed => measurement.computed += 1,
                }
                measurement.sized.push(SizedFolder {
                    folder: folder.clone(),
                    size_bytes: lookup.size_bytes,
                });
            }
        }
        measurement.failures = failures.into_iter().collect();
        measurement.failures.sort();

        reporter.on_sizing_complete(measurement.computed, measurement.cached, start.elapsed().as_secs_f64());
        debug!(
            "Sizes resolved in {:.2}s: {} from cache, {} computed",
            start.elapsed().as_secs_f64(),
            measurement.cached,
            measurement.computed
        );
        measurement
    }

    /// Plan every classified folder. Only historical and expired folders
    /// are listed on disk.
    pub fn plan_folders(&self, classification: &Classification) -> (Vec<FolderPlan>, Vec<(PathBuf, String)>) {
        let results: Vec<_> = self.pool.install(|| {
            classification
                .folders
                .par_iter()
                .map(|classified| -> Result<FolderPlan, (PathBuf, String)> {
                    let files = match classified.phase {
                        RetentionPhase::Recent => Vec::new(),
                        _ => collect_media(&classified.folder.path, &self.kinds).map_err(|err| {
                            warn!("Cannot list {}: {}", classified.folder.path.display(), err);
                            (classified.folder.path.clone(), err.to_string())
                        })?,
                    };
                    Ok(plan_folder(
                        &classified.folder,
                        classified.phase,
                        &files,
                        &self.config.target_labels,
                    ))
                })
                .collect()
        });

        let mut plans = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(plan) => plans.push(plan),
                Err(failure) => failures.push(failure),
            }
        }
        (plans, failures)
    }

    /// Discover, size, classify and plan. No media, record or folder is
    /// touched; size artifacts are refreshed unless this is a dry run.
    pub fn plan(&self, reporter: &dyn ProgressReporter) -> Result<RetentionPlan, Error> {
        let discovery = self.discover()?;
        reporter.on_discover_complete(discovery.folders.len(), discovery.rejected.len());
        self.plan_discovered(discovery, reporter)
    }

    fn plan_discovered(&self, discovery: Discovery, reporter: &dyn ProgressReporter) -> Result<RetentionPlan, Error> {
        if self.config.target_labels.is_empty() {
            warn!("No target labels configured: every analysed historical video will be pruned");
        }

        let measurement = self.measure(&discovery.folders, reporter);
        let classification = classify(measurement.sized.clone(), self.budgets());
        for phase in [RetentionPhase::Recent, RetentionPhase::Historical, RetentionPhase::Expired] {
            let totals = classification.totals(phase);
            info!("{}: {} folders, {} bytes", phase, totals.folders, totals.bytes);
        }

        let (folder_plans, scan_failures) = self.plan_folders(&classification);
        Ok(RetentionPlan {
            discovery,
            measurement,
            classification,
            folder_plans,
            scan_failures,
        })
    }

    /// The daily workflow: analyse new videos (when a detector is given),
    /// then size, classify, plan and apply.
    pub fn run(
        &self,
        reporter: &dyn ProgressReporter,
        detector: Option<&dyn ObjectDetector>,
    ) -> Result<RunReport, Error> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            "Starting retention run on {} (dry run: {}, force re-evaluation: {})",
            self.config.root_path.display(),
            self.config.dry_run,
            self.config.force_reevaluation
        );

        let discovery = self.discover()?;
        reporter.on_discover_complete(discovery.folders.len(), discovery.rejected.len());

        let (pending_analysis, analyzed, analysis_failures) = match detector {
            Some(detector) => {
                let summary = analyze_pending(
                    &self.tracker,
                    detector,
                    &self.config.detection_filename,
                    &discovery.folders,
                    reporter,
                );
                (summary.pending, summary.analyzed, summary.failed.len())
            }
            None => {
                let pending = self.pending_files(&discovery.folders).len();
                if pending > 0 {
                    info!("{} videos await analysis and are protected from pruning", pending);
                }
                (pending, 0, 0)
            }
        };

        let plan = self.plan_discovered(discovery, reporter)?;

        let exec_start = Instant::now();
        let executor = DeletionExecutor::new(&self.cache, self.config.dry_run);
        let execution = self
            .pool
            .install(|| executor.execute(&plan.folder_plans, reporter));
        let empty_parents_removed = if self.config.dry_run {
            0
        } else {
            prune_empty_parents(&self.config.root_path, &execution.folders_removed)
        };
        reporter.on_execute_complete(
            execution.removed_count(),
            execution.failed_count(),
            exec_start.elapsed().as_secs_f64(),
        );

        let mut sizing_failures = plan.measurement.failures.clone();
        sizing_failures.extend(plan.scan_failures.iter().cloned());

        let report = RunReport {
            started_at,
            duration: start.elapsed(),
            root: self.config.root_path.clone(),
            dry_run: self.config.dry_run,
            folders_discovered: plan.discovery.folders.len(),
            rejected_folders: plan.discovery.rejected.clone(),
            pending_analysis,
            analyzed,
            analysis_failures,
            sizes_cached: plan.measurement.cached,
            sizes_computed: plan.measurement.computed,
            sizing_failures,
            recent: plan.classification.totals(RetentionPhase::Recent),
            historical: plan.classification.totals(RetentionPhase::Historical),
            expired: plan.classification.totals(RetentionPhase::Expired),
            execution,
            empty_parents_removed,
            disk_capacity_bytes: self.config.disk_capacity_bytes,
            free_space_buffer_bytes: self.config.free_space_buffer_bytes,
            max_failure_ratio: self.config.max_failure_ratio,
        };

        if report.free_space_buffer_violated() {
            warn!(
                "Expected free space {:?} bytes is below the {} byte buffer",
                report.expected_free_bytes(),
                report.free_space_buffer_bytes
            );
        }
        info!(
            "Retention run finished in {:.2}s: {} bytes released, {} failures",
            report.duration.as_secs_f64(),
            report.bytes_released(),
            report.execution.failed_count()
        );
        Ok(report)
    }

    /// Remove every size cache artifact under the archive. In a dry run the
    /// artifacts are only counted.
    pub fn clear_cache(&self) -> Result<usize, Error> {
        let discovery = self.discover()?;
        let removed = self
            .cache
            .clear_all(discovery.folders.iter().map(|f| f.path.as_path()))?;
        if self.cache.is_read_only() {
            info!("Would remove {} size cache artifacts", removed);
        } else {
            info!("Removed {} size cache artifacts", removed);
        }
        Ok(removed)
    }
}
