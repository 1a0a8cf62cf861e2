use crate::error::Error;
use crate::retention::{Classification, ExecutionReport, FolderPlan, PhaseTotals, RemovalStatus};
use chrono::{DateTime, Utc};
use indicatif::{HumanBytes, HumanCount, HumanDuration};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Everything a run did or would have done.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub root: PathBuf,
    pub dry_run: bool,
    pub folders_discovered: usize,
    pub rejected_folders: Vec<PathBuf>,
    pub pending_analysis: usize,
    pub analyzed: usize,
    pub analysis_failures: usize,
    pub sizes_cached: usize,
    pub sizes_computed: usize,
    pub sizing_failures: Vec<(PathBuf, String)>,
    pub recent: PhaseTotals,
    pub historical: PhaseTotals,
    pub expired: PhaseTotals,
    pub execution: ExecutionReport,
    pub empty_parents_removed: usize,
    pub disk_capacity_bytes: Option<u64>,
    pub free_space_buffer_bytes: u64,
    pub max_failure_ratio: f64,
}

#[derive(Debug, Clone)]
pub enum StatValue {
    Count(usize),
    Bytes(u64),
    Duration(Duration),
    Time(DateTime<Utc>),
    Text(String),
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StatValue::Count(count) => write!(f, "{}", HumanCount(*count as u64)),
            StatValue::Bytes(bytes) => write!(f, "{}", HumanBytes(*bytes)),
            StatValue::Duration(duration) => write!(f, "{}", HumanDuration(*duration)),
            StatValue::Time(time) => write!(f, "{}", time.format("%Y-%m-%d %H:%M:%S")),
            StatValue::Text(text) => write!(f, "{}", text),
        }
    }
}

impl StatValue {
    fn raw(&self) -> String {
        match self {
            StatValue::Count(count) => count.to_string(),
            StatValue::Bytes(bytes) => bytes.to_string(),
            StatValue::Duration(duration) => format!("{:.3}", duration.as_secs_f64()),
            StatValue::Time(time) => time.to_rfc3339(),
            StatValue::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct ReportItem {
    #[tabled(skip)]
    pub name: String,
    #[tabled(rename = "Stat")]
    pub human_name: String,
    #[tabled(rename = "Value")]
    pub human_value: String,
    #[tabled(skip)]
    pub raw_value: String,
}

impl ReportItem {
    fn new(name: &str, value: StatValue) -> Self {
        let human_name = name
            .split('_')
            .map(|s| {
                let mut chars = s.chars();
                match chars.next() {
                    None => String::new(),
                    Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ");

        Self {
            name: name.to_string(),
            human_name,
            human_value: value.to_string(),
            raw_value: value.raw(),
        }
    }
}

/// One line of the per-folder table printed by `sizes` and `plan`.
#[derive(Debug, Clone, Tabled)]
pub struct FolderRow {
    #[tabled(rename = "Folder")]
    pub date_path: String,
    #[tabled(rename = "Phase")]
    pub phase: String,
    #[tabled(rename = "Size")]
    pub size: String,
    #[tabled(rename = "Candidates")]
    pub candidates: usize,
    #[tabled(rename = "Candidate Bytes")]
    pub candidate_bytes: String,
}

/// Newest folder first, with the plan's candidate counts when available.
pub fn folder_rows(classification: &Classification, plans: &[FolderPlan]) -> Vec<FolderRow> {
    classification
        .folders
        .iter()
        .map(|classified| {
            let plan = plans
                .iter()
                .find(|p| p.folder.date_path == classified.folder.date_path);
            let (candidates, candidate_bytes) = plan
                .map(|p| (p.candidates.len(), p.candidates.iter().map(|c| c.size_bytes).sum()))
                .unwrap_or((0, 0u64));
            FolderRow {
                date_path: classified.folder.date_path.to_string(),
                phase: classified.phase.to_string(),
                size: HumanBytes(classified.size_bytes).to_string(),
                candidates,
                candidate_bytes: HumanBytes(candidate_bytes).to_string(),
            }
        })
        .collect()
}

pub fn folder_table(rows: Vec<FolderRow>) -> String {
    Table::new(rows).with(Style::psql()).to_string()
}

impl RunReport {
    /// Bytes the archive occupied before this run, per the size cache.
    pub fn archive_bytes_before(&self) -> u64 {
        self.recent.bytes + self.historical.bytes + self.expired.bytes
    }

    /// Bytes freed, or that would be freed in a dry run.
    pub fn bytes_released(&self) -> u64 {
        if self.dry_run {
            self.execution.bytes_would_free()
        } else {
            self.execution.bytes_freed()
        }
    }

    pub fn expected_archive_bytes(&self) -> u64 {
        self.archive_bytes_before().saturating_sub(self.bytes_released())
    }

    /// Free space left on a disk of the configured capacity once the run's
    /// removals are applied. Only meaningful when the archive owns the disk.
    pub fn expected_free_bytes(&self) -> Option<u64> {
        self.disk_capacity_bytes
            .map(|capacity| capacity.saturating_sub(self.expected_archive_bytes()))
    }

    pub fn free_space_buffer_violated(&self) -> bool {
        self.expected_free_bytes()
            .map(|free| free < self.free_space_buffer_bytes)
            .unwrap_or(false)
    }

    /// True when removals failed more often than the configured ratio allows,
    /// e.g. the archive went away mid-run.
    pub fn exceeds_failure_threshold(&self) -> bool {
        let failed = self.execution.failed_count();
        let attempted = self.execution.attempted_count();
        failed > 0 && attempted > 0 && (failed as f64 / attempted as f64) > self.max_failure_ratio
    }

    pub fn to_items(&self) -> Vec<ReportItem> {
        let mut items = vec![
            ReportItem::new("run_start_time", StatValue::Time(self.started_at)),
            ReportItem::new("run_duration", StatValue::Duration(self.duration)),
            ReportItem::new("archive_root", StatValue::Text(self.root.display().to_string())),
            ReportItem::new("dry_run", StatValue::Text(self.dry_run.to_string())),
            ReportItem::new("folders_discovered", StatValue::Count(self.folders_discovered)),
            ReportItem::new("folders_rejected", StatValue::Count(self.rejected_folders.len())),
            ReportItem::new("videos_pending_analysis", StatValue::Count(self.pending_analysis)),
            ReportItem::new("videos_analyzed", StatValue::Count(self.analyzed)),
            ReportItem::new("analysis_failures", StatValue::Count(self.analysis_failures)),
            ReportItem::new("sizes_from_cache", StatValue::Count(self.sizes_cached)),
            ReportItem::new("sizes_computed", StatValue::Count(self.sizes_computed)),
            ReportItem::new("sizing_failures", StatValue::Count(self.sizing_failures.len())),
            ReportItem::new("recent_folders", StatValue::Count(self.recent.folders)),
            ReportItem::new("recent_size", StatValue::Bytes(self.recent.bytes)),
            ReportItem::new("historical_folders", StatValue::Count(self.historical.folders)),
            ReportItem::new("historical_size", StatValue::Bytes(self.historical.bytes)),
            ReportItem::new("expired_folders", StatValue::Count(self.expired.folders)),
            ReportItem::new("expired_size", StatValue::Bytes(self.expired.bytes)),
        ];

        items.extend([
            ReportItem::new(
                "files_would_delete",
                StatValue::Count(self.execution.would_delete_count()),
            ),
            ReportItem::new("files_removed", StatValue::Count(self.execution.removed_count())),
            ReportItem::new(
                "files_already_gone",
                StatValue::Count(self.execution.already_gone_count()),
            ),
            ReportItem::new(
                "folders_removed",
                StatValue::Count(self.execution.folders_removed.len()),
            ),
            ReportItem::new("folders_kept", StatValue::Count(self.execution.folders_kept.len())),
            ReportItem::new("empty_parents_removed", StatValue::Count(self.empty_parents_removed)),
            ReportItem::new("removal_failures", StatValue::Count(self.execution.failed_count())),
            ReportItem::new("bytes_released", StatValue::Bytes(self.bytes_released())),
            ReportItem::new(
                "expected_archive_size",
                StatValue::Bytes(self.expected_archive_bytes()),
            ),
        ]);
        // Same columns on every run so history rows line up.
        let free = match self.expected_free_bytes() {
            Some(free) => StatValue::Bytes(free),
            None => StatValue::Text("unknown".to_string()),
        };
        items.push(ReportItem::new("expected_free_space", free));
        items.push(ReportItem::new(
            "free_space_buffer",
            StatValue::Bytes(self.free_space_buffer_bytes),
        ));
        items
    }

    pub fn to_table(&self) -> String {
        Table::new(self.to_items()).with(Style::psql()).to_string()
    }

    /// Append one summary row to a run history CSV, writing headers when the
    /// file is new.
    pub fn append_history_csv(&self, path: &Path) -> Result<(), Error> {
        let file_exists = fs::metadata(path).is_ok();
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let mut wtr = csv::Writer::from_writer(file);

        let items = self.to_items();
        if !file_exists {
            wtr.write_record(items.iter().map(|item| &item.name))?;
        }
        wtr.write_record(items.iter().map(|item| &item.raw_value))?;
        wtr.flush()?;
        Ok(())
    }

    /// One row per removal outcome: enough to reconstruct every decision.
    pub fn write_outcomes_csv(&self, path: &Path) -> Result<(), Error> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["folder", "phase", "reason", "path", "bytes", "status", "error"])?;
        for outcome in &self.execution.outcomes {
            let error = match &outcome.status {
                RemovalStatus::Failed(message) => message.clone(),
                _ => String::new(),
            };
            wtr.write_record(vec![
                outcome.folder.to_string(),
                outcome.candidate.phase.to_string(),
                outcome.candidate.reason.to_string(),
                outcome.candidate.path.display().to_string(),
                outcome.candidate.size_bytes.to_string(),
                outcome.status.label().to_string(),
                error,
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DatePath;
    use crate::retention::{RemovalCandidate, RemovalOutcome, RemovalReason, RetentionPhase};

    fn outcome(status: RemovalStatus, size_bytes: u64) -> RemovalOutcome {
        RemovalOutcome {
            folder: DatePath::parse_str("2024/01/01").unwrap(),
            candidate: RemovalCandidate {
                path: PathBuf::from("/archive/2024/01/01/a.mp4"),
                size_bytes,
                reason: RemovalReason::Expired,
                phase: RetentionPhase::Expired,
            },
            status,
        }
    }

    fn report(outcomes: Vec<RemovalOutcome>, dry_run: bool) -> RunReport {
        RunReport {
            started_at: Utc::now(),
            duration: Duration::from_secs(3),
            root: PathBuf::from("/archive"),
            dry_run,
            folders_discovered: 3,
            rejected_folders: vec![],
            pending_analysis: 0,
            analyzed: 0,
            analysis_failures: 0,
            sizes_cached: 2,
            sizes_computed: 1,
            sizing_failures: vec![],
            recent: PhaseTotals { folders: 1, bytes: 500 },
            historical: PhaseTotals { folders: 1, bytes: 300 },
            expired: PhaseTotals { folders: 1, bytes: 200 },
            execution: ExecutionReport {
                dry_run,
                outcomes,
                ..Default::default()
            },
            empty_parents_removed: 0,
            disk_capacity_bytes: Some(1_000),
            free_space_buffer_bytes: 100,
            max_failure_ratio: 0.5,
        }
    }

    #[test]
    fn test_expected_free_space_after_removals() {
        let r = report(vec![outcome(RemovalStatus::Removed, 200)], false);
        assert_eq!(r.archive_bytes_before(), 1_000);
        assert_eq!(r.expected_archive_bytes(), 800);
        assert_eq!(r.expected_free_bytes(), Some(200));
        assert!(!r.free_space_buffer_violated());
    }

    #[test]
    fn test_buffer_violation_is_detected() {
        let r = report(vec![outcome(RemovalStatus::Removed, 50)], false);
        assert_eq!(r.expected_free_bytes(), Some(50));
        assert!(r.free_space_buffer_violated());
    }

    #[test]
    fn test_dry_run_counts_would_free_bytes() {
        let r = report(vec![outcome(RemovalStatus::WouldDelete, 120)], true);
        assert_eq!(r.bytes_released(), 120);
        assert!(!r.exceeds_failure_threshold());
    }

    #[test]
    fn test_failure_threshold() {
        let few = report(
            vec![
                outcome(RemovalStatus::Removed, 1),
                outcome(RemovalStatus::Removed, 1),
                outcome(RemovalStatus::Failed("denied".into()), 1),
            ],
            false,
        );
        assert!(!few.exceeds_failure_threshold());

        let many = report(
            vec![
                outcome(RemovalStatus::Failed("gone".into()), 1),
                outcome(RemovalStatus::Failed("gone".into()), 1),
                outcome(RemovalStatus::Removed, 1),
            ],
            false,
        );
        assert!(many.exceeds_failure_threshold());
    }

    #[test]
    fn test_human_names() {
        let item = ReportItem::new("files_would_delete", StatValue::Count(3));
        assert_eq!(item.human_name, "Files Would Delete");
        assert_eq!(item.raw_value, "3");
    }

    #[test]
    fn test_history_csv_writes_header_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.csv");
        let r = report(vec![], false);
        r.append_history_csv(&path).unwrap();
        r.append_history_csv(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("run_start_time,"));
    }
}
