use super::classifier::RetentionPhase;
use crate::detection::DetectionRecord;
use crate::model::{CameraFolder, MediaFile, MediaKind, MediaKinds};
use crate::scanner;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FolderAction {
    KeepAll,
    PruneNonTarget,
    DeleteAll,
}

impl FolderAction {
    pub fn for_phase(phase: RetentionPhase) -> Self {
        match phase {
            RetentionPhase::Recent => FolderAction::KeepAll,
            RetentionPhase::Historical => FolderAction::PruneNonTarget,
            RetentionPhase::Expired => FolderAction::DeleteAll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalReason {
    NoTargetObjects,
    Expired,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalReason::NoTargetObjects => f.write_str("HISTORICAL_NO_TARGET"),
            RemovalReason::Expired => f.write_str("EXPIRED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalCandidate {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub reason: RemovalReason,
    pub phase: RetentionPhase,
}

#[derive(Debug, Clone)]
pub struct FolderPlan {
    pub folder: CameraFolder,
    pub phase: RetentionPhase,
    pub action: FolderAction,
    pub candidates: Vec<RemovalCandidate>,
}

/// Turn one folder's phase into concrete removal candidates. Pure: `files`
/// must already carry their detection summaries (see `collect_media`).
///
/// Pruning only ever selects analysed videos whose labels miss every target.
/// Stills, metadata, the cache artifact, unrecognized files and unanalysed
/// videos survive it.
pub fn plan_folder(
    folder: &CameraFolder,
    phase: RetentionPhase,
    files: &[MediaFile],
    target_labels: &BTreeSet<String>,
) -> FolderPlan {
    let action = FolderAction::for_phase(phase);
    let candidates = match action {
        FolderAction::KeepAll => Vec::new(),
        FolderAction::PruneNonTarget => files
            .iter()
            .filter(|file| file.kind == MediaKind::Video)
            .filter(|file| match &file.detection {
                Some(summary) => !summary.has_any(target_labels),
                None => false,
            })
            .map(|file| RemovalCandidate {
                path: file.path.clone(),
                size_bytes: file.size_bytes,
                reason: RemovalReason::NoTargetObjects,
                phase,
            })
            .collect(),
        FolderAction::DeleteAll => files
            .iter()
            .map(|file| RemovalCandidate {
                path: file.path.clone(),
                size_bytes: file.size_bytes,
                reason: RemovalReason::Expired,
                phase,
            })
            .collect(),
    };

    FolderPlan {
        folder: folder.clone(),
        phase,
        action,
        candidates,
    }
}

/// Scan `folder` and attach each video's detection summary from the record
/// of the directory it sits in. Videos next to an unreadable record get no
/// summary, so they are kept.
pub fn collect_media(folder: &Path, kinds: &MediaKinds) -> io::Result<Vec<MediaFile>> {
    let mut files = scanner::scan_folder(folder, kinds)?;
    let mut records: HashMap<PathBuf, Option<DetectionRecord>> = HashMap::new();

    for file in files.iter_mut().filter(|f| f.kind == MediaKind::Video) {
        let (Some(parent), Some(name)) = (file.path.parent(), file.path.file_name()) else {
            continue;
        };
        let record = records
            .entry(parent.to_path_buf())
            .or_insert_with(|| match DetectionRecord::load(parent, &kinds.detection_filename) {
                Ok(record) => record,
                Err(err) => {
                    warn!("Cannot read detection record in {}: {}", parent.display(), err);
                    None
                }
            });
        file.detection = record
            .as_ref()
            .and_then(|r| r.summary(&name.to_string_lossy()));
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DatePath, DetectionSummary};
    use std::time::SystemTime;

    fn camera_folder() -> CameraFolder {
        CameraFolder {
            date_path: DatePath::parse_str("2024/02/01").unwrap(),
            path: PathBuf::from("/archive/2024/02/01"),
            modified: SystemTime::UNIX_EPOCH,
        }
    }

    fn file(name: &str, kind: MediaKind, labels: Option<&[&str]>) -> MediaFile {
        MediaFile {
            path: PathBuf::from("/archive/2024/02/01").join(name),
            size_bytes: 10,
            kind,
            detection: labels.map(|labels| DetectionSummary {
                file_name: name.to_string(),
                labels: labels.iter().map(|l| l.to_string()).collect(),
            }),
        }
    }

    fn targets() -> BTreeSet<String> {
        BTreeSet::from(["person".to_string()])
    }

    fn sample_files() -> Vec<MediaFile> {
        vec![
            file("a.mp4", MediaKind::Video, Some(&["person", "car"][..])),
            file("b.mp4", MediaKind::Video, Some(&["car"][..])),
            file("c.mp4", MediaKind::Video, Some(&[][..])),
            file("d.mp4", MediaKind::Video, None),
            file("a.mp4_boxed.jpg", MediaKind::Still, None),
            file("detected_objects.json", MediaKind::Metadata, None),
            file("folder_size.json", MediaKind::CacheFile, None),
            file("clip.dav", MediaKind::Unrecognized, None),
        ]
    }

    fn names(plan: &FolderPlan) -> Vec<String> {
        plan.candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_recent_keeps_everything() {
        let plan = plan_folder(&camera_folder(), RetentionPhase::Recent, &sample_files(), &targets());
        assert_eq!(plan.action, FolderAction::KeepAll);
        assert!(plan.candidates.is_empty());
    }

    #[test]
    fn test_historical_prunes_only_analysed_videos_without_targets() {
        let plan = plan_folder(&camera_folder(), RetentionPhase::Historical, &sample_files(), &targets());
        assert_eq!(plan.action, FolderAction::PruneNonTarget);
        assert_eq!(names(&plan), vec!["b.mp4", "c.mp4"]);
        assert!(plan
            .candidates
            .iter()
            .all(|c| c.reason == RemovalReason::NoTargetObjects && c.phase == RetentionPhase::Historical));
    }

    #[test]
    fn test_unanalysed_video_is_never_pruned() {
        let files = vec![file("d.mp4", MediaKind::Video, None)];
        let plan = plan_folder(&camera_folder(), RetentionPhase::Historical, &files, &targets());
        assert!(plan.candidates.is_empty());
    }

    #[test]
    fn test_expired_deletes_every_file() {
        let files = sample_files();
        let plan = plan_folder(&camera_folder(), RetentionPhase::Expired, &files, &targets());
        assert_eq!(plan.action, FolderAction::DeleteAll);
        assert_eq!(plan.candidates.len(), files.len());
        assert!(plan.candidates.iter().all(|c| c.reason == RemovalReason::Expired));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let a = plan_folder(&camera_folder(), RetentionPhase::Historical, &sample_files(), &targets());
        let b = plan_folder(&camera_folder(), RetentionPhase::Historical, &sample_files(), &targets());
        assert_eq!(a.candidates, b.candidates);
    }
}
