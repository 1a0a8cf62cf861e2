use super::record::DetectionRecord;
use crate::model::MediaKinds;
use crate::scanner;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Answers "has this video already been analysed?" from the persisted
/// detection records. Read-only: never writes a record.
#[derive(Debug, Clone)]
pub struct ProcessingTracker {
    kinds: MediaKinds,
    force_reevaluation: bool,
}

impl ProcessingTracker {
    pub fn new(kinds: MediaKinds, force_reevaluation: bool) -> Self {
        Self {
            kinds,
            force_reevaluation,
        }
    }

    /// True for a video without an entry in its folder's record, or for any
    /// video when re-evaluation is forced. Never true for other file kinds.
    pub fn needs_processing(&self, file: &Path) -> bool {
        if !self.kinds.is_video(file) {
            return false;
        }
        if self.force_reevaluation {
            return true;
        }

        let (Some(parent), Some(name)) = (file.parent(), file.file_name()) else {
            return true;
        };
        !is_recorded(self.load_record(parent).as_ref(), name)
    }

    /// Every video under `folder` that still needs analysis. Each record is
    /// read once per directory rather than once per video.
    pub fn pending_in_folder(&self, folder: &Path) -> io::Result<Vec<PathBuf>> {
        let videos = scanner::list_videos(folder, &self.kinds)?;
        if self.force_reevaluation {
            return Ok(videos);
        }

        let mut records: HashMap<PathBuf, Option<DetectionRecord>> = HashMap::new();
        let pending = videos
            .into_iter()
            .filter(|video| {
                let (Some(parent), Some(name)) = (video.parent(), video.file_name()) else {
                    return true;
                };
                let record = records
                    .entry(parent.to_path_buf())
                    .or_insert_with(|| self.load_record(parent));
                !is_recorded(record.as_ref(), name)
            })
            .collect();
        Ok(pending)
    }

    /// An unreadable record counts as absent here: its videos stay pending,
    /// and pending videos are never pruned.
    fn load_record(&self, dir: &Path) -> Option<DetectionRecord> {
        match DetectionRecord::load(dir, &self.kinds.detection_filename) {
            Ok(record) => record,
            Err(err) => {
                warn!("Cannot read detection record in {}: {}", dir.display(), err);
                None
            }
        }
    }
}

fn is_recorded(record: Option<&DetectionRecord>, name: &OsStr) -> bool {
    record.map_or(false, |record| record.contains(&name.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn kinds() -> MediaKinds {
        MediaKinds {
            video_extensions: vec!["mp4".into()],
            still_extensions: vec!["jpg".into()],
            metadata_extensions: vec!["json".into()],
            detection_filename: "detected_objects.json".into(),
            folder_size_filename: "folder_size.json".into(),
        }
    }

    #[test]
    fn test_video_without_record_needs_processing() {
        let tmp = tempdir().unwrap();
        let video = tmp.path().join("a.mp4");
        fs::write(&video, b"x").unwrap();
        let tracker = ProcessingTracker::new(kinds(), false);
        assert!(tracker.needs_processing(&video));
    }

    #[test]
    fn test_recorded_video_is_skipped_unless_forced() {
        let tmp = tempdir().unwrap();
        let video = tmp.path().join("a.mp4");
        fs::write(&video, b"x").unwrap();
        fs::write(tmp.path().join("detected_objects.json"), r#"{"a.mp4": []}"#).unwrap();

        assert!(!ProcessingTracker::new(kinds(), false).needs_processing(&video));
        assert!(ProcessingTracker::new(kinds(), true).needs_processing(&video));
    }

    #[test]
    fn test_stills_never_need_processing() {
        let tmp = tempdir().unwrap();
        let still = tmp.path().join("a.mp4_boxed.jpg");
        fs::write(&still, b"x").unwrap();
        assert!(!ProcessingTracker::new(kinds(), true).needs_processing(&still));
    }

    #[test]
    fn test_pending_in_folder_lists_only_unrecorded_videos() {
        let tmp = tempdir().unwrap();
        for name in ["a.mp4", "b.mp4", "c.mp4", "a.mp4_boxed.jpg"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        fs::write(
            tmp.path().join("detected_objects.json"),
            r#"{"a.mp4": ["person"], "c.mp4": []}"#,
        )
        .unwrap();

        let pending = ProcessingTracker::new(kinds(), false)
            .pending_in_folder(tmp.path())
            .unwrap();
        assert_eq!(pending, vec![tmp.path().join("b.mp4")]);
    }

    #[test]
    fn test_unreadable_record_marks_videos_pending() {
        let tmp = tempdir().unwrap();
        let video = tmp.path().join("a.mp4");
        fs::write(&video, b"x").unwrap();
        fs::create_dir(tmp.path().join("detected_objects.json")).unwrap();

        let tracker = ProcessingTracker::new(kinds(), false);
        assert!(tracker.needs_processing(&video));
        assert_eq!(tracker.pending_in_folder(tmp.path()).unwrap(), vec![video]);
    }

    #[test]
    fn test_corrupt_record_marks_every_video_pending() {
        let tmp = tempdir().unwrap();
        for name in ["a.mp4", "b.mp4"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        fs::write(tmp.path().join("detected_objects.json"), "[[[").unwrap();

        let pending = ProcessingTracker::new(kinds(), false)
            .pending_in_folder(tmp.path())
            .unwrap();
        assert_eq!(pending.len(), 2);
    }
}
