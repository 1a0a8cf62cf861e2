use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A `yyyy/mm/dd` folder identity.
///
/// Ordering is plain string ordering. That only matches chronological order
/// because every segment is fixed-width and zero-padded, which `parse`
/// enforces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DatePath(String);

impl DatePath {
    /// Build from three path segments. Returns `None` unless they are
    /// `yyyy`, `mm`, `dd` digits forming a real calendar date.
    pub fn parse(year: &str, month: &str, day: &str) -> Option<Self> {
        let shaped = |s: &str, width: usize| s.len() == width && s.bytes().all(|b| b.is_ascii_digit());
        if !shaped(year, 4) || !shaped(month, 2) || !shaped(day, 2) {
            return None;
        }

        let date = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)?;
        Some(DatePath(date.format("%Y/%m/%d").to_string()))
    }

    /// Parse a `yyyy/mm/dd` string.
    pub fn parse_str(value: &str) -> Option<Self> {
        let mut parts = value.split('/');
        let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        Self::parse(year, month, day)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One date folder of the archive.
#[derive(Debug, Clone)]
pub struct CameraFolder {
    pub date_path: DatePath,
    pub path: PathBuf,
    pub modified: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    Video,
    Still,
    Metadata,
    CacheFile,
    Unrecognized,
}

/// Extension allow-lists plus the two sidecar names, used to decide a file's
/// kind. Sidecar names win over extensions.
#[derive(Debug, Clone)]
pub struct MediaKinds {
    pub video_extensions: Vec<String>,
    pub still_extensions: Vec<String>,
    pub metadata_extensions: Vec<String>,
    pub detection_filename: String,
    pub folder_size_filename: String,
}

impl MediaKinds {
    pub fn from_config(config: &crate::RetentionConfig) -> Self {
        Self {
            video_extensions: config.video_extensions.clone(),
            still_extensions: config.still_extensions.clone(),
            metadata_extensions: config.metadata_extensions.clone(),
            detection_filename: config.detection_filename.clone(),
            folder_size_filename: config.folder_size_filename.clone(),
        }
    }

    pub fn classify(&self, path: &Path) -> MediaKind {
        let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if file_name == self.folder_size_filename.as_str() {
            return MediaKind::CacheFile;
        }
        if file_name == self.detection_filename.as_str() {
            return MediaKind::Metadata;
        }

        let extension = match path.extension() {
            Some(ext) => ext.to_string_lossy().to_lowercase(),
            None => return MediaKind::Unrecognized,
        };

        if self.video_extensions.contains(&extension) {
            MediaKind::Video
        } else if self.still_extensions.contains(&extension) {
            MediaKind::Still
        } else if self.metadata_extensions.contains(&extension) {
            MediaKind::Metadata
        } else {
            MediaKind::Unrecognized
        }
    }

    pub fn is_video(&self, path: &Path) -> bool {
        self.classify(path) == MediaKind::Video
    }
}

/// Labels the detector found in one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionSummary {
    pub file_name: String,
    pub labels: BTreeSet<String>,
}

impl DetectionSummary {
    pub fn has_any(&self, targets: &BTreeSet<String>) -> bool {
        !self.labels.is_disjoint(targets)
    }
}

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub kind: MediaKind,
    /// Only ever set for videos.
    pub detection: Option<DetectionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> MediaKinds {
        MediaKinds {
            video_extensions: vec!["mp4".into(), "mkv".into()],
            still_extensions: vec!["jpg".into()],
            metadata_extensions: vec!["json".into()],
            detection_filename: "detected_objects.json".into(),
            folder_size_filename: "folder_size.json".into(),
        }
    }

    #[test]
    fn test_date_path_requires_zero_padding() {
        assert!(DatePath::parse("2024", "01", "05").is_some());
        assert!(DatePath::parse("2024", "1", "05").is_none());
        assert!(DatePath::parse("24", "01", "05").is_none());
        assert!(DatePath::parse("2024", "01", "5").is_none());
    }

    #[test]
    fn test_date_path_requires_real_date() {
        assert!(DatePath::parse("2024", "02", "29").is_some());
        assert!(DatePath::parse("2023", "02", "29").is_none());
        assert!(DatePath::parse("2024", "13", "01").is_none());
        assert!(DatePath::parse("2024", "00", "10").is_none());
    }

    #[test]
    fn test_date_path_ordering_is_chronological() {
        let mut paths = vec![
            DatePath::parse_str("2024/10/01").unwrap(),
            DatePath::parse_str("2023/12/31").unwrap(),
            DatePath::parse_str("2024/02/15").unwrap(),
        ];
        paths.sort();
        let ordered: Vec<&str> = paths.iter().map(|p| p.as_str()).collect();
        assert_eq!(ordered, vec!["2023/12/31", "2024/02/15", "2024/10/01"]);
    }

    #[test]
    fn test_parse_str_rejects_extra_segments() {
        assert!(DatePath::parse_str("2024/01/01/extra").is_none());
        assert!(DatePath::parse_str("2024/01").is_none());
    }

    #[test]
    fn test_sidecar_names_win_over_extensions() {
        let kinds = kinds();
        assert_eq!(kinds.classify(Path::new("/a/folder_size.json")), MediaKind::CacheFile);
        assert_eq!(kinds.classify(Path::new("/a/detected_objects.json")), MediaKind::Metadata);
        assert_eq!(kinds.classify(Path::new("/a/other.json")), MediaKind::Metadata);
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let kinds = kinds();
        assert_eq!(kinds.classify(Path::new("/a/clip.MP4")), MediaKind::Video);
        assert_eq!(kinds.classify(Path::new("/a/clip.mp4_boxed.jpg")), MediaKind::Still);
        assert_eq!(kinds.classify(Path::new("/a/clip.dav")), MediaKind::Unrecognized);
        assert_eq!(kinds.classify(Path::new("/a/README")), MediaKind::Unrecognized);
    }
}
