use crate::error::Error;
use crate::model::DetectionSummary;
use crate::retry::retry_once;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Per-folder detection results: video file name -> detected labels.
/// Serialized as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionRecord {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl DetectionRecord {
    pub fn path_in(folder: &Path, file_name: &str) -> PathBuf {
        folder.join(file_name)
    }

    /// Load the record of `folder`. A missing record and a corrupt one are
    /// both `Ok(None)`: every video in the folder counts as unanalysed and a
    /// fresh record may replace it. A record that exists but cannot be read
    /// (after one retry) is an error, and must not be overwritten.
    pub fn load(folder: &Path, file_name: &str) -> io::Result<Option<Self>> {
        let path = Self::path_in(folder, file_name);
        let raw = match retry_once("detection record read", || fs::read(&path)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!("Corrupt detection record {}: {}", path.display(), err);
                Ok(None)
            }
        }
    }

    pub fn contains(&self, video_name: &str) -> bool {
        self.entries.contains_key(video_name)
    }

    pub fn summary(&self, video_name: &str) -> Option<DetectionSummary> {
        self.entries.get(video_name).map(|labels| DetectionSummary {
            file_name: video_name.to_string(),
            labels: labels.clone(),
        })
    }

    /// Set the labels of one video, replacing any earlier result.
    pub fn insert(&mut self, video_name: &str, labels: BTreeSet<String>) {
        self.entries.insert(video_name.to_string(), labels);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self, folder: &Path, file_name: &str) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(Self::path_in(folder, file_name), bytes)?;
        Ok(())
    }
}
