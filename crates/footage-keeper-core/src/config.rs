use crate::error::Error;
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FOOTAGE_KEEPER";

/// Immutable run configuration. Built once at startup and handed to each
/// component by reference.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub root_path: PathBuf,
    pub recent_budget_bytes: u64,
    pub historical_budget_bytes: u64,
    #[serde(default)]
    pub free_space_buffer_bytes: u64,
    #[serde(default)]
    pub disk_capacity_bytes: Option<u64>,
    #[serde(default = "default_target_labels")]
    pub target_labels: BTreeSet<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force_reevaluation: bool,
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    #[serde(default = "default_still_extensions")]
    pub still_extensions: Vec<String>,
    #[serde(default = "default_metadata_extensions")]
    pub metadata_extensions: Vec<String>,
    #[serde(default = "default_detection_filename")]
    pub detection_filename: String,
    #[serde(default = "default_folder_size_filename")]
    pub folder_size_filename: String,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// 0 lets rayon pick the pool size.
    #[serde(default)]
    pub worker_threads: usize,
    #[serde(default = "default_max_failure_ratio")]
    pub max_failure_ratio: f64,
    /// Program plus leading arguments; the video path is appended.
    #[serde(default)]
    pub detector_command: Option<Vec<String>>,
}

fn default_target_labels() -> BTreeSet<String> {
    BTreeSet::from(["person".to_string()])
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "avi", "mov", "mkv"].map(String::from).to_vec()
}

fn default_still_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png"].map(String::from).to_vec()
}

fn default_metadata_extensions() -> Vec<String> {
    ["json", "txt", "xml"].map(String::from).to_vec()
}

fn default_detection_filename() -> String {
    "detected_objects.json".to_string()
}

fn default_folder_size_filename() -> String {
    "folder_size.json".to_string()
}

fn default_max_failure_ratio() -> f64 {
    0.5
}

/// Load `Config.toml` (or `path` when given, which must then exist) layered
/// under `FOOTAGE_KEEPER_*` environment variables, then validate.
pub fn load_configuration(path: Option<&Path>) -> Result<RetentionConfig, Error> {
    let file_source = match path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("Config").required(false),
    };

    let builder = Config::builder()
        .add_source(file_source)
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;

    let config = builder.try_deserialize::<RetentionConfig>()?;
    config.validated()
}

impl RetentionConfig {
    /// Defaults for everything but the root and the two budgets.
    pub fn new(root_path: impl Into<PathBuf>, recent_budget_bytes: u64, historical_budget_bytes: u64) -> Self {
        Self {
            root_path: root_path.into(),
            recent_budget_bytes,
            historical_budget_bytes,
            free_space_buffer_bytes: 0,
            disk_capacity_bytes: None,
            target_labels: default_target_labels(),
            dry_run: false,
            force_reevaluation: false,
            video_extensions: default_video_extensions(),
            still_extensions: default_still_extensions(),
            metadata_extensions: default_metadata_extensions(),
            detection_filename: default_detection_filename(),
            folder_size_filename: default_folder_size_filename(),
            ignore_patterns: Vec::new(),
            worker_threads: 0,
            max_failure_ratio: default_max_failure_ratio(),
            detector_command: None,
        }
    }

    /// Check every value that would make a run unsafe. Runs before any
    /// filesystem mutation.
    pub fn validated(mut self) -> Result<Self, Error> {
        if !self.root_path.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "root_path {} is not a readable directory",
                self.root_path.display()
            )));
        }

        if self.recent_budget_bytes == 0 && self.historical_budget_bytes == 0 {
            return Err(Error::InvalidConfig(
                "recent_budget_bytes and historical_budget_bytes are both zero; every folder would expire"
                    .to_string(),
            ));
        }

        if self.detection_filename.trim().is_empty() || self.folder_size_filename.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "detection_filename and folder_size_filename must not be empty".to_string(),
            ));
        }

        if self.detection_filename == self.folder_size_filename {
            return Err(Error::InvalidConfig(format!(
                "detection_filename and folder_size_filename are both '{}'",
                self.detection_filename
            )));
        }

        if !(0.0..=1.0).contains(&self.max_failure_ratio) {
            return Err(Error::InvalidConfig(format!(
                "max_failure_ratio {} is outside [0, 1]",
                self.max_failure_ratio
            )));
        }

        if let Some(capacity) = self.disk_capacity_bytes {
            let required = self
                .recent_budget_bytes
                .saturating_add(self.historical_budget_bytes)
                .saturating_add(self.free_space_buffer_bytes);
            if required > capacity {
                return Err(Error::InvalidConfig(format!(
                    "budgets plus free space buffer ({} bytes) exceed disk_capacity_bytes ({} bytes)",
                    required, capacity
                )));
            }
        }

        if let Some(command) = &self.detector_command {
            if command.is_empty() {
                return Err(Error::InvalidConfig(
                    "detector_command must name a program".to_string(),
                ));
            }
        }

        for pattern in &self.ignore_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                Error::InvalidConfig(format!("invalid ignore pattern '{}': {}", pattern, e))
            })?;
        }

        self.video_extensions = normalize_extensions(&self.video_extensions);
        self.still_extensions = normalize_extensions(&self.still_extensions);
        self.metadata_extensions = normalize_extensions(&self.metadata_extensions);
        self.target_labels = self
            .target_labels
            .iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();

        Ok(self)
    }

    /// Apply command line overrides on top of the loaded values.
    pub fn with_overrides(mut self, dry_run: bool, force_reevaluation: bool) -> Self {
        self.dry_run |= dry_run;
        self.force_reevaluation |= force_reevaluation;
        self
    }
}

fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn base_config(root: &Path) -> RetentionConfig {
        RetentionConfig::new(root, 100, 100)
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let tmp = tempdir().unwrap();
        let config = base_config(&tmp.path().join("does-not-exist"));
        assert!(matches!(config.validated(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_budgets_exceeding_capacity_are_rejected() {
        let tmp = tempdir().unwrap();
        let mut config = base_config(tmp.path());
        config.disk_capacity_bytes = Some(150);
        config.free_space_buffer_bytes = 10;
        assert!(matches!(config.validated(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_same_sidecar_names_are_rejected() {
        let tmp = tempdir().unwrap();
        let mut config = base_config(tmp.path());
        config.folder_size_filename = config.detection_filename.clone();
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_extensions_are_normalized() {
        let tmp = tempdir().unwrap();
        let mut config = base_config(tmp.path());
        config.video_extensions = vec![".MP4".into(), "mp4".into(), " Mov ".into()];
        let config = config.validated().unwrap();
        assert_eq!(config.video_extensions, vec!["mov".to_string(), "mp4".to_string()]);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("archive");
        std::fs::create_dir_all(&archive).unwrap();
        let config_path = tmp.path().join("keeper.toml");
        std::fs::write(
            &config_path,
            format!(
                "root_path = {:?}\nrecent_budget_bytes = 2000\nhistorical_budget_bytes = 1000\ntarget_labels = [\"person\", \"dog\"]\n",
                archive.to_string_lossy()
            ),
        )
        .unwrap();

        let config = load_configuration(Some(&config_path)).unwrap();
        assert_eq!(config.recent_budget_bytes, 2000);
        assert_eq!(config.historical_budget_bytes, 1000);
        assert!(config.target_labels.contains("dog"));
        assert_eq!(config.detection_filename, "detected_objects.json");
        assert!(!config.dry_run);
    }

    #[test]
    fn test_negative_budget_fails_to_load() {
        let tmp = tempdir().unwrap();
        let config_path = tmp.path().join("keeper.toml");
        std::fs::write(
            &config_path,
            format!(
                "root_path = {:?}\nrecent_budget_bytes = -5\nhistorical_budget_bytes = 1000\n",
                tmp.path().to_string_lossy()
            ),
        )
        .unwrap();

        assert!(load_configuration(Some(&config_path)).is_err());
    }
}
