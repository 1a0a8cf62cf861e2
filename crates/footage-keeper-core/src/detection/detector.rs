use super::record::DetectionRecord;
use super::tracker::ProcessingTracker;
use crate::error::Error;
use crate::model::CameraFolder;
use crate::progress::ProgressReporter;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, warn};

/// The object detector. Given a video, returns the set of labels seen in it
/// (possibly empty). Implementations may also drop still images next to the
/// video; those are never touched by pruning.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, video: &Path) -> Result<BTreeSet<String>, Error>;
}

/// Runs an external program per video: `program [args...] <video>`. The
/// program must print a JSON array of label strings on stdout.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }

    /// Build from a `detector_command` value: first element is the program.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program, args))
    }
}

impl ObjectDetector for CommandDetector {
    fn detect(&self, video: &Path) -> Result<BTreeSet<String>, Error> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(video)
            .output()
            .map_err(|e| Error::Detector {
                path: video.to_path_buf(),
                message: format!("cannot run '{}': {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(Error::Detector {
                path: video.to_path_buf(),
                message: format!(
                    "'{}' exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let labels: Vec<String> = serde_json::from_slice(&output.stdout).map_err(|e| Error::Detector {
            path: video.to_path_buf(),
            message: format!("unparsable detector output: {}", e),
        })?;
        Ok(labels.into_iter().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }
}

#[derive(Debug, Default, Clone)]
pub struct AnalysisSummary {
    pub pending: usize,
    pub analyzed: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Run `detector` over every pending video of `folders`. The record of the
/// video's directory is saved after each video so an interrupted run keeps
/// what it already did. A failed video stays unanalysed.
pub fn analyze_pending(
    tracker: &ProcessingTracker,
    detector: &dyn ObjectDetector,
    detection_filename: &str,
    folders: &[CameraFolder],
    reporter: &dyn ProgressReporter,
) -> AnalysisSummary {
    let mut pending: Vec<PathBuf> = Vec::new();
    for folder in folders {
        match tracker.pending_in_folder(&folder.path) {
            Ok(videos) => pending.extend(videos),
            Err(err) => warn!("Cannot list videos in {}: {}", folder.path.display(), err),
        }
    }

    let mut summary = AnalysisSummary {
        pending: pending.len(),
        ..Default::default()
    };
    info!("{} video files need analysis", pending.len());
    reporter.on_analysis_start(pending.len());

    for (idx, video) in pending.iter().enumerate() {
        match analyze_video(detector, detection_filename, video) {
            Ok(()) => summary.analyzed += 1,
            Err(err) => {
                error!("Cannot analyse {}: {}", video.display(), err);
                summary.failed.push((video.clone(), err.to_string()));
            }
        }
        reporter.on_analysis_progress(idx + 1, pending.len());
    }

    reporter.on_analysis_complete(summary.analyzed, summary.failed.len());
    summary
}

/// Detect one video and merge the labels into its directory's record. A
/// record that exists but cannot be read is left alone and the detector is
/// not run.
fn analyze_video(detector: &dyn ObjectDetector, detection_filename: &str, video: &Path) -> Result<(), Error> {
    let (Some(parent), Some(name)) = (video.parent(), video.file_name()) else {
        return Err(Error::Other(format!("{} is not a file path", video.display())));
    };

    let mut record = DetectionRecord::load(parent, detection_filename)?.unwrap_or_default();
    let labels = detector.detect(video)?;
    debug!("{}: {:?}", video.display(), labels);
    record.insert(&name.to_string_lossy(), labels);
    record.save(parent, detection_filename)
}
