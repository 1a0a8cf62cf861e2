use crate::error::Error;
use crate::model::{CameraFolder, DatePath, MediaFile, MediaKind, MediaKinds};
use glob::Pattern;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Result of walking the archive root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Accepted date folders, oldest first.
    pub folders: Vec<CameraFolder>,
    /// Directories that do not have the `yyyy/mm/dd` shape. Never touched.
    pub rejected: Vec<PathBuf>,
}

/// Walk exactly three levels below `root` and collect the `yyyy/mm/dd`
/// folders. Anything else is logged and reported as rejected rather than
/// risking a wrong position in the recency order.
pub fn discover_folders(root: &Path, ignore_globs: &[String]) -> Result<Discovery, Error> {
    fs::read_dir(root).map_err(|source| Error::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let mut discovery = Discovery::default();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk error"));
                    return Err(Error::RootUnreadable {
                        path: root.to_path_buf(),
                        source,
                    });
                }
                warn!("Skipping unreadable archive entry: {}", err);
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        if ignore_patterns.iter().any(|pattern| pattern.matches_path(path)) {
            debug!("Ignoring {}", path.display());
            walker.skip_current_dir();
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        let shape_ok = match entry.depth() {
            1 => is_digits(&name, 4),
            2 => is_digits(&name, 2),
            _ => true,
        };
        if !shape_ok {
            warn!("Rejecting directory outside the yyyy/mm/dd layout: {}", path.display());
            discovery.rejected.push(path.to_path_buf());
            walker.skip_current_dir();
            continue;
        }

        if entry.depth() < 3 {
            continue;
        }

        let date_path = path
            .strip_prefix(root)
            .ok()
            .and_then(|relative| {
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                match parts.as_slice() {
                    [year, month, day] => DatePath::parse(year, month, day),
                    _ => None,
                }
            });

        let date_path = match date_path {
            Some(date_path) => date_path,
            None => {
                warn!("Rejecting directory that is not a calendar date: {}", path.display());
                discovery.rejected.push(path.to_path_buf());
                continue;
            }
        };

        let modified = match entry.metadata().map_err(io::Error::from).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!("Skipping {}: cannot read modification time: {}", path.display(), err);
                continue;
            }
        };

        discovery.folders.push(CameraFolder {
            date_path,
            path: path.to_path_buf(),
            modified,
        });
    }

    discovery.folders.sort_by(|a, b| a.date_path.cmp(&b.date_path));
    Ok(discovery)
}

fn is_digits(name: &str, width: usize) -> bool {
    name.len() == width && name.bytes().all(|b| b.is_ascii_digit())
}

/// List every non-directory entry under `folder`, sorted by path. Symlinks are
/// listed but not followed.
pub fn scan_folder(folder: &Path, kinds: &MediaKinds) -> io::Result<Vec<MediaFile>> {
    fs::read_dir(folder)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry in {}: {}", folder.display(), err);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let size_bytes = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                warn!("Cannot stat {}: {}", entry.path().display(), err);
                continue;
            }
        };

        let kind = if entry.file_type().is_symlink() {
            MediaKind::Unrecognized
        } else {
            kinds.classify(entry.path())
        };

        if kind == MediaKind::Unrecognized {
            debug!("Unrecognized file kind: {}", entry.path().display());
        }

        files.push(MediaFile {
            path: entry.path().to_path_buf(),
            size_bytes,
            kind,
            detection: None,
        });
    }

    Ok(files)
}

/// Relative names of everything under `folder` except `exclude` at the top
/// level, sorted. Only reads directory entries, never file metadata.
pub fn list_entry_names(folder: &Path, exclude: &str) -> io::Result<Vec<String>> {
    fs::read_dir(folder)?;

    let mut names = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.depth() == 1 && entry.file_name() == exclude {
            continue;
        }
        let relative = entry.path().strip_prefix(folder).unwrap_or(entry.path());
        names.push(relative.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Paths of every video under `folder`, sorted.
pub fn list_videos(folder: &Path, kinds: &MediaKinds) -> io::Result<Vec<PathBuf>> {
    fs::read_dir(folder)?;

    let mut videos = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry in {}: {}", folder.display(), err);
                continue;
            }
        };
        if entry.file_type().is_file() && kinds.is_video(entry.path()) {
            videos.push(entry.path().to_path_buf());
        }
    }
    Ok(videos)
}
