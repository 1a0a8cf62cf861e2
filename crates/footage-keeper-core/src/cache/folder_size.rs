use crate::retry::retry_once;
use crate::scanner;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::hash::Hasher as _;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace, warn};
use twox_hash::XxHash64;
use walkdir::WalkDir;

/// Contents of the per-folder cache artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSizeEntry {
    pub size_bytes: u64,
    pub computed_at: DateTime<Utc>,
    /// xxhash64 over the sorted entry names, artifact excluded.
    pub listing_hash: u64,
}

impl FolderSizeEntry {
    /// An entry is only trusted if it was computed no earlier than the
    /// folder's last modification and the folder still lists the same names.
    pub fn is_valid_for(&self, folder_modified: SystemTime, listing_hash: u64) -> bool {
        self.computed_at >= DateTime::<Utc>::from(folder_modified) && self.listing_hash == listing_hash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSource {
    Cached,
    Computed,
}

#[derive(Debug, Clone, Copy)]
pub struct SizeLookup {
    pub size_bytes: u64,
    pub source: SizeSource,
}

/// Sidecar cache of folder sizes. The artifact lives inside the folder it
/// describes and is never counted in that folder's size.
///
/// A read-only cache still serves valid artifacts but never creates, rewrites
/// or removes one. Dry runs use it so they leave the archive byte-identical.
#[derive(Debug, Clone)]
pub struct FolderSizeCache {
    file_name: String,
    read_only: bool,
}

impl FolderSizeCache {
    pub fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            read_only: false,
        }
    }

    pub fn read_only(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            read_only: true,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn artifact_path(&self, folder: &Path) -> PathBuf {
        folder.join(&self.file_name)
    }

    /// Read the artifact. Missing or corrupt artifacts both come back as
    /// `None`; the caller recomputes.
    pub fn load(&self, folder: &Path) -> Option<FolderSizeEntry> {
        let path = self.artifact_path(folder);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("Cannot read size cache {}: {}", path.display(), err);
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Corrupt size cache {}: {}, recomputing", path.display(), err);
                None
            }
        }
    }

    /// Total bytes of everything in `folder`, served from the artifact when it
    /// is still valid and recomputed otherwise. The recomputed size is written
    /// back unless the cache is read-only.
    pub fn get_size(&self, folder: &Path) -> io::Result<SizeLookup> {
        let listing_hash = self.listing_hash(folder)?;
        let folder_modified = retry_once("folder stat", || fs::metadata(folder)?.modified())?;

        if let Some(entry) = self.load(folder) {
            if entry.is_valid_for(folder_modified, listing_hash) {
                trace!("Size cache hit for {}", folder.display());
                return Ok(SizeLookup {
                    size_bytes: entry.size_bytes,
                    source: SizeSource::Cached,
                });
            }
            debug!("Size cache stale for {}", folder.display());
        }

        let size_bytes = self.recompute(folder, listing_hash)?;
        Ok(SizeLookup {
            size_bytes,
            source: SizeSource::Computed,
        })
    }

    fn recompute(&self, folder: &Path, listing_hash: u64) -> io::Result<u64> {
        let size_bytes = self.sum_sizes(folder)?;
        let mut entry = FolderSizeEntry {
            size_bytes,
            computed_at: Utc::now(),
            listing_hash,
        };

        if self.read_only {
            debug!("Computed size of {}: {} bytes (not cached)", folder.display(), size_bytes);
            return Ok(size_bytes);
        }

        if let Err(err) = self.write(folder, &entry) {
            warn!("Cannot write size cache for {}: {}", folder.display(), err);
            return Ok(size_bytes);
        }

        // Creating the artifact can move the folder mtime past computed_at.
        // Rewriting an existing file in place leaves the folder mtime alone.
        if let Ok(modified) = fs::metadata(folder).and_then(|m| m.modified()) {
            let modified = DateTime::<Utc>::from(modified);
            if modified > entry.computed_at {
                entry.computed_at = modified;
                if let Err(err) = self.write(folder, &entry) {
                    warn!("Cannot rewrite size cache for {}: {}", folder.display(), err);
                }
            }
        }

        debug!("Computed size of {}: {} bytes", folder.display(), size_bytes);
        Ok(size_bytes)
    }

    fn write(&self, folder: &Path, entry: &FolderSizeEntry) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let path = self.artifact_path(folder);
        retry_once("size cache write", || fs::write(&path, &bytes))
    }

    fn sum_sizes(&self, folder: &Path) -> io::Result<u64> {
        let mut total = 0u64;
        for entry in WalkDir::new(folder).min_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            if entry.depth() == 1 && entry.file_name() == self.file_name.as_str() {
                continue;
            }
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
        Ok(total)
    }

    fn listing_hash(&self, folder: &Path) -> io::Result<u64> {
        let names = retry_once("folder listing", || {
            scanner::list_entry_names(folder, &self.file_name)
        })?;
        let mut hasher = XxHash64::with_seed(0);
        for name in &names {
            hasher.write(name.as_bytes());
            hasher.write_u8(0);
        }
        Ok(hasher.finish())
    }

    /// Delete the artifact so the next lookup recomputes from disk. Returns
    /// whether an artifact was present. A read-only cache only reports it.
    pub fn invalidate(&self, folder: &Path) -> io::Result<bool> {
        let path = self.artifact_path(folder);
        if self.read_only {
            return Ok(path.is_file());
        }
        match retry_once("size cache invalidate", || fs::remove_file(&path)) {
            Ok(()) => {
                debug!("Invalidated size cache {}", path.display());
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Invalidate every given folder. Returns how many artifacts were removed.
    pub fn clear_all<'a, I>(&self, folders: I) -> io::Result<usize>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut removed = 0;
        for folder in folders {
            if self.invalidate(folder)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
