//! On-disk version cache: one directory per tag under `<appRoot>/Versions`
//!
//! A version only becomes visible under its final name once it is complete.
//! Extraction happens in `<tag>.tmp` and is renamed into place by [`VersionCache::commit`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use super::{validate_tag, VersionDescriptor, VersionError, PAYLOAD_FILENAME};
use crate::logging::{log_info, log_warning};

/// Description given to versions discovered on disk
pub const LOCAL_DESCRIPTION: &str = "Locally installed version";

const STAGING_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct VersionCache {
    root: PathBuf,
}

impl VersionCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Final directory for `tag`, whether or not it exists yet.
    ///
    /// Tags compare case-insensitively, so a directory already cached under
    /// another casing (`V0.7.9` for `v0.7.9`) is the slot.
    pub fn slot_path(&self, tag: &str) -> Result<PathBuf, VersionError> {
        validate_tag(tag)?;
        Ok(self.existing_slot(tag).unwrap_or_else(|| self.root.join(tag)))
    }

    fn existing_slot(&self, tag: &str) -> Option<PathBuf> {
        let exact = self.root.join(tag);
        if exact.is_dir() {
            return Some(exact);
        }
        fs::read_dir(&self.root)
            .ok()?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .find(|e| e.file_name().to_string_lossy().eq_ignore_ascii_case(tag))
            .map(|e| e.path())
    }

    /// The cached directory for `tag` if it holds a payload
    pub fn local_path(&self, tag: &str) -> Option<PathBuf> {
        let slot = self.slot_path(tag).ok()?;
        slot.join(PAYLOAD_FILENAME).is_file().then_some(slot)
    }

    /// Fresh, empty staging directory for `tag`. Leftovers from an interrupted
    /// run are removed first.
    pub fn prepare_staging(&self, tag: &str) -> Result<PathBuf, VersionError> {
        validate_tag(tag)?;
        let staging = self.root.join(format!("{}{}", tag, STAGING_SUFFIX));
        if staging.exists() {
            log_warning(&format!("Removing stale staging directory {:?}", staging));
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        Ok(staging)
    }

    pub fn discard_staging(&self, staging: &Path) {
        if staging.exists() {
            if let Err(e) = fs::remove_dir_all(staging) {
                log_warning(&format!("Failed to remove staging directory {:?}: {}", staging, e));
            }
        }
    }

    /// Promotes a staging directory to the final slot for `tag`.
    ///
    /// The staging directory must contain the payload at its root; otherwise it is
    /// discarded and any existing copy of `tag` stays as it was.
    pub fn commit(&self, tag: &str, staging: &Path) -> Result<PathBuf, VersionError> {
        let final_dir = match self.slot_path(tag) {
            Ok(p) => p,
            Err(e) => {
                self.discard_staging(staging);
                return Err(e);
            }
        };

        if !staging.join(PAYLOAD_FILENAME).is_file() {
            self.discard_staging(staging);
            return Err(VersionError::MissingPayload {
                payload: PAYLOAD_FILENAME.to_string(),
                dir: staging.to_path_buf(),
            });
        }

        let swap = || -> std::io::Result<()> {
            if final_dir.exists() {
                fs::remove_dir_all(&final_dir)?;
            }
            fs::rename(staging, &final_dir)
        };
        if let Err(e) = swap() {
            self.discard_staging(staging);
            return Err(e.into());
        }

        log_info(&format!("Committed {} to {:?}", tag, final_dir));
        Ok(final_dir)
    }

    /// Removes the cached directory for `tag`. Missing directories are not an error.
    pub fn delete(&self, tag: &str) -> Result<(), VersionError> {
        let slot = self.slot_path(tag)?;
        if slot.exists() {
            fs::remove_dir_all(&slot)?;
            log_info(&format!("Deleted cached version {}", tag));
        }
        Ok(())
    }

    /// Every complete version directory in the cache
    pub fn scan_local(&self) -> Vec<VersionDescriptor> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| {
                let tag = entry.file_name().to_string_lossy().to_string();
                if tag.ends_with(STAGING_SUFFIX) || validate_tag(&tag).is_err() {
                    return None;
                }
                let path = entry.path();
                if !path.join(PAYLOAD_FILENAME).is_file() {
                    return None;
                }

                Some(VersionDescriptor {
                    name: tag.clone(),
                    tag_name: tag,
                    description: LOCAL_DESCRIPTION.to_string(),
                    published_at: directory_time(&path),
                    download_url: String::new(),
                    size: size_on_disk(&path),
                    origin: "local".to_string(),
                    local_path: Some(path),
                    is_downloaded: true,
                })
            })
            .collect()
    }
}

/// Creation time where the filesystem records one, modification time otherwise
fn directory_time(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH))
}

/// Total size of the files under `path`
pub fn size_on_disk(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
