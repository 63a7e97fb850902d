//! OptiScaler version acquisition: release feeds, downloads, archive
//! extraction and the on-disk version cache.
//!
//! The pipeline is `ReleaseCatalog` → `ArchiveFetcher` → `ArchiveExtractor`
//! → `VersionCache`, chained together by [`VersionManager`].

mod cache;
mod catalog;
mod extractor;
mod fetcher;

pub use cache::{VersionCache, LOCAL_DESCRIPTION};
pub use catalog::{merge_versions, Feed, ReleaseCatalog, ARCHIVE_EXTENSIONS, DEFAULT_FEEDS};
pub use extractor::{flatten, ArchiveExtractor, ArchiveKind};
pub use fetcher::{ArchiveFetcher, DownloadProgress};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::logging::{log_download, log_info, log_warning};
use crate::tasks::TaskContext;

/// File that must sit at the root of every extracted version
pub const PAYLOAD_FILENAME: &str = "OptiScaler.dll";

// ============================================================================
// Errors
// ============================================================================

/// Why an archive download failed
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("server returned HTTP {0}")]
    HttpStatus(u16),
    #[error("download returned '{0}' content instead of a binary file (invalid URL or API rate limit?)")]
    TextContent(String),
    #[error("download truncated: received {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no download URL for this version")]
    NoUrl,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("release feed '{feed}' unavailable: {reason}")]
    FeedUnavailable { feed: String, reason: String },
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("archive entry '{entry}' would be extracted outside the destination directory")]
    PathTraversal { entry: String },
    #[error("{payload} not found at the root of {}", .dir.display())]
    MissingPayload { payload: String, dir: PathBuf },
    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),
    #[error("corrupt archive: {0}")]
    Archive(String),
    #[error("invalid version tag '{0}'")]
    InvalidTag(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Version Descriptor
// ============================================================================

/// One installable version, either from a release feed or found in the cache.
///
/// Identity is the tag, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionDescriptor {
    pub tag_name: String,
    pub name: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub download_url: String,
    pub size: u64,
    /// Label of the feed this came from ("local" for cache scans)
    pub origin: String,
    pub local_path: Option<PathBuf>,
    pub is_downloaded: bool,
}

impl VersionDescriptor {
    pub fn matches_tag(&self, tag: &str) -> bool {
        self.tag_name.eq_ignore_ascii_case(tag)
    }

    pub fn has_local_path(&self) -> bool {
        self.local_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
    }

    pub fn mark_downloaded(&mut self, path: PathBuf) {
        self.local_path = Some(path);
        self.is_downloaded = true;
    }

    pub fn mark_deleted(&mut self) {
        self.local_path = None;
        self.is_downloaded = false;
    }
}

/// Rejects tags that cannot be used verbatim as a cache directory name.
pub fn validate_tag(tag: &str) -> Result<(), VersionError> {
    let bad = tag.trim().is_empty()
        || tag == "."
        || tag == ".."
        || tag.ends_with(".tmp")
        || tag.chars().any(|c| matches!(c, '/' | '\\' | ':' | '\0'));
    if bad {
        return Err(VersionError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

/// True when `latest` is a newer version than `current` (leading `v` ignored).
pub fn is_newer_version(latest: &str, current: &str) -> bool {
    let latest = latest.trim().trim_start_matches(['v', 'V']);
    let current = current.trim().trim_start_matches(['v', 'V']);
    matches!(
        version_compare::compare(latest, current),
        Ok(version_compare::Cmp::Gt)
    )
}

// ============================================================================
// Version Manager
// ============================================================================

/// Facade over the whole acquisition pipeline for one data directory.
pub struct VersionManager {
    catalog: ReleaseCatalog,
    fetcher: ArchiveFetcher,
    extractor: ArchiveExtractor,
    cache: VersionCache,
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionManager {
    /// Manager rooted at the default data directory with the default feeds
    pub fn new() -> Self {
        Self::with_root(opti_path!(), DEFAULT_FEEDS.iter().map(Feed::from).collect())
    }

    pub fn with_root(root: &Path, feeds: Vec<Feed>) -> Self {
        let cache = VersionCache::new(root.join("Versions"));
        Self {
            catalog: ReleaseCatalog::new(feeds, cache.clone()),
            fetcher: ArchiveFetcher::new(root.join("tmp")),
            extractor: ArchiveExtractor::new(),
            cache,
        }
    }

    /// Remote + local versions; never fails (offline mode shows only the cache)
    pub fn list_versions(&self) -> Vec<VersionDescriptor> {
        self.catalog.list_versions()
    }

    /// Only versions already present in the cache, newest first
    pub fn list_local(&self) -> Vec<VersionDescriptor> {
        merge_versions(self.cache.scan_local())
    }

    /// Looks `tag` up among `versions` (case-insensitive).
    pub fn find<'a>(versions: &'a mut [VersionDescriptor], tag: &str) -> Option<&'a mut VersionDescriptor> {
        versions.iter_mut().find(|v| v.matches_tag(tag))
    }

    /// Downloads, extracts and commits `version` into the cache.
    ///
    /// On success the descriptor points at the committed directory. On failure the
    /// previously cached copy (if any) is left untouched.
    pub fn download(&self, version: &mut VersionDescriptor, ctx: &TaskContext) -> Result<PathBuf, VersionError> {
        validate_tag(&version.tag_name)?;

        log_download(&format!("Downloading {} from {}", version.tag_name, version.origin));
        ctx.set_status(format!("Downloading {}...", version.tag_name));
        let archive = self.fetcher.download(version, |p| ctx.set_progress(p))?;

        let result = self.stage_and_commit(&version.tag_name, &archive, ctx);

        if let Err(e) = fs::remove_file(&archive) {
            log_warning(&format!("Failed to remove temporary archive {:?}: {}", archive, e));
        }

        let final_path = result?;
        version.mark_downloaded(final_path.clone());
        ctx.set_status(format!("{} ready", version.tag_name));
        log_info(&format!("{} cached at {:?}", version.tag_name, final_path));
        Ok(final_path)
    }

    fn stage_and_commit(&self, tag: &str, archive: &Path, ctx: &TaskContext) -> Result<PathBuf, VersionError> {
        let staging = self.cache.prepare_staging(tag)?;

        ctx.set_status(format!("Extracting {}...", tag));
        if let Err(e) = self.extractor.extract(archive, &staging) {
            self.cache.discard_staging(&staging);
            return Err(e);
        }

        self.cache.commit(tag, &staging)
    }

    /// Removes a cached version and clears the descriptor's downloaded state.
    pub fn delete(&self, version: &mut VersionDescriptor) -> Result<(), VersionError> {
        self.cache.delete(&version.tag_name)?;
        version.mark_deleted();
        Ok(())
    }
}
