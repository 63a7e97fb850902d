//! Release feeds → deduplicated, ranked version list

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{VersionCache, VersionDescriptor, VersionError};
use crate::github::GithubRelease;
use crate::logging::{log_info, log_warning};
use crate::utils::USER_AGENT;

/// Archive asset suffixes we know how to extract
pub const ARCHIVE_EXTENSIONS: &[&str] = &[".zip", ".7z"];

/// (label, releases URL)
pub const DEFAULT_FEEDS: &[(&str, &str)] = &[
    ("primary", "https://api.github.com/repos/OptiScaler/OptiScaler/releases"),
    ("secondary", "https://api.github.com/repos/realdody/OptiScaler-Bleeding-Edge/releases"),
];

/// A remote release list
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub label: String,
    pub url: String,
}

impl From<&(&str, &str)> for Feed {
    fn from((label, url): &(&str, &str)) -> Self {
        Self {
            label: label.to_string(),
            url: url.to_string(),
        }
    }
}

pub struct ReleaseCatalog {
    feeds: Vec<Feed>,
    cache: VersionCache,
}

impl ReleaseCatalog {
    pub fn new(feeds: Vec<Feed>, cache: VersionCache) -> Self {
        Self { feeds, cache }
    }

    /// Every version from every reachable feed plus everything already in the cache.
    ///
    /// Feed failures are logged and skipped, so with no network this degrades to
    /// the cached versions only.
    pub fn list_versions(&self) -> Vec<VersionDescriptor> {
        let mut versions = Vec::new();

        for feed in &self.feeds {
            match fetch_releases(feed) {
                Ok(releases) => {
                    let found = descriptors_from_releases(&feed.label, &releases, &self.cache);
                    log_info(&format!("Feed '{}': {} usable releases", feed.label, found.len()));
                    versions.extend(found);
                }
                Err(e) => log_warning(&e.to_string()),
            }
        }

        add_local_only(&mut versions, &self.cache);
        merge_versions(versions)
    }
}

/// Appends cached versions that no feed listed. Cached copies of feed releases
/// are already marked by [`descriptors_from_releases`] and keep their feed metadata.
fn add_local_only(versions: &mut Vec<VersionDescriptor>, cache: &VersionCache) {
    let local_only: Vec<VersionDescriptor> = cache
        .scan_local()
        .into_iter()
        .filter(|local| !versions.iter().any(|v| v.matches_tag(&local.tag_name)))
        .collect();
    versions.extend(local_only);
}

fn fetch_releases(feed: &Feed) -> Result<Vec<GithubRelease>, VersionError> {
    let unavailable = |reason: String| VersionError::FeedUnavailable {
        feed: feed.label.clone(),
        reason,
    };

    let response = ureq::get(&feed.url)
        .set("User-Agent", USER_AGENT)
        .set("Accept", "application/vnd.github+json")
        .call()
        .map_err(|e| unavailable(e.to_string()))?;

    response
        .into_json::<Vec<GithubRelease>>()
        .map_err(|e| unavailable(format!("malformed release list: {}", e)))
}

/// Maps releases that carry an archive asset to descriptors, marking the ones
/// already present in `cache`.
pub fn descriptors_from_releases(
    origin: &str,
    releases: &[GithubRelease],
    cache: &VersionCache,
) -> Vec<VersionDescriptor> {
    releases
        .iter()
        .filter_map(|release| {
            let asset = release.archive_asset(ARCHIVE_EXTENSIONS)?;
            let mut version = VersionDescriptor {
                tag_name: release.tag_name.clone(),
                name: release
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| release.tag_name.clone()),
                description: release.body.clone().unwrap_or_default(),
                published_at: release.published_at.unwrap_or_default(),
                download_url: asset.browser_download_url.clone(),
                size: asset.size,
                origin: origin.to_string(),
                local_path: None,
                is_downloaded: false,
            };
            if let Some(path) = cache.local_path(&release.tag_name) {
                version.mark_downloaded(path);
            }
            Some(version)
        })
        .collect()
}

/// Deduplicates by tag (case-insensitive) and sorts newest first.
///
/// Within a duplicate group the entry with a local path wins, then the most
/// recently published one; on a full tie the first seen is kept.
pub fn merge_versions(versions: Vec<VersionDescriptor>) -> Vec<VersionDescriptor> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<VersionDescriptor> = Vec::with_capacity(versions.len());

    for version in versions {
        let key = version.tag_name.to_lowercase();
        match index.get(&key) {
            Some(&i) => {
                if rank(&version) > rank(&merged[i]) {
                    merged[i] = version;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(version);
            }
        }
    }

    merged.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    merged
}

fn rank(v: &VersionDescriptor) -> (bool, DateTime<Utc>) {
    (v.is_downloaded || v.has_local_path(), v.published_at)
}
