//! Shared GitHub API types

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// GitHub release metadata
#[derive(Deserialize, Debug, Clone)]
pub struct GithubRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

/// GitHub release asset
#[derive(Deserialize, Debug, Clone)]
pub struct GithubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl GithubRelease {
    /// First asset whose name ends with one of `extensions` (case-insensitive).
    pub fn archive_asset(&self, extensions: &[&str]) -> Option<&GithubAsset> {
        self.assets.iter().find(|a| {
            let name = a.name.to_lowercase();
            extensions.iter().any(|ext| name.ends_with(ext))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_release_list() {
        let json = r#"[
            {
                "tag_name": "v0.7.9",
                "name": "OptiScaler 0.7.9",
                "body": "Changelog",
                "published_at": "2025-03-01T12:00:00Z",
                "assets": [
                    { "name": "source.tar.gz", "browser_download_url": "https://x/src", "size": 10 },
                    { "name": "OptiScaler_0.7.9.7Z", "browser_download_url": "https://x/a.7z", "size": 2048 }
                ]
            },
            { "tag_name": "nightly", "name": null, "body": null, "published_at": null }
        ]"#;

        let releases: Vec<GithubRelease> = serde_json::from_str(json).unwrap();
        assert_eq!(releases.len(), 2);

        let asset = releases[0].archive_asset(&[".zip", ".7z"]).unwrap();
        assert_eq!(asset.browser_download_url, "https://x/a.7z");
        assert_eq!(asset.size, 2048);

        assert!(releases[1].assets.is_empty());
        assert!(releases[1].archive_asset(&[".zip", ".7z"]).is_none());
    }
}
