use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::log_warning;

// ============================================================================
// Main App Config
// ============================================================================

/// Persisted user preferences (`config.json` in the data directory).
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Game directories the user has added, already normalised
    pub saved_paths: Vec<String>,
    pub last_selected_version: Option<String>,
}

impl AppConfig {
    pub fn get_path() -> PathBuf {
        opti_path!("config.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::get_path())
    }

    /// Loads from `path`, falling back to defaults when the file is missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => log_warning(&format!("Ignoring malformed {:?}: {}", path, e)),
                },
                Err(e) => log_warning(&format!("Failed to read {:?}: {}", path, e)),
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        self.save_to(&Self::get_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log_warning(&format!("Failed to save config to {:?}: {}", path, e));
                }
            }
            Err(e) => log_warning(&format!("Failed to serialize config: {}", e)),
        }
    }

    /// Adds a game directory. Returns `false` if it was already saved.
    pub fn add_path(&mut self, path: &Path) -> bool {
        let normalized = normalize_game_path(path);
        if self.contains_path(&normalized) {
            return false;
        }
        self.saved_paths.push(normalized);
        true
    }

    /// Removes a game directory. Returns `false` if it was not saved.
    pub fn remove_path(&mut self, path: &Path) -> bool {
        let normalized = normalize_game_path(path);
        let before = self.saved_paths.len();
        self.saved_paths
            .retain(|p| !p.eq_ignore_ascii_case(&normalized));
        self.saved_paths.len() != before
    }

    fn contains_path(&self, normalized: &str) -> bool {
        self.saved_paths
            .iter()
            .any(|p| p.eq_ignore_ascii_case(normalized))
    }
}

/// Absolute path with trailing separators removed (lower-cased on Windows).
pub fn normalize_game_path(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = absolute.to_string_lossy().to_string();
    while normalized.len() > 1 && (normalized.ends_with('/') || normalized.ends_with('\\')) {
        normalized.pop();
    }

    if cfg!(windows) {
        normalized = normalized.to_lowercase();
    }
    normalized
}
