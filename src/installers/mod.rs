//! Installing OptiScaler into game directories

mod common;
mod engine;
mod game_config;
mod metadata;

pub use common::{
    generate_shell_script, generate_windows_script, removal_script_name, validate_filename,
    write_removal_script, InstallError, AUX_DIRS, COMPANION_FILES, LOG_FILE, MARKER_CONFIG,
    PLUGINS_DIR, PLUGIN_FILE, REMOVAL_SCRIPTS,
};
pub use engine::{
    patch_config, Detection, InstallEngine, CANDIDATE_FILENAMES, DEFAULT_TARGET_FILENAME,
    NOT_INSTALLED, OPTI_PATCHER_URL, UNKNOWN_VERSION,
};
pub use game_config::{GameConfig, GameSettings, Upscaler};
pub use metadata::{
    normalize_version, parse_version_info, PeVersionReader, VersionInfo, VersionMetadataReader,
};

use std::path::PathBuf;

// ============================================================================
// Shared Types
// ============================================================================

/// Choices for a single install. Built fresh for every operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallationOptions {
    pub target_dir: PathBuf,
    /// Cache directory of the version being installed
    pub version_path: PathBuf,
    pub target_filename: String,
    pub enable_spoofing: bool,
    pub use_opti_patcher: bool,
    pub create_uninstaller: bool,
    // Detected environment, informational only
    pub is_nvidia: bool,
    pub is_wine: bool,
}

impl InstallationOptions {
    pub fn new(target_dir: impl Into<PathBuf>, version_path: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            version_path: version_path.into(),
            target_filename: DEFAULT_TARGET_FILENAME.to_string(),
            enable_spoofing: true,
            use_opti_patcher: false,
            create_uninstaller: true,
            is_nvidia: false,
            is_wine: false,
        }
    }
}

/// A game directory and what is currently installed in it
#[derive(Debug, Clone, PartialEq)]
pub struct InstallTarget {
    pub name: String,
    pub path: PathBuf,
    pub is_installed: bool,
    /// Empty when not installed
    pub installed_filename: String,
    pub current_version: String,
}

impl InstallTarget {
    pub fn detect(path: impl Into<PathBuf>, engine: &InstallEngine) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut target = Self {
            name,
            path,
            is_installed: false,
            installed_filename: String::new(),
            current_version: NOT_INSTALLED.to_string(),
        };
        target.refresh(engine);
        target
    }

    /// Re-runs detection; call after every install, update or uninstall.
    pub fn refresh(&mut self, engine: &InstallEngine) {
        let detection = engine.detect(&self.path);
        self.is_installed = detection.installed;
        self.installed_filename = detection.payload_filename;
        self.current_version = detection.version;
    }

    /// Removes the detected installation
    pub fn uninstall(&mut self, engine: &InstallEngine) -> Result<(), InstallError> {
        if !self.is_installed {
            return Err(InstallError::NotInstalled(self.path.clone()));
        }
        let result = engine.uninstall(&self.path, &self.installed_filename);
        self.refresh(engine);
        result
    }
}
