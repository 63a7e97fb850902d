//! Best-effort environment probes that pre-fill [`InstallationOptions`]
//!
//! Nothing here affects install correctness. Every probe degrades to a
//! conservative answer when it cannot decide.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::installers::InstallationOptions;
use crate::logging::{detect_gpu, log_info, log_warning};
use crate::utils::fetch_text;

/// OptiPatcher's game list lives in its entry point source
pub const OPTI_PATCHER_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/optiscaler/OptiPatcher/main/OptiPatcher/dllmain.cpp";

#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentInfo {
    pub is_wine: bool,
    pub is_nvidia: bool,
    pub gpu_name: String,
}

impl EnvironmentInfo {
    pub fn detect() -> Self {
        let is_wine = std::env::var_os("WINEDLLPATH").is_some();
        if is_wine {
            return Self {
                is_wine,
                is_nvidia: false,
                gpu_name: "Wine environment (detection skipped)".to_string(),
            };
        }

        let gpu_name = detect_gpu();
        let is_nvidia = has_nvidia_driver() || gpu_name.to_lowercase().contains("nvidia");
        log_info(&format!("GPU: {} (nvidia: {})", gpu_name, is_nvidia));

        Self {
            is_wine,
            is_nvidia,
            gpu_name,
        }
    }

    pub fn apply_to(&self, options: &mut InstallationOptions) {
        options.is_wine = self.is_wine;
        options.is_nvidia = self.is_nvidia;
    }
}

#[cfg(windows)]
fn has_nvidia_driver() -> bool {
    let system_root = std::env::var_os("SystemRoot").unwrap_or_else(|| "C:\\Windows".into());
    Path::new(&system_root)
        .join("System32")
        .join("nvapi64.dll")
        .is_file()
}

#[cfg(not(windows))]
fn has_nvidia_driver() -> bool {
    Path::new("/proc/driver/nvidia").exists()
}

// ============================================================================
// Unreal Engine layout
// ============================================================================

/// An `Engine` folder at the root means this is the launcher directory of an
/// Unreal game; the payload belongs next to the shipping executable instead.
pub fn has_unreal_engine_layout(dir: &Path) -> bool {
    dir.join("Engine").is_dir()
}

/// Directory holding the `*-Win64-Shipping.exe` / `*-WinGDK-Shipping.exe` binary
pub fn find_shipping_binaries(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .max_depth(4)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| {
            let name = e.file_name().to_string_lossy().to_lowercase();
            name.ends_with("-win64-shipping.exe") || name.ends_with("-wingdk-shipping.exe")
        })
        .and_then(|e| e.path().parent().map(Path::to_path_buf))
}

// ============================================================================
// OptiPatcher support
// ============================================================================

/// Whether OptiPatcher lists one of the executables in `dir`.
///
/// Needs network access; any failure counts as unsupported.
pub fn check_opti_patcher_support(dir: &Path) -> bool {
    let executables = list_executables(dir);
    if executables.is_empty() {
        return false;
    }

    match fetch_text(OPTI_PATCHER_SOURCE_URL) {
        Ok(source) => {
            let supported = supported_executables(&source);
            executables
                .iter()
                .any(|exe| supported.iter().any(|s| s.eq_ignore_ascii_case(exe)))
        }
        Err(e) => {
            log_warning(&format!("OptiPatcher support check failed: {}", e));
            false
        }
    }
}

/// Executable names referenced by the OptiPatcher source.
///
/// `CHECK_UE(Name)` stands for both `Name-win64-shipping.exe` and
/// `Name-wingdk-shipping.exe`; `exeName == "x.exe"` is taken literally.
pub fn supported_executables(source: &str) -> Vec<String> {
    let mut names = Vec::new();

    if let Ok(unreal) = Regex::new(r"CHECK_UE\s*\(\s*([a-zA-Z0-9_]+)\s*\)") {
        for cap in unreal.captures_iter(source) {
            names.push(format!("{}-win64-shipping.exe", &cap[1]));
            names.push(format!("{}-wingdk-shipping.exe", &cap[1]));
        }
    }
    if let Ok(direct) = Regex::new(r#"exeName\s*==\s*["']([^"']+)["']"#) {
        for cap in direct.captures_iter(source) {
            names.push(cap[1].to_string());
        }
    }

    names
}

fn list_executables(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
        })
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect()
}
