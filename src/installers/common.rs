//! Install errors, the install manifest and removal-script generation
//!
//! The manifest below is the single list of everything an install may place in
//! a game directory. Both `uninstall` and the generated removal scripts are
//! derived from it.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::logging::log_install;

// ============================================================================
// Shared Installation Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum InstallError {
    /// The selected version has no payload on disk
    #[error("{payload} not found in {}", .dir.display())]
    MissingSource { payload: String, dir: PathBuf },
    #[error("no OptiScaler installation detected in {}", .0.display())]
    NotInstalled(PathBuf),
    #[error("{} not found", .0.display())]
    MissingConfig(PathBuf),
    #[error("failed to download OptiPatcher: {0}")]
    PluginDownload(String),
    #[error("'{0}' is not a valid payload filename")]
    InvalidFilename(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ============================================================================
// Install Manifest
// ============================================================================

pub const LOG_FILE: &str = "OptiScaler.log";
pub const MARKER_CONFIG: &str = "OptiScaler.ini";

/// Files other OptiScaler bundles drop next to the payload
pub const COMPANION_FILES: &[&str] = &[
    "fakenvapi.dll",
    "fakenvapi.ini",
    "fakenvapi.log",
    "dlssg_to_fsr3_amd_is_better.dll",
    "dlssg_to_fsr3.log",
];

pub const PLUGINS_DIR: &str = "plugins";
pub const PLUGIN_FILE: &str = "OptiPatcher.asi";

/// Directories removed recursively on uninstall
pub const AUX_DIRS: &[&str] = &["D3D12_Optiscaler", "DlssOverrides", "Licenses"];

pub const WINDOWS_SCRIPT: &str = "Remove OptiScaler.bat";
pub const SHELL_SCRIPT: &str = "Remove OptiScaler.sh";

/// Every removal script name we might have written, on any platform
pub const REMOVAL_SCRIPTS: &[&str] = &[WINDOWS_SCRIPT, SHELL_SCRIPT];

/// Removal script flavour for the running platform
pub fn removal_script_name() -> &'static str {
    if cfg!(windows) {
        WINDOWS_SCRIPT
    } else {
        SHELL_SCRIPT
    }
}

/// Payload filenames must be a single plain path component that is safe to
/// quote inside the generated scripts.
pub fn validate_filename(name: &str) -> Result<(), InstallError> {
    let bad = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '"' | '%' | '$' | '`' | '\0'));
    if bad {
        return Err(InstallError::InvalidFilename(name.to_string()));
    }
    Ok(())
}

// ============================================================================
// Filesystem Helpers
// ============================================================================

/// Deletes a file; returns whether something was removed. Absence is not an error.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// ============================================================================
// Removal Scripts
// ============================================================================

/// Writes the platform's removal script into `target_dir`.
pub fn write_removal_script(target_dir: &Path, payload_filename: &str) -> Result<PathBuf, InstallError> {
    validate_filename(payload_filename)?;

    let path = target_dir.join(removal_script_name());
    let content = if cfg!(windows) {
        generate_windows_script(payload_filename)
    } else {
        generate_shell_script(payload_filename)
    };
    write_script(&path, &content)?;

    log_install(&format!("Created removal script {:?}", path));
    Ok(path)
}

fn write_script(path: &Path, content: &str) -> Result<(), InstallError> {
    let mut file = fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}

/// `cmd.exe` script; lines end in CRLF
pub fn generate_windows_script(payload_filename: &str) -> String {
    let mut lines = vec![
        "@echo off".to_string(),
        "cls".to_string(),
        "echo OptiScaler Uninstaller".to_string(),
        "echo.".to_string(),
        "set /p removeChoice=\"Do you want to remove OptiScaler? [y/n]: \"".to_string(),
        "if /i \"%removeChoice%\"==\"y\" (".to_string(),
    ];

    for file in [LOG_FILE, MARKER_CONFIG, payload_filename]
        .into_iter()
        .chain(COMPANION_FILES.iter().copied())
    {
        lines.push(format!("    if exist \"{0}\" del \"{0}\"", file));
    }
    lines.push(format!(
        "    if exist \"{0}\\{1}\" del \"{0}\\{1}\"",
        PLUGINS_DIR, PLUGIN_FILE
    ));
    lines.push(format!("    if exist \"{0}\" rmdir \"{0}\"", PLUGINS_DIR));
    for dir in AUX_DIRS {
        lines.push(format!("    if exist \"{0}\" rmdir /s /q \"{0}\"", dir));
    }
    lines.push("    echo OptiScaler removed!".to_string());
    lines.push("    pause".to_string());
    lines.push("    del %0".to_string());
    lines.push(")".to_string());

    let mut script = lines.join("\r\n");
    script.push_str("\r\n");
    script
}

/// bash script for Linux/macOS game directories (e.g. Proton prefixes)
pub fn generate_shell_script(payload_filename: &str) -> String {
    let mut files: Vec<String> = [LOG_FILE, MARKER_CONFIG, payload_filename]
        .into_iter()
        .chain(COMPANION_FILES.iter().copied())
        .map(|f| format!("    rm -f \"{}\"", f))
        .collect();
    files.push(format!("    rm -f \"{}/{}\"", PLUGINS_DIR, PLUGIN_FILE));

    let dirs: Vec<String> = AUX_DIRS
        .iter()
        .map(|d| format!("    rm -rf \"{}\"", d))
        .collect();

    format!(
        r#"#!/bin/bash
# OptiScaler removal script

cd "$(dirname "$0")" || exit 1

echo "OptiScaler Uninstaller"
echo ""
read -r -p "Do you want to remove OptiScaler? [y/n]: " removeChoice

if [ "$removeChoice" = "y" ] || [ "$removeChoice" = "Y" ]; then
{}
    rmdir "{}" 2>/dev/null
{}
    echo "OptiScaler removed!"
    rm -f -- "$0"
fi
"#,
        files.join("\n"),
        PLUGINS_DIR,
        dirs.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("dxgi.dll").is_ok());
        assert!(validate_filename("OptiScaler.asi").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("sub/dxgi.dll").is_err());
        assert!(validate_filename("C:dxgi.dll").is_err());
        assert!(validate_filename("dx\"gi.dll").is_err());
    }

    #[test]
    fn test_windows_script_lists_manifest() {
        let script = generate_windows_script("winmm.dll");

        assert!(script.starts_with("@echo off\r\n"));
        assert!(script.contains("[y/n]"));
        assert!(script.contains("if exist \"winmm.dll\" del \"winmm.dll\""));
        assert!(script.contains("if exist \"OptiScaler.ini\" del \"OptiScaler.ini\""));
        assert!(script.contains("if exist \"fakenvapi.dll\" del \"fakenvapi.dll\""));
        assert!(script.contains("del \"plugins\\OptiPatcher.asi\""));
        assert!(script.contains("rmdir /s /q \"D3D12_Optiscaler\""));
        assert!(script.ends_with("    del %0\r\n)\r\n"));
        assert!(!script.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn test_shell_script_lists_manifest() {
        let script = generate_shell_script("dxgi.dll");

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("[y/n]"));
        assert!(script.contains("    rm -f \"dxgi.dll\""));
        assert!(script.contains("    rm -f \"plugins/OptiPatcher.asi\""));
        assert!(script.contains("    rmdir \"plugins\" 2>/dev/null"));
        assert!(script.contains("    rm -rf \"Licenses\""));
        assert!(script.contains("rm -f -- \"$0\""));
    }

    #[test]
    fn test_write_removal_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_removal_script(dir.path(), "dxgi.dll").unwrap();

        assert_eq!(path.file_name().unwrap(), removal_script_name());
        assert!(fs::read_to_string(&path).unwrap().contains("dxgi.dll"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        assert!(matches!(
            write_removal_script(dir.path(), "../dxgi.dll"),
            Err(InstallError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_remove_helpers_tolerate_absence() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("OptiScaler.log");
        fs::write(&file, b"log").unwrap();

        assert!(remove_file_if_exists(&file).unwrap());
        assert!(!remove_file_if_exists(&file).unwrap());
        assert!(!remove_dir_all_if_exists(&dir.path().join("Licenses")).unwrap());
    }
}
