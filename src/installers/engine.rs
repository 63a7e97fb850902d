//! Install / update / uninstall of a payload into a game directory

use std::fs;
use std::path::{Path, PathBuf};

use super::common::{
    remove_dir_all_if_exists, remove_file_if_exists, validate_filename, write_removal_script,
    InstallError, AUX_DIRS, COMPANION_FILES, LOG_FILE, MARKER_CONFIG, PLUGINS_DIR, PLUGIN_FILE,
    REMOVAL_SCRIPTS,
};
use super::metadata::{PeVersionReader, VersionMetadataReader};
use super::InstallationOptions;
use crate::logging::{log_info, log_install, log_warning};
use crate::tasks::TaskContext;
use crate::utils::download_file;
use crate::versions::PAYLOAD_FILENAME;

pub const OPTI_PATCHER_URL: &str =
    "https://github.com/optiscaler/OptiPatcher/releases/download/rolling/OptiPatcher.asi";

/// Filenames the payload may be installed under, in detection order
pub const CANDIDATE_FILENAMES: &[&str] = &[
    "dxgi.dll",
    "winmm.dll",
    "version.dll",
    "dbghelp.dll",
    "d3d12.dll",
    "wininet.dll",
    "winhttp.dll",
    "OptiScaler.asi",
];

pub const DEFAULT_TARGET_FILENAME: &str = "dxgi.dll";

pub const NOT_INSTALLED: &str = "Not Installed";
pub const UNKNOWN_VERSION: &str = "Unknown";

/// Name embedded in the payload's version resource
const PRODUCT_MARKER: &str = "OptiScaler";

const SPOOFING_KEY: &str = "Dxgi";
const PLUGIN_LOADING_KEY: &str = "LoadAsiPlugins";

/// Result of inspecting a game directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub installed: bool,
    /// Empty when nothing was found
    pub payload_filename: String,
    /// Display version, or [`NOT_INSTALLED`] / [`UNKNOWN_VERSION`]
    pub version: String,
}

impl Detection {
    fn not_installed() -> Self {
        Self {
            installed: false,
            payload_filename: String::new(),
            version: NOT_INSTALLED.to_string(),
        }
    }
}

pub struct InstallEngine {
    reader: Box<dyn VersionMetadataReader>,
    plugin_url: String,
}

impl Default for InstallEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallEngine {
    pub fn new() -> Self {
        Self::with_reader(PeVersionReader)
    }

    pub fn with_reader(reader: impl VersionMetadataReader + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            plugin_url: OPTI_PATCHER_URL.to_string(),
        }
    }

    /// Overrides where OptiPatcher is downloaded from
    pub fn with_plugin_url(mut self, url: impl Into<String>) -> Self {
        self.plugin_url = url.into();
        self
    }

    // ========================================================================
    // Detection
    // ========================================================================

    /// Installed means: the marker config exists and one of the candidate files
    /// carries OptiScaler version metadata. The first such candidate wins.
    pub fn detect(&self, target_dir: &Path) -> Detection {
        if !target_dir.join(MARKER_CONFIG).is_file() {
            return Detection::not_installed();
        }

        for name in CANDIDATE_FILENAMES {
            let path = target_dir.join(name);
            if !path.is_file() {
                continue;
            }
            let Some(info) = self.reader.read_version_info(&path) else {
                log_warning(&format!("Could not read version metadata of {:?}", path));
                continue;
            };
            if info.mentions(PRODUCT_MARKER) {
                return Detection {
                    installed: true,
                    payload_filename: name.to_string(),
                    version: info
                        .display_version()
                        .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
                };
            }
        }

        Detection::not_installed()
    }

    // ========================================================================
    // Install
    // ========================================================================

    /// Copies the payload (and config if absent), patches the config, and
    /// optionally fetches OptiPatcher and writes a removal script.
    ///
    /// Only a missing source payload aborts before the target is touched. Later
    /// failures leave earlier steps in place.
    pub fn install(&self, options: &InstallationOptions, ctx: &TaskContext) -> Result<(), InstallError> {
        validate_filename(&options.target_filename)?;
        let source = source_payload(&options.version_path)?;
        let target_dir = &options.target_dir;

        log_install(&format!(
            "Installing {:?} into {:?} as {} (spoofing: {}, OptiPatcher: {}, nvidia: {}, wine: {})",
            options.version_path,
            target_dir,
            options.target_filename,
            options.enable_spoofing,
            options.use_opti_patcher,
            options.is_nvidia,
            options.is_wine,
        ));

        ctx.set_status(format!("Copying {}...", options.target_filename));
        let dest = target_dir.join(&options.target_filename);
        remove_file_if_exists(&dest)?;
        fs::copy(&source, &dest)?;

        ctx.set_status("Configuring...".to_string());
        let config = target_dir.join(MARKER_CONFIG);
        let bundled_config = options.version_path.join(MARKER_CONFIG);
        if !config.exists() && bundled_config.is_file() {
            fs::copy(&bundled_config, &config)?;
            log_install(&format!("Copied {} into {:?}", MARKER_CONFIG, target_dir));
        }
        if config.is_file() {
            let content = fs::read_to_string(&config)?;
            let patched = patch_config(&content, options.enable_spoofing, options.use_opti_patcher);
            if patched != content {
                fs::write(&config, patched)?;
                log_install(&format!("Patched {:?}", config));
            }
        } else {
            log_warning(&format!(
                "No {} at the target or in the version; skipping configuration",
                MARKER_CONFIG
            ));
        }

        if options.use_opti_patcher {
            ctx.set_status("Downloading OptiPatcher...".to_string());
            let plugins = target_dir.join(PLUGINS_DIR);
            fs::create_dir_all(&plugins)?;
            download_file(&self.plugin_url, &plugins.join(PLUGIN_FILE))
                .map_err(|e| InstallError::PluginDownload(e.to_string()))?;
            log_install(&format!("OptiPatcher placed in {:?}", plugins));
        }

        if options.create_uninstaller {
            write_removal_script(target_dir, &options.target_filename)?;
        }

        ctx.set_status("Installation complete".to_string());
        log_install("Installation complete");
        Ok(())
    }

    /// Swaps only the payload binary. Config and other files stay as installed.
    pub fn update_payload(
        &self,
        target_dir: &Path,
        version_path: &Path,
        payload_filename: &str,
    ) -> Result<(), InstallError> {
        validate_filename(payload_filename)?;
        let source = source_payload(version_path)?;

        let dest = target_dir.join(payload_filename);
        remove_file_if_exists(&dest)?;
        fs::copy(&source, &dest)?;

        log_install(&format!("Updated {:?} from {:?}", dest, version_path));
        Ok(())
    }

    // ========================================================================
    // Uninstall
    // ========================================================================

    /// Removes everything in the install manifest. Missing items are skipped.
    pub fn uninstall(&self, target_dir: &Path, installed_filename: &str) -> Result<(), InstallError> {
        let mut files: Vec<&str> = vec![LOG_FILE, MARKER_CONFIG];
        if !installed_filename.is_empty() {
            validate_filename(installed_filename)?;
            files.push(installed_filename);
        }
        files.extend(COMPANION_FILES);
        files.extend(REMOVAL_SCRIPTS);

        let mut removed = 0;
        for file in files {
            if remove_file_if_exists(&target_dir.join(file))? {
                removed += 1;
            }
        }

        let plugins = target_dir.join(PLUGINS_DIR);
        if remove_file_if_exists(&plugins.join(PLUGIN_FILE))? {
            removed += 1;
        }
        if plugins.is_dir() && fs::read_dir(&plugins)?.next().is_none() {
            fs::remove_dir(&plugins)?;
        }

        for dir in AUX_DIRS {
            if remove_dir_all_if_exists(&target_dir.join(dir))? {
                removed += 1;
            }
        }

        log_install(&format!("Uninstalled from {:?} ({} items removed)", target_dir, removed));
        Ok(())
    }
}

fn source_payload(version_path: &Path) -> Result<PathBuf, InstallError> {
    let source = version_path.join(PAYLOAD_FILENAME);
    if !source.is_file() {
        return Err(InstallError::MissingSource {
            payload: PAYLOAD_FILENAME.to_string(),
            dir: version_path.to_path_buf(),
        });
    }
    Ok(source)
}

// ============================================================================
// Config Patching
// ============================================================================

/// Applies the install choices to `OptiScaler.ini` text.
///
/// Spoofing off forces `Dxgi=false` (from `auto` or `true`); OptiPatcher on
/// forces `LoadAsiPlugins=true` (from `auto` or `false`).
pub fn patch_config(content: &str, enable_spoofing: bool, use_opti_patcher: bool) -> String {
    let mut content = content.to_string();
    if !enable_spoofing {
        content = set_value(&content, SPOOFING_KEY, Some(&["auto", "true"][..]), "false");
    }
    if use_opti_patcher {
        content = set_value(&content, PLUGIN_LOADING_KEY, Some(&["auto", "false"][..]), "true");
    }
    content
}

/// Rewrites the value of every `key` assignment whose current value is one of
/// `from` (any value when `from` is `None`); appends `key=to` when no line
/// assigns `key` at all.
///
/// Only the value itself is replaced. Indentation, spacing around `=`, inline
/// `;` comments and line endings stay as they were, and untouched lines keep
/// their bytes.
pub(crate) fn set_value(content: &str, key: &str, from: Option<&[&str]>, to: &str) -> String {
    let line_ending = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let mut out = String::with_capacity(content.len() + key.len() + 8);
    let mut key_present = false;

    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);

        let Some(assignment) = parse_assignment(body).filter(|a| a.key.eq_ignore_ascii_case(key)) else {
            out.push_str(line);
            continue;
        };
        key_present = true;

        let replace = from.map_or(true, |values| values.iter().any(|v| *v == assignment.value));
        if replace {
            out.push_str(&body[..assignment.value_start]);
            out.push_str(to);
            out.push_str(&line[assignment.value_end..]);
        } else {
            out.push_str(line);
        }
    }

    if !key_present {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push_str(line_ending);
        }
        out.push_str(&format!("{}={}{}", key, to, line_ending));
        log_info(&format!("{} not present in config; appended {}={}", key, key, to));
    }

    out
}

/// Value of the first line assigning `key`
pub(crate) fn get_value<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content
        .lines()
        .filter_map(parse_assignment)
        .find(|a| a.key.eq_ignore_ascii_case(key))
        .map(|a| a.value)
}

/// `key = value ; comment`, with the value's byte range inside the line
#[derive(Debug, PartialEq)]
struct Assignment<'a> {
    key: &'a str,
    value: &'a str,
    value_start: usize,
    value_end: usize,
}

fn parse_assignment(line: &str) -> Option<Assignment<'_>> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with([';', '#', '[']) {
        return None;
    }

    let eq = line.find('=')?;
    let key = line[..eq].trim();
    if key.is_empty() {
        return None;
    }

    let rest = &line[eq + 1..];
    let raw = &rest[..inline_comment_start(rest)];
    let value = raw.trim();
    let value_start = eq + 1 + (raw.len() - raw.trim_start().len());
    Some(Assignment {
        key,
        value,
        value_start,
        value_end: value_start + value.len(),
    })
}

/// A `;` or `#` at the start of the value or after whitespace opens a comment
fn inline_comment_start(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    (0..bytes.len())
        .find(|&i| matches!(bytes[i], b';' | b'#') && (i == 0 || bytes[i - 1].is_ascii_whitespace()))
        .unwrap_or(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installers::metadata::VersionInfo;
    use std::io::{BufRead, BufReader, Write};
    use crate::installers::common::removal_script_name;
    use std::net::TcpListener;

    /// Reports OptiScaler metadata for any file whose content starts with "OPTI"
    fn fake_engine() -> InstallEngine {
        InstallEngine::with_reader(|path: &Path| {
            let data = fs::read(path).ok()?;
            if data.starts_with(b"OPTI") {
                Some(VersionInfo {
                    product_name: Some("OptiScaler".to_string()),
                    file_version: Some("0.7.9.0".to_string()),
                    ..Default::default()
                })
            } else {
                Some(VersionInfo {
                    product_name: Some("Microsoft Windows".to_string()),
                    ..Default::default()
                })
            }
        })
    }

    fn version_dir(root: &Path, ini: Option<&str>) -> PathBuf {
        let dir = root.join("Versions").join("v0.7.9");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PAYLOAD_FILENAME), b"OPTI payload").unwrap();
        if let Some(ini) = ini {
            fs::write(dir.join(MARKER_CONFIG), ini).unwrap();
        }
        dir
    }

    fn game_dir(root: &Path) -> PathBuf {
        let dir = root.join("Game");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn options(game: &Path, version: &Path) -> InstallationOptions {
        let mut options = InstallationOptions::new(game, version);
        options.create_uninstaller = false;
        options
    }

    fn serve_once(body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                let mut stream = stream;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(body);
            }
        });
        format!("http://{}/OptiPatcher.asi", addr)
    }

    #[test]
    fn test_patch_spoofing_keeps_other_bytes() {
        let input = "[Spoofing]\r\n; Dxgi=auto\r\n  Dxgi=auto\r\nStreamlineSpoofing=auto\r\n[Plugins]\r\nLoadAsiPlugins=auto\r\n";
        let output = patch_config(input, false, false);
        assert_eq!(
            output,
            "[Spoofing]\r\n; Dxgi=auto\r\n  Dxgi=false\r\nStreamlineSpoofing=auto\r\n[Plugins]\r\nLoadAsiPlugins=auto\r\n"
        );
    }

    #[test]
    fn test_patch_handles_true_and_plugins() {
        let input = "Dxgi=true\nLoadAsiPlugins=false\n";
        assert_eq!(patch_config(input, false, true), "Dxgi=false\nLoadAsiPlugins=true\n");
        // Spoofing requested leaves the value alone
        assert_eq!(patch_config(input, true, false), input);
    }

    #[test]
    fn test_patch_appends_missing_key() {
        assert_eq!(patch_config("[Spoofing]\r\n", false, false), "[Spoofing]\r\nDxgi=false\r\n");
        assert_eq!(patch_config("[Plugins]", true, true), "[Plugins]\nLoadAsiPlugins=true\n");
        // A key set to something else counts as present
        assert_eq!(patch_config("Dxgi = custom\n", false, false), "Dxgi = custom\n");
    }

    #[test]
    fn test_patch_keeps_inline_comments() {
        assert_eq!(
            patch_config("[Spoofing]\nDxgi=auto ; auto|true|false\n", false, false),
            "[Spoofing]\nDxgi=false ; auto|true|false\n"
        );
        assert_eq!(
            patch_config("\tDxgi = true\t# forced\r\n", false, false),
            "\tDxgi = false\t# forced\r\n"
        );
        // `;` inside a value is not a comment
        assert_eq!(patch_config("Dxgi=auto;x\n", false, false), "Dxgi=auto;x\n");
    }

    #[test]
    fn test_parse_assignment() {
        let a = parse_assignment("  Upscaler = fsr2 ; auto|dlss").unwrap();
        assert_eq!((a.key, a.value), ("Upscaler", "fsr2"));
        assert_eq!(&"  Upscaler = fsr2 ; auto|dlss"[a.value_start..a.value_end], "fsr2");

        let empty = parse_assignment("Sharpness=").unwrap();
        assert_eq!(empty.value, "");

        assert!(parse_assignment("; Dxgi=auto").is_none());
        assert!(parse_assignment("[Spoofing]").is_none());
        assert!(parse_assignment("=auto").is_none());
        assert!(parse_assignment("no assignment").is_none());
    }

    #[test]
    fn test_get_value_skips_comments() {
        let content = "; Upscaler=dlss\n[Upscalers]\nupscaler=xess ; note\nUpscaler=fsr3\n";
        assert_eq!(get_value(content, "Upscaler"), Some("xess"));
        assert_eq!(get_value(content, "RenderScale"), None);
    }

    #[test]
    fn test_detect_requires_marker_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine();

        fs::write(dir.path().join("dxgi.dll"), b"OPTI").unwrap();
        assert_eq!(engine.detect(dir.path()), Detection::not_installed());

        fs::write(dir.path().join(MARKER_CONFIG), "").unwrap();
        let detection = engine.detect(dir.path());
        assert!(detection.installed);
        assert_eq!(detection.payload_filename, "dxgi.dll");
        assert_eq!(detection.version, "0.7.9");
    }

    #[test]
    fn test_detect_skips_foreign_dlls() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine();
        fs::write(dir.path().join(MARKER_CONFIG), "").unwrap();
        fs::write(dir.path().join("dxgi.dll"), b"MZ system dll").unwrap();
        fs::write(dir.path().join("winmm.dll"), b"OPTI").unwrap();

        let detection = engine.detect(dir.path());
        assert!(detection.installed);
        assert_eq!(detection.payload_filename, "winmm.dll");

        fs::remove_file(dir.path().join("winmm.dll")).unwrap();
        assert!(!engine.detect(dir.path()).installed);
    }

    #[test]
    fn test_detect_with_pe_reader() {
        let dir = tempfile::tempdir().unwrap();
        let pe = crate::installers::metadata::tests::synthetic_pe(
            &[("ProductName", "OptiScaler"), ("FileVersion", "0.7.9.0")],
            (0x0000_0007, 0x0009_0000),
        );
        fs::write(dir.path().join(MARKER_CONFIG), "").unwrap();
        fs::write(dir.path().join("d3d12.dll"), pe).unwrap();

        let detection = InstallEngine::new().detect(dir.path());
        assert!(detection.installed);
        assert_eq!(detection.payload_filename, "d3d12.dll");
        assert_eq!(detection.version, "0.7.9");
    }

    #[test]
    fn test_detect_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let engine = InstallEngine::with_reader(|_: &Path| {
            Some(VersionInfo {
                file_description: Some("OptiScaler upscaler".to_string()),
                ..Default::default()
            })
        });
        fs::write(dir.path().join(MARKER_CONFIG), "").unwrap();
        fs::write(dir.path().join("OptiScaler.asi"), b"x").unwrap();

        let detection = engine.detect(dir.path());
        assert_eq!(detection.payload_filename, "OptiScaler.asi");
        assert_eq!(detection.version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_install_copies_and_patches() {
        let dir = tempfile::tempdir().unwrap();
        let version = version_dir(dir.path(), Some("[Spoofing]\nDxgi=auto\n"));
        let game = game_dir(dir.path());

        let mut opts = options(&game, &version);
        opts.enable_spoofing = false;
        opts.create_uninstaller = true;
        fake_engine().install(&opts, &TaskContext::silent()).unwrap();

        assert_eq!(fs::read(game.join("dxgi.dll")).unwrap(), b"OPTI payload");
        assert_eq!(
            fs::read_to_string(game.join(MARKER_CONFIG)).unwrap(),
            "[Spoofing]\nDxgi=false\n"
        );
        assert!(game.join(removal_script_name()).is_file());
        assert!(fake_engine().detect(&game).installed);
    }

    #[test]
    fn test_install_never_overwrites_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        let version = version_dir(dir.path(), Some("Dxgi=auto\nFresh=1\n"));
        let game = game_dir(dir.path());
        fs::write(game.join(MARKER_CONFIG), "Dxgi=auto\nUserTweak=1\n").unwrap();

        fake_engine()
            .install(&options(&game, &version), &TaskContext::silent())
            .unwrap();

        assert_eq!(
            fs::read_to_string(game.join(MARKER_CONFIG)).unwrap(),
            "Dxgi=auto\nUserTweak=1\n"
        );
    }

    #[test]
    fn test_install_without_any_config_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let version = version_dir(dir.path(), None);
        let game = game_dir(dir.path());

        let mut opts = options(&game, &version);
        opts.target_filename = "winmm.dll".to_string();
        fake_engine().install(&opts, &TaskContext::silent()).unwrap();

        assert!(game.join("winmm.dll").is_file());
        assert!(!game.join(MARKER_CONFIG).exists());
    }

    #[test]
    fn test_install_missing_source_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let version = dir.path().join("Versions").join("empty");
        fs::create_dir_all(&version).unwrap();
        let game = game_dir(dir.path());

        let err = fake_engine()
            .install(&options(&game, &version), &TaskContext::silent())
            .unwrap_err();

        assert!(matches!(err, InstallError::MissingSource { .. }));
        assert_eq!(fs::read_dir(&game).unwrap().count(), 0);
    }

    #[test]
    fn test_install_downloads_opti_patcher() {
        let dir = tempfile::tempdir().unwrap();
        let version = version_dir(dir.path(), Some("LoadAsiPlugins=false\n"));
        let game = game_dir(dir.path());

        let engine = fake_engine().with_plugin_url(serve_once(b"ASI plugin"));
        let mut opts = options(&game, &version);
        opts.use_opti_patcher = true;
        engine.install(&opts, &TaskContext::silent()).unwrap();

        assert_eq!(
            fs::read(game.join(PLUGINS_DIR).join(PLUGIN_FILE)).unwrap(),
            b"ASI plugin"
        );
        assert_eq!(
            fs::read_to_string(game.join(MARKER_CONFIG)).unwrap(),
            "LoadAsiPlugins=true\n"
        );
    }

    #[test]
    fn test_install_plugin_failure_keeps_earlier_steps() {
        let dir = tempfile::tempdir().unwrap();
        let version = version_dir(dir.path(), Some("Dxgi=auto\n"));
        let game = game_dir(dir.path());

        let engine = fake_engine().with_plugin_url("http://127.0.0.1:9/OptiPatcher.asi");
        let mut opts = options(&game, &version);
        opts.use_opti_patcher = true;
        let err = engine.install(&opts, &TaskContext::silent()).unwrap_err();

        assert!(matches!(err, InstallError::PluginDownload(_)));
        assert!(game.join("dxgi.dll").is_file());
    }

    #[test]
    fn test_update_payload_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let version = version_dir(dir.path(), Some("Dxgi=auto\n"));
        let game = game_dir(dir.path());
        fs::write(game.join(MARKER_CONFIG), "Dxgi=false\nUserTweak=1\n").unwrap();
        fs::write(game.join("dxgi.dll"), b"OPTI old").unwrap();

        fake_engine().update_payload(&game, &version, "dxgi.dll").unwrap();

        assert_eq!(fs::read(game.join("dxgi.dll")).unwrap(), b"OPTI payload");
        assert_eq!(
            fs::read_to_string(game.join(MARKER_CONFIG)).unwrap(),
            "Dxgi=false\nUserTweak=1\n"
        );

        let missing = dir.path().join("nothing");
        assert!(matches!(
            fake_engine().update_payload(&game, &missing, "dxgi.dll"),
            Err(InstallError::MissingSource { .. })
        ));
    }

    #[test]
    fn test_uninstall_empties_minimal_install() {
        let dir = tempfile::tempdir().unwrap();
        let game = game_dir(dir.path());
        fs::write(game.join(MARKER_CONFIG), "Dxgi=auto\n").unwrap();
        fs::write(game.join("dxgi.dll"), b"OPTI").unwrap();

        let engine = fake_engine();
        let detection = engine.detect(&game);
        engine.uninstall(&game, &detection.payload_filename).unwrap();

        assert_eq!(fs::read_dir(&game).unwrap().count(), 0);
    }

    #[test]
    fn test_uninstall_full_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let version = version_dir(dir.path(), Some("Dxgi=auto\n"));
        let game = game_dir(dir.path());
        fs::write(game.join("Game.exe"), b"MZ").unwrap();

        let mut opts = options(&game, &version);
        opts.create_uninstaller = true;
        fake_engine().install(&opts, &TaskContext::silent()).unwrap();

        for file in ["OptiScaler.log", "fakenvapi.dll", "dlssg_to_fsr3.log"] {
            fs::write(game.join(file), b"x").unwrap();
        }
        fs::create_dir_all(game.join("Licenses").join("nested")).unwrap();
        fs::write(game.join("Licenses").join("nested").join("LICENSE"), b"x").unwrap();
        fs::create_dir_all(game.join(PLUGINS_DIR)).unwrap();
        fs::write(game.join(PLUGINS_DIR).join(PLUGIN_FILE), b"asi").unwrap();

        fake_engine().uninstall(&game, "dxgi.dll").unwrap();

        let mut left: Vec<String> = fs::read_dir(&game)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        assert_eq!(left, vec!["Game.exe"]);
    }

    #[test]
    fn test_uninstall_keeps_foreign_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let game = game_dir(dir.path());
        fs::create_dir_all(game.join(PLUGINS_DIR)).unwrap();
        fs::write(game.join(PLUGINS_DIR).join(PLUGIN_FILE), b"asi").unwrap();
        fs::write(game.join(PLUGINS_DIR).join("other.asi"), b"asi").unwrap();

        fake_engine().uninstall(&game, "").unwrap();

        assert!(!game.join(PLUGINS_DIR).join(PLUGIN_FILE).exists());
        assert!(game.join(PLUGINS_DIR).join("other.asi").is_file());
    }
}
