//! Per-game `OptiScaler.ini` settings editor
//!
//! Reads a handful of common settings out of an installed config and writes
//! back only the ones that changed, leaving every other byte of the file alone.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::common::{InstallError, MARKER_CONFIG};
use super::engine::{get_value, set_value};
use crate::logging::log_install;

const SPOOFING_KEY: &str = "Dxgi";
const OVERLAY_KEY: &str = "OverlayMenu";
const UPSCALER_KEY: &str = "Upscaler";
const RENDER_SCALE_KEY: &str = "RenderScale";
const SHARPNESS_KEY: &str = "Sharpness";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Upscaler {
    #[default]
    Auto,
    Dlss,
    Fsr2,
    Xess,
    Fsr3,
}

impl Upscaler {
    pub const ALL: [Upscaler; 5] = [
        Upscaler::Auto,
        Upscaler::Dlss,
        Upscaler::Fsr2,
        Upscaler::Xess,
        Upscaler::Fsr3,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Upscaler::Auto => "auto",
            Upscaler::Dlss => "dlss",
            Upscaler::Fsr2 => "fsr2",
            Upscaler::Xess => "xess",
            Upscaler::Fsr3 => "fsr3",
        }
    }
}

impl fmt::Display for Upscaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Upscaler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Upscaler::ALL
            .into_iter()
            .find(|u| u.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown upscaler '{}' (expected auto, dlss, fsr2, xess or fsr3)", s))
    }
}

/// The editable settings.
///
/// `render_scale` and `sharpness` are `None` while the file holds no number for
/// them (missing, or a non-numeric value such as `auto`).
#[derive(Debug, Clone, PartialEq)]
pub struct GameSettings {
    pub spoofing: bool,
    pub overlay: bool,
    pub upscaler: Upscaler,
    pub render_scale: Option<f32>,
    pub sharpness: Option<f32>,
}

impl GameSettings {
    pub fn from_content(content: &str) -> Self {
        let number = |key: &str| get_value(content, key).and_then(|v| v.parse::<f32>().ok());
        Self {
            spoofing: !get_value(content, SPOOFING_KEY).is_some_and(|v| v.eq_ignore_ascii_case("false")),
            overlay: get_value(content, OVERLAY_KEY).is_some_and(|v| v.eq_ignore_ascii_case("true")),
            // Unrecognised values read as auto
            upscaler: get_value(content, UPSCALER_KEY)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            render_scale: number(RENDER_SCALE_KEY),
            sharpness: number(SHARPNESS_KEY),
        }
    }
}

/// `OptiScaler.ini` of one game directory
#[derive(Debug, Clone)]
pub struct GameConfig {
    path: PathBuf,
    content: String,
    loaded: GameSettings,
    pub settings: GameSettings,
}

impl GameConfig {
    /// Reads `<dir>/OptiScaler.ini`; fails with `MissingConfig` when there is none.
    pub fn load(dir: &Path) -> Result<Self, InstallError> {
        let path = dir.join(MARKER_CONFIG);
        if !path.is_file() {
            return Err(InstallError::MissingConfig(path));
        }
        let content = fs::read_to_string(&path)?;
        let loaded = GameSettings::from_content(&content);
        Ok(Self {
            path,
            content,
            settings: loaded.clone(),
            loaded,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when `settings` differ from what was read
    pub fn is_modified(&self) -> bool {
        self.settings != self.loaded
    }

    /// Config text with the changed settings applied
    pub fn render(&self) -> String {
        let mut content = self.content.clone();
        let (old, new) = (&self.loaded, &self.settings);

        if new.spoofing != old.spoofing {
            let value = if new.spoofing { "auto" } else { "false" };
            content = set_value(&content, SPOOFING_KEY, None, value);
        }
        if new.overlay != old.overlay {
            content = set_value(&content, OVERLAY_KEY, None, if new.overlay { "true" } else { "false" });
        }
        if new.upscaler != old.upscaler {
            content = set_value(&content, UPSCALER_KEY, None, new.upscaler.as_str());
        }
        if new.render_scale != old.render_scale {
            if let Some(scale) = new.render_scale {
                content = set_value(&content, RENDER_SCALE_KEY, None, &format_number(scale));
            }
        }
        if new.sharpness != old.sharpness {
            if let Some(sharpness) = new.sharpness {
                content = set_value(&content, SHARPNESS_KEY, None, &format_number(sharpness));
            }
        }
        content
    }

    /// Writes the changed settings back. Does nothing when nothing changed.
    pub fn save(&mut self) -> Result<(), InstallError> {
        if !self.is_modified() {
            return Ok(());
        }
        let content = self.render();
        fs::write(&self.path, &content)?;
        log_install(&format!("Updated settings in {:?}", self.path));

        self.content = content;
        self.loaded = self.settings.clone();
        Ok(())
    }
}

fn format_number(value: f32) -> String {
    format!("{:.1}", value)
}
