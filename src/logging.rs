//! Optinstaller Logging System
//!
//! Provides structured logging with system information header

use chrono::Local;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::process::Command;
use std::sync::{Arc, OnceLock};

static LOGGER: OnceLock<Arc<Mutex<OptiLogger>>> = OnceLock::new();

// ============================================================================
// System Information Detection
// ============================================================================

#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub app_version: String,
    pub os: String,
    pub distro: String,
    pub kernel: String,
    pub gpu: String,
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            distro: detect_distro(),
            kernel: detect_kernel(),
            gpu: detect_gpu(),
        }
    }

    pub fn to_log_header(&self) -> String {
        format!(
r#"================================================================================
Optinstaller Log - {}
================================================================================
Application:   Optinstaller v{}
System Info:
  OS:          {}
  Distro:      {}
  Kernel:      {}
  GPU:         {}
================================================================================
"#,
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.app_version,
            self.os,
            self.distro,
            self.kernel,
            self.gpu,
        )
    }
}

fn detect_distro() -> String {
    if let Ok(file) = File::open("/etc/os-release") {
        let reader = BufReader::new(file);
        for line in reader.lines().map_while(Result::ok) {
            if line.starts_with("PRETTY_NAME=") {
                return line
                    .trim_start_matches("PRETTY_NAME=")
                    .trim_matches('"')
                    .to_string();
            }
        }
    }
    "Unknown".to_string()
}

fn detect_kernel() -> String {
    if let Ok(output) = Command::new("uname").arg("-r").output() {
        if output.status.success() {
            return String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
    }
    "Unknown".to_string()
}

/// Best-effort GPU name from `lspci`, shared with the environment probes.
pub fn detect_gpu() -> String {
    if let Ok(output) = Command::new("lspci").output() {
        if output.status.success() {
            let output_str = String::from_utf8_lossy(&output.stdout);
            for line in output_str.lines() {
                if line.contains("VGA") || line.contains("3D") || line.contains("Display") {
                    if let Some(device) = line.split(':').next_back() {
                        let gpu = device.trim();
                        if gpu.chars().count() > 60 {
                            let short: String = gpu.chars().take(57).collect();
                            return format!("{}...", short);
                        }
                        return gpu.to_string();
                    }
                }
            }
        }
    }
    "Unknown".to_string()
}

// ============================================================================
// Log Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Info,
    Action, // User-issued commands
    Download,
    Install,
    Warning,
    Error,
}

impl LogLevel {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Info => "[INFO]",
            LogLevel::Action => "[ACTION]",
            LogLevel::Download => "[DOWNLOAD]",
            LogLevel::Install => "[INSTALL]",
            LogLevel::Warning => "[WARNING]",
            LogLevel::Error => "[ERROR]",
        }
    }
}

// ============================================================================
// Optinstaller Logger
// ============================================================================

pub struct OptiLogger {
    log_file: Option<File>,
}

impl OptiLogger {
    pub fn new() -> Self {
        // Unit tests log to the console only
        let log_file = if cfg!(test) { None } else { open_log_file() };
        let mut logger = Self { log_file };

        // Header goes to the file only; the console gets plain log lines
        if let Some(ref mut file) = logger.log_file {
            let header = SystemInfo::detect().to_log_header();
            let _ = writeln!(file, "{}", header);
            let _ = file.flush();
        }

        logger
    }

    fn write_raw(&mut self, msg: &str) {
        if let Some(ref mut file) = self.log_file {
            let _ = writeln!(file, "{}", msg);
            let _ = file.flush();
        }

        // stdout belongs to command output
        eprintln!("{}", msg);
    }

    pub fn log(&mut self, level: LogLevel, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S");
        let formatted = format!("[{}] {} {}", timestamp, level.prefix(), message);
        self.write_raw(&formatted);
    }
}

impl Default for OptiLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// `<data>/logs/optinstaller_<timestamp>.log`
fn open_log_file() -> Option<File> {
    let log_dir = opti_path!("logs");
    let _ = fs::create_dir_all(&log_dir);

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("optinstaller_{}.log", timestamp));

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()
}

// ============================================================================
// Global Logger Access
// ============================================================================

/// Initialize the global logger (call once at startup)
pub fn init_logger() {
    LOGGER.get_or_init(|| Arc::new(Mutex::new(OptiLogger::new())));
}

fn logger() -> Arc<Mutex<OptiLogger>> {
    LOGGER
        .get_or_init(|| Arc::new(Mutex::new(OptiLogger::new())))
        .clone()
}

// ============================================================================
// Convenience Logging Functions
// ============================================================================

pub fn log_info(message: &str) {
    logger().lock().log(LogLevel::Info, message);
}

pub fn log_action(message: &str) {
    logger().lock().log(LogLevel::Action, message);
}

pub fn log_download(message: &str) {
    logger().lock().log(LogLevel::Download, message);
}

pub fn log_install(message: &str) {
    logger().lock().log(LogLevel::Install, message);
}

pub fn log_warning(message: &str) {
    logger().lock().log(LogLevel::Warning, message);
}

pub fn log_error(message: &str) {
    logger().lock().log(LogLevel::Error, message);
}
