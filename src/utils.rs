//! Shared utility functions used across the application

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::Path;

/// User-Agent sent with every request (GitHub rejects anonymous agents)
pub const USER_AGENT: &str = concat!("Optinstaller/", env!("CARGO_PKG_VERSION"), " (OptiScaler Manager)");

/// Download a file from URL to the specified path
pub fn download_file(url: &str, path: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let resp = ureq::get(url).set("User-Agent", USER_AGENT).call()?;
    let mut reader = resp.into_reader();
    let mut file = fs::File::create(path)?;
    std::io::copy(&mut reader, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Fetch a URL as text
pub fn fetch_text(url: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let resp = ureq::get(url).set("User-Agent", USER_AGENT).call()?;
    Ok(resp.into_string()?)
}
