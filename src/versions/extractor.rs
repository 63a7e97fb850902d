//! Archive extraction (zip / 7z) with path validation and wrapper-folder flattening
//!
//! Extraction is two-phase: every entry name is resolved and checked against
//! the destination first, and only when the whole archive passes is anything
//! written. A single bad entry aborts the archive with `PathTraversal`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use sevenz_rust::{Password, SevenZReader};
use walkdir::WalkDir;

use super::VersionError;
use crate::logging::{log_info, log_warning};

const ZIP_MAGIC: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
const SEVEN_Z_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Path comparison must follow the host filesystem's case rules
const CASE_INSENSITIVE_FS: bool = cfg!(any(windows, target_os = "macos"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    SevenZ,
}

impl ArchiveKind {
    /// Sniffs the magic bytes, falling back to the file extension.
    pub fn detect(path: &Path) -> Result<Self, VersionError> {
        let mut header = [0u8; 6];
        let read = {
            let mut file = fs::File::open(path)?;
            let mut n = 0;
            while n < header.len() {
                match file.read(&mut header[n..])? {
                    0 => break,
                    m => n += m,
                }
            }
            n
        };
        let header = &header[..read];

        if header.starts_with(SEVEN_Z_MAGIC) {
            return Ok(ArchiveKind::SevenZ);
        }
        if ZIP_MAGIC.iter().any(|m| header.starts_with(m)) {
            return Ok(ArchiveKind::Zip);
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "zip" => Ok(ArchiveKind::Zip),
            "7z" => Ok(ArchiveKind::SevenZ),
            _ => Err(VersionError::UnsupportedArchive(path.display().to_string())),
        }
    }
}

/// A validated archive entry
#[derive(Debug, Clone)]
struct PlannedEntry {
    target: PathBuf,
    is_dir: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts `archive` into `dest` and flattens wrapper folders.
    ///
    /// `dest` should be a fresh staging directory; nothing is written to it unless
    /// every entry of the archive resolves inside it.
    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<(), VersionError> {
        let kind = ArchiveKind::detect(archive)?;
        fs::create_dir_all(dest)?;

        match kind {
            ArchiveKind::Zip => {
                let plan = plan_zip(archive, dest)?;
                extract_zip(archive, &plan)?;
            }
            ArchiveKind::SevenZ => {
                let plan = plan_7z(archive, dest)?;
                extract_7z(archive, dest, &plan)?;
            }
        }

        flatten(dest)?;

        let files = WalkDir::new(dest)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .count();
        log_info(&format!("Extracted {} files from {:?}", files, archive.file_name().unwrap_or_default()));
        Ok(())
    }
}

// ============================================================================
// Entry Validation
// ============================================================================

/// Resolves an archive entry name against `dest`.
///
/// Returns `Ok(None)` for directory entries that name `dest` itself (e.g. `./`).
/// Fails for anything that would land outside `dest` or on `dest` itself:
/// `..` escapes, absolute paths, drive letters or UNC prefixes.
pub fn resolve_entry(dest: &Path, raw_name: &str) -> Result<Option<PathBuf>, VersionError> {
    let traversal = || VersionError::PathTraversal {
        entry: raw_name.to_string(),
    };

    let normalized = raw_name.replace('\\', "/");
    let is_dir = normalized.ends_with('/');

    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(traversal());
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                if parts.pop().is_none() {
                    return Err(traversal());
                }
            }
            p if p.contains(':') || p.contains('\0') => return Err(traversal()),
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return if is_dir { Ok(None) } else { Err(traversal()) };
    }

    let resolved = parts.iter().fold(dest.to_path_buf(), |acc, p| acc.join(p));
    if !is_strictly_within(dest, &resolved) {
        return Err(traversal());
    }
    Ok(Some(resolved))
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// True if `candidate` is below `root` (equality does not count).
fn is_strictly_within(root: &Path, candidate: &Path) -> bool {
    let root: Vec<String> = root.components().map(component_key).collect();
    let candidate: Vec<String> = candidate.components().map(component_key).collect();
    candidate.len() > root.len() && candidate[..root.len()] == root[..]
}

fn component_key(c: Component<'_>) -> String {
    let s = c.as_os_str().to_string_lossy();
    if CASE_INSENSITIVE_FS {
        s.to_lowercase()
    } else {
        s.into_owned()
    }
}

fn plan_entry(dest: &Path, name: &str, is_dir: bool) -> Result<Option<PlannedEntry>, VersionError> {
    Ok(resolve_entry(dest, name)?.map(|target| PlannedEntry {
        target,
        is_dir: is_dir || name.ends_with('/') || name.ends_with('\\'),
    }))
}

// ============================================================================
// Zip
// ============================================================================

fn zip_error(e: zip::result::ZipError) -> VersionError {
    VersionError::Archive(e.to_string())
}

fn plan_zip(archive_path: &Path, dest: &Path) -> Result<Vec<Option<PlannedEntry>>, VersionError> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;

    let mut plan = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(zip_error)?;
        plan.push(plan_entry(dest, entry.name(), entry.is_dir())?);
    }
    Ok(plan)
}

fn extract_zip(archive_path: &Path, plan: &[Option<PlannedEntry>]) -> Result<(), VersionError> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;

    for (i, planned) in plan.iter().enumerate() {
        let Some(planned) = planned else { continue };

        if planned.is_dir {
            fs::create_dir_all(&planned.target)?;
            continue;
        }

        if let Some(parent) = planned.target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entry = archive.by_index(i).map_err(zip_error)?;
        let mut out = fs::File::create(&planned.target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

// ============================================================================
// 7z
// ============================================================================

fn sevenz_error(e: sevenz_rust::Error) -> VersionError {
    VersionError::Archive(e.to_string())
}

fn plan_7z(archive_path: &Path, dest: &Path) -> Result<HashMap<String, PlannedEntry>, VersionError> {
    let reader = SevenZReader::open(archive_path, Password::empty()).map_err(sevenz_error)?;

    let mut plan = HashMap::new();
    for entry in &reader.archive().files {
        if let Some(planned) = plan_entry(dest, entry.name(), entry.is_directory())? {
            plan.insert(entry.name().to_string(), planned);
        }
    }
    Ok(plan)
}

fn extract_7z(
    archive_path: &Path,
    dest: &Path,
    plan: &HashMap<String, PlannedEntry>,
) -> Result<(), VersionError> {
    let mut reader = SevenZReader::open(archive_path, Password::empty()).map_err(sevenz_error)?;
    let mut failure: Option<VersionError> = None;

    reader
        .for_each_entries(|entry, data| {
            // Empty entries are visited in a second pass even after a stop
            if failure.is_some() {
                return Ok(false);
            }
            let Some(planned) = plan.get(entry.name()) else {
                // Directory entries naming the root itself
                return Ok(true);
            };
            if let Err(e) = write_7z_entry(planned, data) {
                failure = Some(e.into());
                return Ok(false);
            }
            Ok(true)
        })
        .map_err(sevenz_error)?;

    if let Some(e) = failure {
        log_warning(&format!("7z extraction into {:?} aborted: {}", dest, e));
        return Err(e);
    }
    Ok(())
}

fn write_7z_entry(planned: &PlannedEntry, data: &mut dyn Read) -> io::Result<()> {
    if planned.is_dir {
        return fs::create_dir_all(&planned.target);
    }
    if let Some(parent) = planned.target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = fs::File::create(&planned.target)?;
    io::copy(data, &mut out)?;
    Ok(())
}

// ============================================================================
// Flattening
// ============================================================================

/// Collapses single wrapper folders: while `dir` holds no files and exactly one
/// subdirectory, that subdirectory's contents move up one level.
///
/// Running it on an already flat directory does nothing.
pub fn flatten(dir: &Path) -> io::Result<()> {
    loop {
        let (files, dirs) = split_entries(dir)?;
        if !files.is_empty() || dirs.len() != 1 {
            return Ok(());
        }

        // Park the wrapper under a unique name first; its children may share its name
        let wrapper = &dirs[0];
        let parked = dir.join(format!(".flatten-{:016x}", rand::random::<u64>()));
        fs::rename(wrapper, &parked)?;

        move_into(&parked, dir)?;
        fs::remove_dir(&parked)?;
    }
}

fn split_entries(dir: &Path) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        } else {
            files.push(entry.path());
        }
    }
    Ok((files, dirs))
}

/// Moves everything inside `src` into `dst`, merging directories that already
/// exist and overwriting files. `src` is left empty.
fn move_into(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            if to.is_dir() {
                move_into(&from, &to)?;
                fs::remove_dir(&from)?;
            } else {
                if to.exists() {
                    fs::remove_file(&to)?;
                }
                fs::rename(&from, &to)?;
            }
        } else {
            if to.is_dir() {
                fs::remove_dir_all(&to)?;
            } else if to.exists() {
                fs::remove_file(&to)?;
            }
            fs::rename(&from, &to)?;
        }
    }
    Ok(())
}
