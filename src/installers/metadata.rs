//! Embedded version metadata of PE binaries (the `VS_VERSIONINFO` resource)
//!
//! Only what install detection needs is parsed: the first string table plus the
//! fixed file/product version numbers. Anything malformed yields `None`.

use std::fs;
use std::path::Path;

/// Resource type id of version resources
const RT_VERSION: u32 = 16;
const FIXED_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub product_name: Option<String>,
    pub file_description: Option<String>,
    pub company_name: Option<String>,
    pub file_version: Option<String>,
    pub product_version: Option<String>,
}

impl VersionInfo {
    /// True if product name, description or company mention `needle` (case-insensitive)
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.product_name, &self.file_description, &self.company_name]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    /// File version, else product version, normalized for display
    pub fn display_version(&self) -> Option<String> {
        self.file_version
            .as_deref()
            .or(self.product_version.as_deref())
            .map(normalize_version)
            .filter(|v| !v.is_empty())
    }
}

/// Reads embedded version metadata from a binary on disk.
///
/// Implemented for closures so callers (and tests) can supply their own source.
pub trait VersionMetadataReader: Send + Sync {
    fn read_version_info(&self, path: &Path) -> Option<VersionInfo>;
}

impl<F> VersionMetadataReader for F
where
    F: Fn(&Path) -> Option<VersionInfo> + Send + Sync,
{
    fn read_version_info(&self, path: &Path) -> Option<VersionInfo> {
        self(path)
    }
}

/// Portable reader that parses the PE resource section directly
#[derive(Debug, Default, Clone, Copy)]
pub struct PeVersionReader;

impl VersionMetadataReader for PeVersionReader {
    fn read_version_info(&self, path: &Path) -> Option<VersionInfo> {
        let data = fs::read(path).ok()?;
        parse_version_info(&data)
    }
}

/// Trims and drops a trailing `.0` from four-part versions: `0.7.9.0` → `0.7.9`.
pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    if trimmed.matches('.').count() >= 3 {
        if let Some(stripped) = trimmed.strip_suffix(".0") {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

// ============================================================================
// PE Layout
// ============================================================================

fn u16_at(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_offset: u32,
}

struct PeImage<'a> {
    data: &'a [u8],
    sections: Vec<Section>,
    resource_rva: u32,
}

impl<'a> PeImage<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        if data.get(0..2)? != b"MZ" {
            return None;
        }
        let pe = u32_at(data, 0x3C)? as usize;
        if data.get(pe..pe + 4)? != b"PE\0\0" {
            return None;
        }

        let coff = pe + 4;
        let section_count = u16_at(data, coff + 2)? as usize;
        let optional_size = u16_at(data, coff + 16)? as usize;
        let optional = coff + 20;

        let (count_offset, dirs_offset) = match u16_at(data, optional)? {
            0x10b => (92, 96),   // PE32
            0x20b => (108, 112), // PE32+
            _ => return None,
        };
        if u32_at(data, optional + count_offset)? <= 2 {
            return None;
        }
        let resource_rva = u32_at(data, optional + dirs_offset + 2 * 8)?;
        if resource_rva == 0 {
            return None;
        }

        let table = optional + optional_size;
        let sections = (0..section_count)
            .map(|i| {
                let s = table + i * 40;
                Some(Section {
                    virtual_size: u32_at(data, s + 8)?,
                    virtual_address: u32_at(data, s + 12)?,
                    raw_size: u32_at(data, s + 16)?,
                    raw_offset: u32_at(data, s + 20)?,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            data,
            sections,
            resource_rva,
        })
    }

    fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        self.sections.iter().find_map(|s| {
            let span = s.virtual_size.max(s.raw_size);
            let end = s.virtual_address.checked_add(span)?;
            (rva >= s.virtual_address && rva < end)
                .then(|| (rva - s.virtual_address) as usize + s.raw_offset as usize)
        })
    }

    /// Walks type → name → language and returns the raw version resource bytes.
    fn version_resource(&self) -> Option<&'a [u8]> {
        let base = self.rva_to_offset(self.resource_rva)?;

        let names = self.subdirectory(base, base, Some(RT_VERSION))?;
        let languages = self.subdirectory(base, names, None)?;
        let entry = self.first_data_entry(base, languages)?;

        let data_rva = u32_at(self.data, entry)?;
        let size = u32_at(self.data, entry + 4)? as usize;
        let start = self.rva_to_offset(data_rva)?;
        self.data.get(start..start.checked_add(size)?)
    }

    /// Entries of the directory at `dir`, as (name/id, offset-to-data) pairs
    fn entries(&self, dir: usize) -> Option<Vec<(u32, u32)>> {
        let named = u16_at(self.data, dir + 12)? as usize;
        let ids = u16_at(self.data, dir + 14)? as usize;
        (0..named + ids)
            .map(|i| {
                let e = dir + 16 + i * 8;
                Some((u32_at(self.data, e)?, u32_at(self.data, e + 4)?))
            })
            .collect()
    }

    fn subdirectory(&self, base: usize, dir: usize, id: Option<u32>) -> Option<usize> {
        self.entries(dir)?
            .into_iter()
            .filter(|(name, _)| match id {
                Some(id) => name & SUBDIRECTORY_FLAG == 0 && *name == id,
                None => true,
            })
            .find(|(_, offset)| offset & SUBDIRECTORY_FLAG != 0)
            .map(|(_, offset)| base + (offset & !SUBDIRECTORY_FLAG) as usize)
    }

    fn first_data_entry(&self, base: usize, dir: usize) -> Option<usize> {
        self.entries(dir)?
            .into_iter()
            .find(|(_, offset)| offset & SUBDIRECTORY_FLAG == 0)
            .map(|(_, offset)| base + offset as usize)
    }
}

// ============================================================================
// VS_VERSIONINFO
// ============================================================================

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// One `{wLength, wValueLength, wType, szKey, Value, Children}` block
struct Block<'a> {
    key: String,
    value: &'a [u8],
    children: usize,
    end: usize,
}

/// Reads a NUL-terminated UTF-16LE string, returning it and the offset past the NUL.
fn read_utf16z(data: &[u8], mut offset: usize, limit: usize) -> (String, usize) {
    let mut units = Vec::new();
    while offset + 2 <= limit {
        let unit = u16::from_le_bytes([data[offset], data[offset + 1]]);
        offset += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    (String::from_utf16_lossy(&units), offset)
}

fn parse_block(data: &[u8], start: usize) -> Option<Block<'_>> {
    let length = u16_at(data, start)? as usize;
    if length < 6 {
        return None;
    }
    let end = (start + length).min(data.len());
    let value_length = u16_at(data, start + 2)? as usize;
    let is_text = u16_at(data, start + 4)? == 1;

    let (key, after_key) = read_utf16z(data, start + 6, end);
    let value_start = align4(after_key).min(end);
    // Text values are measured in UTF-16 units
    let value_bytes = if is_text { value_length * 2 } else { value_length };
    let value_end = (value_start + value_bytes).min(end);

    Some(Block {
        key,
        value: &data[value_start..value_end],
        children: align4(value_end),
        end,
    })
}

fn child_blocks<'a>(data: &'a [u8], parent: &Block<'a>) -> Vec<Block<'a>> {
    let mut blocks = Vec::new();
    let mut offset = parent.children;
    while offset + 6 <= parent.end {
        match parse_block(data, offset) {
            Some(block) => {
                offset = align4(block.end);
                blocks.push(block);
            }
            None => break,
        }
    }
    blocks
}

fn text_value(block: &Block<'_>) -> String {
    let (s, _) = read_utf16z(block.value, 0, block.value.len());
    s.trim().to_string()
}

fn format_version(ms: u32, ls: u32) -> String {
    format!("{}.{}.{}.{}", ms >> 16, ms & 0xFFFF, ls >> 16, ls & 0xFFFF)
}

/// Parses the version metadata out of a PE image held in memory.
pub fn parse_version_info(data: &[u8]) -> Option<VersionInfo> {
    let image = PeImage::parse(data)?;
    let resource = image.version_resource()?;

    let root = parse_block(resource, 0)?;
    if root.key != "VS_VERSION_INFO" {
        return None;
    }

    let mut info = VersionInfo::default();
    let mut fixed_file = None;
    let mut fixed_product = None;

    if u32_at(root.value, 0) == Some(FIXED_INFO_SIGNATURE) {
        if let (Some(fms), Some(fls), Some(pms), Some(pls)) = (
            u32_at(root.value, 8),
            u32_at(root.value, 12),
            u32_at(root.value, 16),
            u32_at(root.value, 20),
        ) {
            fixed_file = Some(format_version(fms, fls));
            fixed_product = Some(format_version(pms, pls));
        }
    }

    let string_table = child_blocks(resource, &root)
        .into_iter()
        .filter(|b| b.key == "StringFileInfo")
        .find_map(|sfi| child_blocks(resource, &sfi).into_iter().next());

    if let Some(table) = string_table {
        for entry in child_blocks(resource, &table) {
            let value = Some(text_value(&entry)).filter(|v| !v.is_empty());
            match entry.key.as_str() {
                "ProductName" => info.product_name = value,
                "FileDescription" => info.file_description = value,
                "CompanyName" => info.company_name = value,
                "FileVersion" => info.file_version = value,
                "ProductVersion" => info.product_version = value,
                _ => {}
            }
        }
    }

    info.file_version = info.file_version.or(fixed_file);
    info.product_version = info.product_version.or(fixed_product);
    Some(info)
}
