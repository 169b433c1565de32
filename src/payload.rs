//! Payload classification and entry listing.
//!
//! Imports accept raw bytes and decide what they are from content alone.
//! A payload is either a single JSON document, a ZIP archive of entries,
//! or invalid; file names and extensions are never trusted for the
//! top-level decision. Archives are expanded into named in-memory entries
//! that the format adapters consume.

use std::io::{Cursor, Read};
use std::path::Path;

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::AnnoportError;

/// What a raw upload turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    /// A single JSON document.
    Json,
    /// A ZIP archive.
    Archive,
    /// Neither; the import aborts.
    Invalid,
}

/// Classifies payload bytes by their leading content.
///
/// ZIP is recognized by the local-file-header or empty-archive signature;
/// JSON by the first non-whitespace byte opening an object or array.
pub fn sniff(bytes: &[u8]) -> PayloadKind {
    if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
        return PayloadKind::Archive;
    }
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => PayloadKind::Json,
        _ => PayloadKind::Invalid,
    }
}

/// A named file pulled out of an archive or a directory.
#[derive(Clone, Debug)]
pub struct PayloadEntry {
    /// Forward-slash relative path within the payload.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PayloadEntry {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// The entry's extension, lowercased, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    /// The entry's file name without any directory components.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// The file name with its extension removed.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }
}

/// Expands a ZIP archive into in-memory entries.
///
/// Directory entries are skipped, and entries whose names escape the
/// archive root (path traversal) are dropped rather than rehomed.
pub fn archive_entries(bytes: &[u8], item: &str) -> Result<Vec<PayloadEntry>, AnnoportError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|source| AnnoportError::Archive {
            item: item.to_string(),
            source,
        })?;

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|source| AnnoportError::Archive {
                item: item.to_string(),
                source,
            })?;

        if file.is_dir() {
            continue;
        }

        let Some(sanitized) = file.enclosed_name() else {
            tracing::warn!(entry = %file.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let name = sanitized.to_string_lossy().replace('\\', "/");

        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents)?;
        entries.push(PayloadEntry::new(name, contents));
    }

    Ok(entries)
}

/// Reads a directory tree into entries, mirroring archive expansion.
///
/// Entry names are relative to `root` with forward slashes, so adapters
/// treat uploaded archives and local directories identically.
pub fn dir_entries(root: &Path) -> Result<Vec<PayloadEntry>, AnnoportError> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or_else(|_| entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let bytes = std::fs::read(entry.path())?;
        entries.push(PayloadEntry::new(name, bytes));
    }

    Ok(entries)
}
