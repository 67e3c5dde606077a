//! Atomic file persistence
//!
//! Local state files (documents, session, tombstones) are written to a
//! temporary sibling first and renamed into place, so a crash never leaves
//! a half-written file behind.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{SyncError, SyncResult};

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)
}

/// Serialize a value as pretty JSON and write it atomically
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> SyncResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| {
        SyncError::io(path, io::Error::new(io::ErrorKind::InvalidData, e))
    })?;
    atomic_write(path, &json).map_err(|e| SyncError::io(path, e))
}

/// Read a JSON file, returning `None` when it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> SyncResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SyncError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SyncError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Remove a file, ignoring one that is already gone
pub fn remove_if_exists(path: &Path) -> SyncResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::io(path, e)),
    }
}

// Keeps the full file name so `note.md` and `note.txt` never share a temp file
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
