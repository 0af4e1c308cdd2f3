//! Crash-safe file replacement.
//!
//! Everything a poller may read concurrently (stage records, manifests, the
//! submission record) is written to a temporary file in the destination
//! directory, synced, and then renamed over the target.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::Result;

/// Atomically replace `path` with `contents`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically replace `path` with the pretty-printed JSON form of `value`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

/// Open a temporary file next to `path`; call `persist(path)` once it is complete
pub fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent)?;
    Ok(NamedTempFile::new_in(parent)?)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
