//! Whole-object file persistence
//!
//! Gantree: L0_Foundation → Persist
//!
//! Writes go to a sibling temporary file which is then renamed over the
//! target, so readers see either the old or the new object.

use crate::error::{QdriveError, QdriveResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Atomically replace `path` with `bytes`
/// Gantree: atomic_write(path,bytes) -> Result // 원자적 저장
pub fn atomic_write(path: &Path, bytes: &[u8]) -> QdriveResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                QdriveError::FileError(format!("create {}: {}", parent.display(), e))
            })?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| QdriveError::FileError(format!("{} has no file name", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes)
        .map_err(|e| QdriveError::FileError(format!("write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        QdriveError::FileError(format!("replace {}: {}", path.display(), e))
    })
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> QdriveResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &bytes)
}

/// Read and deserialize JSON from `path`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> QdriveResult<T> {
    let bytes = fs::read(path)
        .map_err(|e| QdriveError::FileError(format!("read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}
