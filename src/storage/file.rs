//! File-based blob storage for Sprig.
//!
//! Each key is stored as `<dir>/<key>.json`, UTF-8 JSON.
//! Atomic writes are achieved via temp file + rename pattern.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde_json::Value;

use crate::config::state_dir;
use crate::error::{Result, SprigError};
use crate::storage::BlobStore;
use crate::util::read_to_string_limited;

/// File-based blob storage.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    /// Directory where blob files are stored.
    dir: PathBuf,
}

impl FileBlobStore {
    /// Create a store in the default state directory.
    ///
    /// Uses `~/.sprig/state/` or `$SPRIG_HOME/state/`.
    pub fn new() -> Result<Self> {
        let dir = state_dir().ok_or_else(|| {
            SprigError::config("Could not determine state directory (no home directory)")
        })?;
        Self::with_dir(dir)
    }

    /// Create a store in a custom directory, creating it if needed.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| SprigError::storage(&dir, e))?;
        }

        Ok(Self { dir })
    }

    /// The directory holding the blobs.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Get the path for a blob file.
    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Get the path for a temp file used during atomic writes.
    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", key))
    }

    /// Write a blob atomically using temp file + rename.
    fn atomic_write(&self, key: &str, value: &Value) -> Result<()> {
        let final_path = self.blob_path(key)?;
        let temp_path = self.temp_path(key);

        let json = serde_json::to_string_pretty(value)?;

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| SprigError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| SprigError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| SprigError::storage(&temp_path, e))?;
        }

        // Rename temp file to final path (atomic on POSIX)
        fs::rename(&temp_path, &final_path).map_err(|e| SprigError::storage(&final_path, e))?;

        Ok(())
    }
}

/// Keys become file names, so they are restricted to a safe alphabet.
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SprigError::invalid_input(format!(
            "invalid storage key '{}'",
            key
        )))
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.blob_path(key)?;

        if !path.exists() {
            return Ok(None);
        }

        let content = read_to_string_limited(&path)?;
        let value = serde_json::from_str(&content).map_err(|e| {
            SprigError::serde(format!("{} is not valid JSON: {}", path.display(), e))
        })?;

        Ok(Some(value))
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        self.atomic_write(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key)?;

        if path.exists() {
            fs::remove_file(&path).map_err(|e| SprigError::storage(&path, e))?;
        }

        // Also clean up any temp file
        let temp_path = self.temp_path(key);
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }

        Ok(())
    }
}
