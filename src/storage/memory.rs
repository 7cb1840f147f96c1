//! In-memory blob storage for testing.
//!
//! Thread-safe so the background writer can share it with the test body.
//! Writes can be switched off to exercise the best-effort save path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{Result, SprigError};
use crate::storage::BlobStore;

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Value>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with one document.
    pub fn with_blob(key: impl Into<String>, value: Value) -> Self {
        let store = Self::new();
        if let Ok(mut blobs) = store.blobs.write() {
            blobs.insert(key.into(), value);
        }
        store
    }

    /// Make every subsequent save fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Get the number of stored documents.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> SprigError {
    SprigError::persistence("memory store lock poisoned")
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let blobs = self.blobs.read().map_err(|_| poisoned())?;
        Ok(blobs.get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SprigError::persistence(format!(
                "writes disabled for '{}'",
                key
            )));
        }
        let mut blobs = self.blobs.write().map_err(|_| poisoned())?;
        blobs.insert(key.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut blobs = self.blobs.write().map_err(|_| poisoned())?;
        blobs.remove(key);
        Ok(())
    }
}
