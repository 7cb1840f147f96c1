//! Blob storage traits for Sprig.
//!
//! Persistence is an opaque key-value store of whole JSON documents. The
//! application state and the reward ledger each live under one key.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

/// Trait for key-value JSON blob backends.
pub trait BlobStore: Send + Sync {
    /// Load the document stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing was ever saved.
    fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the document stored under `key`.
    fn save(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove the document. Returns `Ok(())` even if it doesn't exist.
    fn remove(&self, key: &str) -> Result<()>;

    /// Check if a document exists.
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.load(key)?.is_some())
    }
}

/// Blanket implementation of BlobStore for Arc-wrapped stores.
///
/// This lets the state gateway and the reward engine share one backend.
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        (**self).save(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
