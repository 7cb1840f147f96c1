//! Persistent storage for Sprig.
//!
//! Blob stores hold whole JSON documents by key; gateways sit between
//! the state store and a blob store and never let a failure escape.

pub mod file;
pub mod gateway;
pub mod memory;
pub mod traits;

pub use file::FileBlobStore;
pub use gateway::{BackgroundGateway, BlobGateway, StateGateway};
pub use memory::MemoryBlobStore;
pub use traits::BlobStore;

/// Key holding the serialized application state.
pub const APP_STATE_KEY: &str = "app-state";

/// Key holding the reward ledger.
pub const REWARDS_KEY: &str = "rewards";
