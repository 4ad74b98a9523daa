//! Azure Blob Storage operations
//!
//! This module provides the blob store abstraction used by the walkthrough,
//! its Azure-backed and in-memory implementations, and the data models
//! they share.

pub mod backend;
pub mod manager;
pub mod memory;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use backend::{BackendKind, StorageBackend};
pub use manager::AzureBlobStore;
pub use memory::InMemoryBlobStore;
pub use models::*;
pub use store::{list_all_blobs, BlobStore};
