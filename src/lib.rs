//! blobtour - Azure Blob Storage walkthrough
//!
//! A command-line tour of block blobs, page blobs and account shared
//! access signatures, runnable against Azure, the storage emulator or an
//! in-process store.

pub mod auth;
pub mod blob;
pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod utils;

// Re-export commonly used types
pub use error::{BlobTourError, Result};
