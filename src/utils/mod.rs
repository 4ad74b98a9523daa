//! Utility functions module
//!
//! This module contains helpers for connection string splitting,
//! container naming, size formatting and console interaction.

pub mod console;
pub mod helpers;

pub use console::*;
pub use helpers::*;
