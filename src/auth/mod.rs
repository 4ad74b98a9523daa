//! Storage account credentials
//!
//! This module turns connection strings into storage account handles and
//! issues and checks account shared access signatures (SAS).

pub mod connection;
pub mod sas;

pub use connection::*;
pub use sas::*;
