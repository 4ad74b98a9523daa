//! Backend selection
//!
//! Routines receive a [`StorageBackend`] and open a [`BlobStore`] per
//! account handle, so the same walkthrough runs against Azure, the local
//! emulator or the in-process store.

use crate::auth::StorageAccount;
use crate::blob::manager::AzureBlobStore;
use crate::blob::memory::InMemoryBlobStore;
use crate::blob::store::BlobStore;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which service the walkthrough talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Azure Blob Storage or the storage emulator
    #[default]
    Azure,
    /// In-process store, no network access
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Azure => f.write_str("azure"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Opens blob stores for account handles
pub enum StorageBackend {
    Azure { segment_size: usize },
    Memory(InMemoryBlobStore),
}

impl StorageBackend {
    /// Backend of the given kind. The in-memory service is owned by `owner`,
    /// whose account key later clients must present.
    pub fn new(kind: BackendKind, owner: &StorageAccount, segment_size: usize) -> Result<Self> {
        match kind {
            BackendKind::Azure => Ok(Self::Azure { segment_size }),
            BackendKind::Memory => Ok(Self::Memory(
                InMemoryBlobStore::new(owner.clone())?.with_segment_size(segment_size),
            )),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Azure { .. } => BackendKind::Azure,
            Self::Memory(_) => BackendKind::Memory,
        }
    }

    /// Open a client authenticated as `account`
    pub fn open(&self, account: StorageAccount) -> Result<Box<dyn BlobStore>> {
        match self {
            Self::Azure { segment_size } => Ok(Box::new(
                AzureBlobStore::new(account)?.with_segment_size(*segment_size),
            )),
            Self::Memory(service) => Ok(Box::new(service.connect(account))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_size_reaches_both_backends() {
        let owner = StorageAccount::development();

        let azure = StorageBackend::new(BackendKind::Azure, &owner, 7).unwrap();
        assert!(matches!(azure, StorageBackend::Azure { segment_size: 7 }));
        assert_eq!(azure.kind(), BackendKind::Azure);

        let memory = StorageBackend::new(BackendKind::Memory, &owner, 7).unwrap();
        assert_eq!(memory.kind(), BackendKind::Memory);
    }
}
