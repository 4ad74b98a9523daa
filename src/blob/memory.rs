//! In-process blob store
//!
//! Keeps containers and blobs in memory with the observable rules of the
//! blob service: container naming, page alignment, snapshots, segmented
//! listing and SAS authorization. Clients created with
//! [`InMemoryBlobStore::connect`] share the same data, the way several
//! clients share one storage account.

use crate::auth::{SasOperation, SasToken, StorageAccount, StorageCredential};
use crate::blob::models::*;
use crate::blob::store::BlobStore;
use crate::error::{BlobTourError, Result};
use crate::utils::helpers::validate_container_name;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Blobs returned per listing segment unless configured otherwise
pub const DEFAULT_SEGMENT_SIZE: usize = 5000;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredBlob {
    kind: BlobKind,
    data: Vec<u8>,
    content_type: String,
    snapshots: Vec<Vec<u8>>,
}

type Containers = BTreeMap<String, BTreeMap<String, StoredBlob>>;

/// The account all in-memory clients talk to
struct SharedService {
    account_name: String,
    account_key: String,
    containers: RwLock<Containers>,
}

/// Blob store held entirely in memory
#[derive(Clone)]
pub struct InMemoryBlobStore {
    service: Arc<SharedService>,
    account: StorageAccount,
    segment_size: usize,
    clock: Clock,
}

impl InMemoryBlobStore {
    /// Create a service owned by `account`, whose key every client must prove
    pub fn new(account: StorageAccount) -> Result<Self> {
        let account_key = account
            .account_key()
            .ok_or_else(|| {
                BlobTourError::config("the in-memory service must be created with an account key")
            })?
            .to_string();

        let service = SharedService {
            account_name: account.name().to_string(),
            account_key,
            containers: RwLock::new(BTreeMap::new()),
        };

        Ok(Self {
            service: Arc::new(service),
            account,
            segment_size: DEFAULT_SEGMENT_SIZE,
            clock: Arc::new(Utc::now),
        })
    }

    /// A new client for the same service, authenticated as `account`
    pub fn connect(&self, account: StorageAccount) -> Self {
        Self {
            service: Arc::clone(&self.service),
            account,
            segment_size: self.segment_size,
            clock: Arc::clone(&self.clock),
        }
    }

    /// Cap the number of items per listing segment
    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size.max(1);
        self
    }

    /// Replace the clock SAS expiry is checked against
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub async fn container_exists(&self, container: &str) -> bool {
        self.service.containers.read().await.contains_key(container)
    }

    /// Number of snapshots a blob currently has
    pub async fn snapshot_count(&self, container: &str, blob: &str) -> Result<usize> {
        let containers = self.service.containers.read().await;
        let stored = lookup(&containers, container, blob)?;
        Ok(stored.snapshots.len())
    }

    fn authorize(&self, operation: SasOperation) -> Result<()> {
        match self.account.credential() {
            StorageCredential::AccountKey(key) => {
                if self.account.name() == self.service.account_name
                    && key.as_str() == self.service.account_key
                {
                    Ok(())
                } else {
                    Err(BlobTourError::authorization(format!(
                        "account key for '{}' was rejected",
                        self.account.name()
                    )))
                }
            }
            StorageCredential::SharedAccessSignature(query) => {
                let token = SasToken::parse(query).map_err(|e| {
                    BlobTourError::authorization(format!("SAS token was rejected: {e}"))
                })?;
                // In-process clients always connect from loopback
                token.check_origin(
                    self.account.blob_endpoint().scheme(),
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                )?;
                token.authorize(
                    &self.service.account_name,
                    &self.service.account_key,
                    (self.clock)(),
                    operation,
                )
            }
        }
    }

    fn info(&self, container: &str, name: &str, stored: &StoredBlob) -> Result<BlobInfo> {
        Ok(BlobInfo {
            name: name.to_string(),
            uri: self.blob_uri(container, name)?,
            size: stored.data.len() as u64,
            content_type: stored.content_type.clone(),
        })
    }
}

fn container_mut<'a>(
    containers: &'a mut Containers,
    container: &str,
) -> Result<&'a mut BTreeMap<String, StoredBlob>> {
    containers
        .get_mut(container)
        .ok_or_else(|| BlobTourError::container_not_found(container))
}

fn lookup<'a>(containers: &'a Containers, container: &str, blob: &str) -> Result<&'a StoredBlob> {
    containers
        .get(container)
        .ok_or_else(|| BlobTourError::container_not_found(container))?
        .get(blob)
        .ok_or_else(|| BlobTourError::blob_not_found(blob))
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn blob_uri(&self, container: &str, blob: &str) -> Result<String> {
        Ok(self.account.blob_uri(container, blob)?.to_string())
    }

    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool> {
        self.authorize(SasOperation::CreateContainer)?;
        validate_container_name(container)?;

        let mut containers = self.service.containers.write().await;
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), BTreeMap::new());
        debug!("Created in-memory container {}", container);
        Ok(true)
    }

    async fn delete_container_if_exists(&self, container: &str) -> Result<bool> {
        self.authorize(SasOperation::DeleteContainer)?;
        let mut containers = self.service.containers.write().await;
        Ok(containers.remove(container).is_some())
    }

    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.authorize(SasOperation::WriteBlob)?;
        let mut containers = self.service.containers.write().await;
        let blobs = container_mut(&mut containers, container)?;

        // Overwriting keeps existing snapshots, as the service does
        let snapshots = blobs
            .remove(blob)
            .map(|previous| previous.snapshots)
            .unwrap_or_default();
        blobs.insert(
            blob.to_string(),
            StoredBlob {
                kind: BlobKind::Block,
                data: content,
                content_type: content_type.to_string(),
                snapshots,
            },
        );
        Ok(())
    }

    async fn download_blob(&self, container: &str, blob: &str) -> Result<Vec<u8>> {
        self.authorize(SasOperation::ReadBlob)?;
        let containers = self.service.containers.read().await;
        Ok(lookup(&containers, container, blob)?.data.clone())
    }

    async fn create_page_blob(&self, container: &str, blob: &str, size: u64) -> Result<()> {
        self.authorize(SasOperation::WriteBlob)?;
        validate_page_blob_size(size)?;
        let len = usize::try_from(size)
            .map_err(|_| BlobTourError::page_range(format!("page blob size {size} is too large")))?;

        let mut containers = self.service.containers.write().await;
        let blobs = container_mut(&mut containers, container)?;
        blobs.insert(
            blob.to_string(),
            StoredBlob {
                kind: BlobKind::Page,
                data: vec![0; len],
                content_type: "application/octet-stream".to_string(),
                snapshots: Vec::new(),
            },
        );
        Ok(())
    }

    async fn write_pages(
        &self,
        container: &str,
        blob: &str,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<()> {
        self.authorize(SasOperation::WriteBlob)?;
        let range = PageRange::new(offset, data.len() as u64)?;

        let mut containers = self.service.containers.write().await;
        let stored = container_mut(&mut containers, container)?
            .get_mut(blob)
            .ok_or_else(|| BlobTourError::blob_not_found(blob))?;

        if stored.kind != BlobKind::Page {
            return Err(BlobTourError::invalid_argument(format!(
                "'{blob}' is a {}, pages can only be written to page blobs",
                stored.kind
            )));
        }
        if range.end() > stored.data.len() as u64 {
            return Err(BlobTourError::page_range(format!(
                "range ending at {} is beyond the blob size {}",
                range.end(),
                stored.data.len()
            )));
        }

        // Both bounds fit in the blob, which is already addressable
        let start = range.offset() as usize;
        stored.data[start..start + data.len()].copy_from_slice(&data);
        Ok(())
    }

    async fn read_range(
        &self,
        container: &str,
        blob: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        self.authorize(SasOperation::ReadBlob)?;
        let containers = self.service.containers.read().await;
        let stored = lookup(&containers, container, blob)?;

        let size = stored.data.len() as u64;
        if offset >= size || length == 0 {
            return Err(BlobTourError::invalid_argument(format!(
                "range starting at {offset} with length {length} is not satisfiable for a blob of {size} bytes"
            )));
        }
        let end = offset.saturating_add(length).min(size);
        Ok(stored.data[offset as usize..end as usize].to_vec())
    }

    async fn list_blobs_segment(
        &self,
        container: &str,
        continuation: Option<ContinuationToken>,
    ) -> Result<ListSegment> {
        self.authorize(SasOperation::ListBlobs)?;
        let containers = self.service.containers.read().await;
        let blobs = containers
            .get(container)
            .ok_or_else(|| BlobTourError::container_not_found(container))?;

        let start = match &continuation {
            Some(token) => Bound::Included(token.as_str().to_string()),
            None => Bound::Unbounded,
        };
        let mut remaining = blobs.range::<String, _>((start, Bound::Unbounded));

        let mut items = Vec::new();
        for (name, stored) in remaining.by_ref().take(self.segment_size) {
            items.push(BlobListItem::from_kind(
                stored.kind,
                self.info(container, name, stored)?,
            ));
        }
        let continuation = remaining
            .next()
            .map(|(name, _)| ContinuationToken::new(name.clone()));

        Ok(ListSegment {
            items,
            continuation,
        })
    }

    async fn snapshot_blob(&self, container: &str, blob: &str) -> Result<()> {
        self.authorize(SasOperation::WriteBlob)?;
        let mut containers = self.service.containers.write().await;
        let stored = container_mut(&mut containers, container)?
            .get_mut(blob)
            .ok_or_else(|| BlobTourError::blob_not_found(blob))?;

        let copy = stored.data.clone();
        stored.snapshots.push(copy);
        Ok(())
    }

    async fn delete_blob_if_exists(
        &self,
        container: &str,
        blob: &str,
        snapshots: DeleteSnapshots,
    ) -> Result<bool> {
        self.authorize(SasOperation::DeleteBlob)?;
        let mut containers = self.service.containers.write().await;
        let blobs = container_mut(&mut containers, container)?;

        let has_snapshots = match blobs.get(blob) {
            Some(stored) => !stored.snapshots.is_empty(),
            None => return Ok(false),
        };

        match snapshots {
            DeleteSnapshots::None if has_snapshots => Err(BlobTourError::invalid_argument(
                format!("'{blob}' has snapshots; delete them with the blob or first"),
            )),
            DeleteSnapshots::None | DeleteSnapshots::Include => {
                blobs.remove(blob);
                Ok(true)
            }
            DeleteSnapshots::Only => {
                if let Some(stored) = blobs.get_mut(blob) {
                    stored.snapshots.clear();
                }
                Ok(true)
            }
        }
    }
}
