//! Blob store abstraction
//!
//! Every walkthrough routine talks to a [`BlobStore`]. The Azure-backed
//! implementation lives in `manager`, the in-process one in `memory`.

use crate::blob::models::*;
use crate::error::Result;
use async_trait::async_trait;

/// Container and blob operations used by the walkthrough
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// URI of a blob, for display
    fn blob_uri(&self, container: &str, blob: &str) -> Result<String>;

    /// Returns true if the container was created, false if it already existed
    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool>;

    /// Returns true if the container existed
    async fn delete_container_if_exists(&self, container: &str) -> Result<bool>;

    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    async fn download_blob(&self, container: &str, blob: &str) -> Result<Vec<u8>>;

    /// Create a zero-filled page blob of `size` bytes (a multiple of 512)
    async fn create_page_blob(&self, container: &str, blob: &str, size: u64) -> Result<()>;

    /// Write whole pages starting at `offset`
    async fn write_pages(
        &self,
        container: &str,
        blob: &str,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<()>;

    /// Read up to `length` bytes starting at `offset`
    async fn read_range(
        &self,
        container: &str,
        blob: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>>;

    /// Fetch one listing segment; pass back the returned token for the next one
    async fn list_blobs_segment(
        &self,
        container: &str,
        continuation: Option<ContinuationToken>,
    ) -> Result<ListSegment>;

    /// Create a read-only point-in-time snapshot of a blob
    async fn snapshot_blob(&self, container: &str, blob: &str) -> Result<()>;

    /// Returns true if the blob existed
    async fn delete_blob_if_exists(
        &self,
        container: &str,
        blob: &str,
        snapshots: DeleteSnapshots,
    ) -> Result<bool>;
}

/// List a whole container by following continuation tokens
pub async fn list_all_blobs(store: &dyn BlobStore, container: &str) -> Result<Vec<BlobListItem>> {
    let mut items = Vec::new();
    let mut token = None;

    loop {
        let segment = store.list_blobs_segment(container, token).await?;
        items.extend(segment.items);
        token = segment.continuation;
        if token.is_none() {
            break;
        }
    }

    Ok(items)
}
