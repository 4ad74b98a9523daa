//! Azure-backed blob store
//!
//! This module provides [`AzureBlobStore`], which forwards every
//! [`BlobStore`] operation to the Azure Blob Storage service (or the local
//! emulator) through the `azure_storage_blobs` client library.

use crate::auth::{StorageAccount, StorageCredential};
use crate::blob::models::*;
use crate::blob::store::BlobStore;
use crate::error::{BlobTourError, Result};
use async_trait::async_trait;
use azure_core::auth::Secret;
use azure_core::prelude::MaxResults;
use azure_core::StatusCode;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::blob::{Blob, BlobType};
use azure_storage_blobs::container::operations::ListBlobsResponse;
use azure_storage_blobs::prelude::*;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::num::NonZeroU32;
use tokio::sync::Mutex;
use tracing::debug;

/// Listing stream parked between two segment calls
struct ListingCursor {
    container: String,
    marker: String,
    pages: BoxStream<'static, azure_core::Result<ListBlobsResponse>>,
}

/// Blob store backed by the Azure Blob Storage service
pub struct AzureBlobStore {
    account: StorageAccount,
    blob_service: BlobServiceClient,
    segment_size: Option<MaxResults>,
    cursor: Mutex<Option<ListingCursor>>,
}

impl AzureBlobStore {
    /// Create a client for the account's blob endpoint and credential
    pub fn new(account: StorageAccount) -> Result<Self> {
        let credentials = match account.credential() {
            StorageCredential::AccountKey(key) => StorageCredentials::access_key(
                account.name().to_string(),
                Secret::new(key.as_str().to_string()),
            ),
            StorageCredential::SharedAccessSignature(query) => {
                StorageCredentials::sas_token(query.as_str())
                    .map_err(|e| BlobTourError::from_azure("Failed to use SAS token", e))?
            }
        };

        let location = cloud_location(&account)?;
        debug!("Connecting to blob endpoint {}", account.blob_endpoint());

        let blob_service = ClientBuilder::with_location(location, credentials).blob_service_client();

        Ok(Self {
            account,
            blob_service,
            segment_size: None,
            cursor: Mutex::new(None),
        })
    }

    /// Cap the number of items the service returns per listing segment
    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        let capped = u32::try_from(segment_size.max(1)).unwrap_or(u32::MAX);
        self.segment_size = NonZeroU32::new(capped).map(MaxResults::new);
        self
    }

    fn blob_client(&self, container: &str, blob: &str) -> BlobClient {
        self.blob_service.container_client(container).blob_client(blob)
    }

    fn list_item(&self, container: &str, blob: &Blob) -> Result<BlobListItem> {
        let info = BlobInfo {
            name: blob.name.clone(),
            uri: self.blob_uri(container, &blob.name)?,
            size: blob.properties.content_length,
            content_type: blob.properties.content_type.clone(),
        };

        let kind = match blob.properties.blob_type {
            BlobType::PageBlob => BlobKind::Page,
            BlobType::AppendBlob => BlobKind::Append,
            _ => BlobKind::Block,
        };

        Ok(BlobListItem::from_kind(kind, info))
    }
}

/// Emulator accounts are addressed by host and port, everything else by its blob endpoint
fn cloud_location(account: &StorageAccount) -> Result<CloudLocation> {
    let endpoint = account.blob_endpoint();

    if account.is_emulator() {
        let address = endpoint
            .host_str()
            .ok_or_else(|| BlobTourError::config("emulator endpoint has no host"))?
            .to_string();
        let port = endpoint
            .port_or_known_default()
            .unwrap_or(crate::auth::DEV_STORE_BLOB_PORT);
        return Ok(CloudLocation::Emulator { address, port });
    }

    Ok(CloudLocation::Custom {
        account: account.name().to_string(),
        uri: endpoint.as_str().trim_end_matches('/').to_string(),
    })
}

fn has_status(error: &azure_core::Error, status: StatusCode) -> bool {
    error
        .as_http_error()
        .map(|http| http.status() == status)
        .unwrap_or(false)
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    fn blob_uri(&self, container: &str, blob: &str) -> Result<String> {
        Ok(self.account.blob_uri(container, blob)?.to_string())
    }

    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool> {
        match self.blob_service.container_client(container).create().await {
            Ok(_) => Ok(true),
            Err(e) if has_status(&e, StatusCode::Conflict) => {
                debug!("Container {} already exists", container);
                Ok(false)
            }
            Err(e) => Err(BlobTourError::from_azure("Failed to create container", e)),
        }
    }

    async fn delete_container_if_exists(&self, container: &str) -> Result<bool> {
        match self.blob_service.container_client(container).delete().await {
            Ok(_) => Ok(true),
            Err(e) if has_status(&e, StatusCode::NotFound) => Ok(false),
            Err(e) => Err(BlobTourError::from_azure("Failed to delete container", e)),
        }
    }

    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let content_type = content_type.to_string();

        self.blob_client(container, blob)
            .put_block_blob(content)
            .content_type(&content_type)
            .await
            .map_err(|e| BlobTourError::from_azure("Failed to upload blob", e))?;

        Ok(())
    }

    async fn download_blob(&self, container: &str, blob: &str) -> Result<Vec<u8>> {
        let blob_client = self.blob_client(container, blob);

        let properties = blob_client.get_properties().await.map_err(|e| {
            if has_status(&e, StatusCode::NotFound) {
                BlobTourError::blob_not_found(blob)
            } else {
                BlobTourError::from_azure("Failed to read blob properties", e)
            }
        })?;

        // get_content() answers 416 Range Not Satisfiable for 0-byte blobs
        if properties.blob.properties.content_length == 0 {
            return Ok(Vec::new());
        }

        blob_client
            .get_content()
            .await
            .map_err(|e| BlobTourError::from_azure("Failed to download blob", e))
    }

    async fn create_page_blob(&self, container: &str, blob: &str, size: u64) -> Result<()> {
        validate_page_blob_size(size)?;

        self.blob_client(container, blob)
            .put_page_blob(u128::from(size))
            .await
            .map_err(|e| BlobTourError::from_azure("Failed to create page blob", e))?;

        Ok(())
    }

    async fn write_pages(
        &self,
        container: &str,
        blob: &str,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<()> {
        let range = PageRange::new(offset, data.len() as u64)?;
        let ba512 = BA512Range::new(range.offset(), range.last_byte())
            .map_err(|e| BlobTourError::page_range(e.to_string()))?;

        self.blob_client(container, blob)
            .put_page(ba512, data)
            .await
            .map_err(|e| BlobTourError::from_azure("Failed to write pages", e))?;

        Ok(())
    }

    async fn read_range(
        &self,
        container: &str,
        blob: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        if length == 0 {
            return Err(BlobTourError::invalid_argument("cannot read an empty range"));
        }

        let mut chunks = self
            .blob_client(container, blob)
            .get()
            .range(offset..offset.saturating_add(length))
            .into_stream();

        let mut data = Vec::new();
        while let Some(chunk) = chunks
            .try_next()
            .await
            .map_err(|e| BlobTourError::from_azure("Failed to read blob range", e))?
        {
            let bytes = chunk
                .data
                .collect()
                .await
                .map_err(|e| BlobTourError::from_azure("Failed to read blob range", e))?;
            data.extend_from_slice(&bytes);
        }

        Ok(data)
    }

    async fn list_blobs_segment(
        &self,
        container: &str,
        continuation: Option<ContinuationToken>,
    ) -> Result<ListSegment> {
        // The SDK follows markers inside one stream, so a continuation
        // resumes the stream parked by the previous call
        let mut pages = match continuation {
            None => {
                let mut request = self.blob_service.container_client(container).list_blobs();
                if let Some(max_results) = self.segment_size {
                    request = request.max_results(max_results);
                }
                request.into_stream().boxed()
            }
            Some(token) => match self.cursor.lock().await.take() {
                Some(cursor) if cursor.container == container && cursor.marker == token.as_str() => {
                    cursor.pages
                }
                _ => {
                    return Err(BlobTourError::invalid_argument(format!(
                        "continuation token '{}' does not belong to an open listing of '{container}'",
                        token.as_str()
                    )))
                }
            },
        };

        let page = pages
            .try_next()
            .await
            .map_err(|e| BlobTourError::from_azure("Failed to list blobs", e))?;
        let Some(page) = page else {
            return Ok(ListSegment::default());
        };

        let mut items = Vec::new();
        for prefix in page.blobs.prefixes() {
            items.push(BlobListItem::Directory {
                prefix: prefix.name.clone(),
                uri: self.blob_uri(container, &prefix.name)?,
            });
        }
        for blob in page.blobs.blobs() {
            items.push(self.list_item(container, blob)?);
        }

        let continuation = page
            .next_marker
            .as_ref()
            .map(|marker| ContinuationToken::new(marker.as_str()));

        if let Some(token) = &continuation {
            *self.cursor.lock().await = Some(ListingCursor {
                container: container.to_string(),
                marker: token.as_str().to_string(),
                pages,
            });
        }

        Ok(ListSegment {
            items,
            continuation,
        })
    }

    async fn snapshot_blob(&self, container: &str, blob: &str) -> Result<()> {
        self.blob_client(container, blob)
            .snapshot()
            .await
            .map_err(|e| BlobTourError::from_azure("Failed to snapshot blob", e))?;

        Ok(())
    }

    async fn delete_blob_if_exists(
        &self,
        container: &str,
        blob: &str,
        snapshots: DeleteSnapshots,
    ) -> Result<bool> {
        let blob_client = self.blob_client(container, blob);
        let request = match snapshots {
            DeleteSnapshots::None => blob_client.delete(),
            DeleteSnapshots::Include => blob_client
                .delete()
                .delete_snapshots_method(DeleteSnapshotsMethod::Include),
            DeleteSnapshots::Only => blob_client
                .delete()
                .delete_snapshots_method(DeleteSnapshotsMethod::Only),
        };

        match request.await {
            Ok(_) => Ok(true),
            Err(e) if has_status(&e, StatusCode::NotFound) => Ok(false),
            Err(e) => Err(BlobTourError::from_azure("Failed to delete blob", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_location() {
        let location = cloud_location(&StorageAccount::development()).unwrap();
        match location {
            CloudLocation::Emulator { address, port } => {
                assert_eq!(address, "127.0.0.1");
                assert_eq!(port, 10000);
            }
            _ => panic!("expected emulator location"),
        }
    }

    #[test]
    fn test_custom_location() {
        let account = StorageAccount::parse(
            "DefaultEndpointsProtocol=https;AccountName=demo;AccountKey=a2V5;EndpointSuffix=core.chinacloudapi.cn",
        )
        .unwrap();
        match cloud_location(&account).unwrap() {
            CloudLocation::Custom { account, uri } => {
                assert_eq!(account, "demo");
                assert_eq!(uri, "https://demo.blob.core.chinacloudapi.cn");
            }
            _ => panic!("expected custom location"),
        }
    }

    #[test]
    fn test_segment_size_is_capped_at_one() {
        let store = AzureBlobStore::new(StorageAccount::development())
            .unwrap()
            .with_segment_size(0);
        assert_eq!(store.segment_size, NonZeroU32::new(1).map(MaxResults::new));

        let store = AzureBlobStore::new(StorageAccount::development())
            .unwrap()
            .with_segment_size(250);
        assert_eq!(store.segment_size, NonZeroU32::new(250).map(MaxResults::new));
    }

    #[tokio::test]
    async fn test_foreign_continuation_token_rejected() {
        let store = AzureBlobStore::new(StorageAccount::development()).unwrap();

        let result = store
            .list_blobs_segment("c", Some(ContinuationToken::new("x")))
            .await;
        assert!(matches!(result, Err(BlobTourError::InvalidArgument(_))));
    }
}
