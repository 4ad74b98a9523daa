//! Block blob walkthrough

use crate::auth::create_storage_account_from_connection_string;
use crate::blob::{list_all_blobs, BlobStore, DeleteSnapshots, StorageBackend};
use crate::config::Config;
use crate::demo::{BlockBlobReport, EMULATOR_HINT};
use crate::error::Result;
use crate::utils::{format_size, generate_container_name, step};
use tracing::{debug, error, info};

/// Upload, list, download, snapshot and delete a block blob using the
/// account credential from the connection string
pub async fn block_blob_basic(config: &Config, backend: &StorageBackend) -> Result<BlockBlobReport> {
    let account = create_storage_account_from_connection_string(&config.connection_string)?;
    let store = backend.open(account)?;

    let container = generate_container_name(&config.block_container_prefix);
    run_block_blob_steps(store.as_ref(), config, container, "创建容器...").await
}

/// Steps shared by both block blob routines. `create_message` is the text of step 1.
pub(crate) async fn run_block_blob_steps(
    store: &dyn BlobStore,
    config: &Config,
    container: String,
    create_message: &str,
) -> Result<BlockBlobReport> {
    let blob = config.image_blob_name()?;

    step(1, create_message);
    if let Err(e) = store.create_container_if_not_exists(&container).await {
        error!("Failed to create container {}: {}", container, e);
        println!("{EMULATOR_HINT}");
        return Err(e);
    }
    debug!("Created container {}", container);

    step(2, "上传 BlockBlob");
    let content = tokio::fs::read(&config.image_path).await?;
    let uploaded_bytes = content.len();
    let content_type = mime_guess::from_path(&config.image_path)
        .first_or_octet_stream()
        .to_string();
    store
        .upload_block_blob(&container, &blob, content, &content_type)
        .await?;
    info!("Uploaded {} ({})", blob, format_size(uploaded_bytes as u64));

    step(3, "列出容器内所有的blobs");
    let listed = list_all_blobs(store, &container).await?;
    for item in &listed {
        println!("- {} (类型: {})", item.uri(), item.kind_label());
    }

    let blob_uri = store.blob_uri(&container, &blob)?;
    step(4, &format!("下载Blob，下载地址：{blob_uri}"));
    let downloaded = store.download_blob(&container, &blob).await?;
    let download_path = config.download_path();
    if let Some(parent) = download_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(&download_path, &downloaded).await?;
    debug!("Wrote {} bytes to {}", downloaded.len(), download_path.display());

    step(5, "创建只读的blob快照");
    store.snapshot_blob(&container, &blob).await?;

    step(6, "删除块Blob以及所有的快照");
    store
        .delete_blob_if_exists(&container, &blob, DeleteSnapshots::Include)
        .await?;

    step(7, "删除容器");
    store.delete_container_if_exists(&container).await?;

    Ok(BlockBlobReport {
        container,
        blob,
        blob_uri,
        uploaded_bytes,
        listed,
        download_path,
    })
}
