//! Page blob walkthrough

use crate::auth::create_storage_account_from_connection_string;
use crate::blob::{BlobStore, DeleteSnapshots, StorageBackend, PAGE_SIZE};
use crate::config::Config;
use crate::demo::{PageBlobReport, EMULATOR_HINT};
use crate::error::Result;
use crate::utils::{generate_container_name, step};
use rand::RngCore;
use tracing::{debug, error};

/// Create a page blob, write one random page, list the container segment by
/// segment, read the page back and clean up
pub async fn page_blob_basic(config: &Config, backend: &StorageBackend) -> Result<PageBlobReport> {
    let account = create_storage_account_from_connection_string(&config.connection_string)?;
    let store = backend.open(account)?;

    let container = generate_container_name(&config.page_container_prefix);
    run_page_blob_steps(store.as_ref(), config, container).await
}

pub(crate) async fn run_page_blob_steps(
    store: &dyn BlobStore,
    config: &Config,
    container: String,
) -> Result<PageBlobReport> {
    let blob = config.page_blob_name.clone();

    step(1, "创建容器...");
    if let Err(e) = store.create_container_if_not_exists(&container).await {
        error!("Failed to create container {}: {}", container, e);
        println!("{EMULATOR_HINT}");
        return Err(e);
    }

    step(2, "创建页Blob");
    store
        .create_page_blob(&container, &blob, config.page_blob_size)
        .await?;

    step(3, "写页blob");
    let mut written = vec![0u8; PAGE_SIZE as usize];
    rand::thread_rng().fill_bytes(&mut written);
    store.write_pages(&container, &blob, 0, written.clone()).await?;

    step(4, "列出容器内的Blobs");
    let mut listed = Vec::new();
    let mut segments = 0;
    let mut token = None;
    loop {
        let segment = store.list_blobs_segment(&container, token).await?;
        segments += 1;
        for item in &segment.items {
            println!("- {} (类型: {})", item.uri(), item.kind_label());
        }
        listed.extend(segment.items);

        token = segment.continuation;
        if token.is_none() {
            break;
        }
        debug!("Listing continues after segment {}", segments);
    }

    step(5, "读取页Blob");
    let read_back = store.read_range(&container, &blob, 0, PAGE_SIZE).await?;

    step(6, "删除页Blob");
    store
        .delete_blob_if_exists(&container, &blob, DeleteSnapshots::None)
        .await?;

    step(7, "删除容器");
    store.delete_container_if_exists(&container).await?;

    Ok(PageBlobReport {
        container,
        blob,
        blob_size: config.page_blob_size,
        written,
        read_back,
        listed,
        segments,
    })
}
