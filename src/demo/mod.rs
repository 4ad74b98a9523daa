//! Walkthrough routines
//!
//! Each routine parses the configured connection string, opens a blob store
//! through the selected backend and runs its sequence of calls one after
//! another. Any failure ends the routine; nothing is retried.

pub mod block;
pub mod block_sas;
pub mod page;

pub use block::block_blob_basic;
pub use block_sas::block_blob_with_account_sas;
pub use page::page_blob_basic;

use crate::auth::create_storage_account_from_connection_string;
use crate::blob::{BlobListItem, StorageBackend};
use crate::config::Config;
use crate::error::Result;
use std::path::PathBuf;
use tracing::info;

/// Printed when the first call against the service fails
pub const EMULATOR_HINT: &str = "如果使用默认配置文件，请确保Azure模拟器已经启动。点击Windows键然后输入\"Azure Storage\"，找到Azure模拟器然后点击运行，之后请重新启动该示例.";

/// What a block blob routine did
#[derive(Debug, Clone)]
pub struct BlockBlobReport {
    pub container: String,
    pub blob: String,
    pub blob_uri: String,
    pub uploaded_bytes: usize,
    pub listed: Vec<BlobListItem>,
    pub download_path: PathBuf,
}

/// What the page blob routine did
#[derive(Debug, Clone)]
pub struct PageBlobReport {
    pub container: String,
    pub blob: String,
    pub blob_size: u64,
    pub written: Vec<u8>,
    pub read_back: Vec<u8>,
    pub listed: Vec<BlobListItem>,
    /// Number of listing calls made, including the last one
    pub segments: usize,
}

/// Build the backend the configuration selects, owned by the configured account
pub fn backend_from_config(config: &Config) -> Result<StorageBackend> {
    let account = create_storage_account_from_connection_string(&config.connection_string)?;
    StorageBackend::new(config.backend, &account, config.list_segment_size)
}

/// Run the three routines in order
pub async fn run_all(config: &Config, backend: &StorageBackend) -> Result<()> {
    info!("Running blob storage walkthrough against the {} backend", backend.kind());
    println!("Azure Blob存储示例\n ");

    println!("块 Blob 示例");
    block_blob_basic(config, backend).await?;
    block_blob_with_account_sas(config, backend).await?;

    println!("\n页 Blob 示例");
    page_blob_basic(config, backend).await?;

    Ok(())
}
