//! Block blob walkthrough authenticated with an account SAS

use crate::auth::{create_storage_account_from_connection_string, generate_account_sas, AccountSasPolicy};
use crate::blob::StorageBackend;
use crate::config::Config;
use crate::demo::block::run_block_blob_steps;
use crate::demo::BlockBlobReport;
use crate::error::Result;
use crate::utils::generate_container_name;
use chrono::{Duration, Utc};
use tracing::{debug, info};

/// Issue an account SAS from the connection string's key, then run the block
/// blob steps with a client that holds only the SAS token
pub async fn block_blob_with_account_sas(
    config: &Config,
    backend: &StorageBackend,
) -> Result<BlockBlobReport> {
    let account = create_storage_account_from_connection_string(&config.connection_string)?;

    let policy = AccountSasPolicy::blob_container_and_objects(
        Utc::now(),
        Duration::hours(config.sas_expiry_hours),
    );
    let token = generate_account_sas(&account, &policy)?;
    info!("Issued account SAS valid until {}", token.expiry());

    println!();
    println!("账户SAS的签名: {}", token.signature());
    println!("账户SAS的令牌: {}", token);
    println!();

    let container = generate_container_name(&config.block_container_prefix);
    let container_uri = account.container_uri(&container)?;
    debug!("Container URI for SAS access: {}", container_uri);
    println!("{container_uri}");

    let sas_account = account.with_sas(token);
    let store = backend.open(sas_account)?;

    run_block_blob_steps(store.as_ref(), config, container, "使用账户SAS创建容器").await
}
