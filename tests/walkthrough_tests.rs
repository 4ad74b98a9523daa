use blobtour::blob::{BackendKind, BlobListItem, StorageBackend};
use blobtour::config::Config;
use blobtour::demo::{self, backend_from_config};
use blobtour::error::{BlobTourError, Result};
use tempfile::TempDir;

const IMAGE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot a real image, but bytes all the same";

fn create_test_config(dir: &TempDir) -> Config {
    let image_path = dir.path().join("HelloWorld.png");
    std::fs::write(&image_path, IMAGE_BYTES).unwrap();

    Config {
        connection_string: "UseDevelopmentStorage=true".to_string(),
        backend: BackendKind::Memory,
        image_path,
        download_dir: dir.path().join("downloads"),
        pause_on_exit: false,
        ..Config::default()
    }
}

async fn container_exists(backend: &StorageBackend, container: &str) -> bool {
    match backend {
        StorageBackend::Memory(service) => service.container_exists(container).await,
        StorageBackend::Azure { .. } => panic!("tests run against the in-memory backend"),
    }
}

#[tokio::test]
async fn test_block_blob_walkthrough() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = create_test_config(&dir);
    let backend = backend_from_config(&config)?;

    let report = demo::block_blob_basic(&config, &backend).await?;

    assert!(report.container.starts_with("demoblockblobcontainer-"));
    assert_eq!(report.blob, "HelloWorld.png");
    assert_eq!(report.uploaded_bytes, IMAGE_BYTES.len());
    assert_eq!(report.listed.len(), 1);
    assert!(matches!(&report.listed[0], BlobListItem::BlockBlob(info) if info.name == "HelloWorld.png"));

    assert_eq!(report.download_path, dir.path().join("downloads/CopyOfHelloWorld.png"));
    assert_eq!(std::fs::read(&report.download_path)?, IMAGE_BYTES);

    assert!(!container_exists(&backend, &report.container).await);
    Ok(())
}

#[tokio::test]
async fn test_block_blob_walkthrough_with_account_sas() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = create_test_config(&dir);
    let backend = backend_from_config(&config)?;

    let report = demo::block_blob_with_account_sas(&config, &backend).await?;

    assert_eq!(report.listed.len(), 1);
    assert_eq!(std::fs::read(&report.download_path)?, IMAGE_BYTES);
    assert!(report
        .blob_uri
        .starts_with("http://127.0.0.1:10000/devstoreaccount1/demoblockblobcontainer-"));
    assert!(!container_exists(&backend, &report.container).await);
    Ok(())
}

#[tokio::test]
async fn test_page_blob_walkthrough() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = create_test_config(&dir);
    let backend = backend_from_config(&config)?;

    let report = demo::page_blob_basic(&config, &backend).await?;

    assert!(report.container.starts_with("demopageblobcontainer-"));
    assert_eq!(report.blob_size, 1024);
    assert_eq!(report.written.len(), 512);
    assert_eq!(report.read_back, report.written);
    assert_eq!(report.segments, 1);
    assert!(matches!(&report.listed[..], [BlobListItem::PageBlob(info)] if info.name == "samplepageblob"));
    assert!(!container_exists(&backend, &report.container).await);
    Ok(())
}

#[tokio::test]
async fn test_run_all() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = create_test_config(&dir);
    let backend = backend_from_config(&config)?;

    demo::run_all(&config, &backend).await
}

#[tokio::test]
async fn test_missing_image_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        image_path: dir.path().join("nope.png"),
        ..create_test_config(&dir)
    };
    let backend = backend_from_config(&config).unwrap();

    let result = demo::block_blob_basic(&config, &backend).await;
    assert!(matches!(result, Err(BlobTourError::IoError(_))));
}

#[tokio::test]
async fn test_sas_walkthrough_needs_account_key() {
    let dir = tempfile::tempdir().unwrap();
    let owner = create_test_config(&dir);
    let backend = backend_from_config(&owner).unwrap();

    let config = Config {
        connection_string: "BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1;SharedAccessSignature=sv=2019-02-02&ss=b&srt=co&sp=rwdlc&se=2030-01-01T00%3A00%3A00Z&sig=c2ln".to_string(),
        ..owner
    };
    let result = demo::block_blob_with_account_sas(&config, &backend).await;
    assert!(matches!(result, Err(BlobTourError::ConfigError(_))));
}

#[test]
fn test_invalid_connection_string_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        connection_string: "AccountName=;AccountKey".to_string(),
        ..create_test_config(&dir)
    };
    let result = backend_from_config(&config);
    assert!(matches!(result, Err(BlobTourError::InvalidConnectionString(_))));
}
