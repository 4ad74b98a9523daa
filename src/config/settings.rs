//! Configuration settings management
//!
//! This module handles loading configuration from multiple sources,
//! validation, and persistence.

use crate::blob::models::validate_page_blob_size;
use crate::blob::BackendKind;
use crate::error::{BlobTourError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection string used when nothing else is configured: the local emulator
pub const DEFAULT_CONNECTION_STRING: &str = "UseDevelopmentStorage=true";

const DEFAULT_LOG_FILTER: &str = "blobtour=warn";
const DEBUG_LOG_FILTER: &str = "blobtour=debug";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug: bool,
    pub connection_string: String,
    pub backend: BackendKind,
    /// Local file uploaded by the block blob routines
    pub image_path: PathBuf,
    /// Directory the downloaded copy is written to
    pub download_dir: PathBuf,
    pub block_container_prefix: String,
    pub page_container_prefix: String,
    pub page_blob_name: String,
    pub page_blob_size: u64,
    pub sas_expiry_hours: i64,
    /// Items requested per listing segment
    pub list_segment_size: usize,
    /// Wait for a key press before exiting
    pub pause_on_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            connection_string: DEFAULT_CONNECTION_STRING.to_string(),
            backend: BackendKind::Azure,
            image_path: PathBuf::from("assets/HelloWorld.png"),
            download_dir: PathBuf::from("."),
            block_container_prefix: "demoblockblobcontainer".to_string(),
            page_container_prefix: "demopageblobcontainer".to_string(),
            page_blob_name: "samplepageblob".to_string(),
            page_blob_size: 512 * 2,
            sas_expiry_hours: 24,
            list_segment_size: 5000,
            pause_on_exit: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// `tracing` filter used when `RUST_LOG` is not set
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            DEBUG_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(BlobTourError::config(
                "A storage connection string is required (set STORAGE_CONNECTION_STRING)",
            ));
        }

        validate_page_blob_size(self.page_blob_size)
            .map_err(|e| BlobTourError::config(e.to_string()))?;

        if self.sas_expiry_hours <= 0 {
            return Err(BlobTourError::config("sas_expiry_hours must be positive"));
        }

        if self.list_segment_size == 0 {
            return Err(BlobTourError::config("list_segment_size must be positive"));
        }

        if self.page_blob_name.trim().is_empty() {
            return Err(BlobTourError::config("page_blob_name cannot be empty"));
        }

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        // Use XDG Base Directory specification on Linux and macOS
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            use std::env;
            let config_dir = if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
                PathBuf::from(xdg_config_home)
            } else {
                let home_dir = env::var("HOME")
                    .map_err(|_| BlobTourError::config("HOME environment variable not set"))?;
                PathBuf::from(home_dir).join(".config")
            };
            Ok(config_dir.join("blobtour").join("blobtour.toml"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let config_dir = dirs::config_dir()
                .ok_or_else(|| BlobTourError::config("Unable to determine config directory"))?;
            Ok(config_dir.join("blobtour").join("blobtour.toml"))
        }
    }

    /// Name of the local copy written by the download step
    pub fn download_path(&self) -> PathBuf {
        let file_name = self
            .image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "blob".to_string());
        self.download_dir.join(format!("CopyOf{file_name}"))
    }

    /// Blob name the image is uploaded under
    pub fn image_blob_name(&self) -> Result<String> {
        self.image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                BlobTourError::config(format!(
                    "image path '{}' has no file name",
                    self.image_path.display()
                ))
            })
    }
}

/// Load configuration from multiple sources with priority order:
/// 1. Command-line flags (applied by the caller)
/// 2. Environment variables
/// 3. Configuration file
/// 4. Default values
pub async fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::get_config_path()?,
    };
    if config_path.exists() {
        config = load_from_file(&config_path).await?;
    } else if path.is_some() {
        return Err(BlobTourError::config(format!(
            "configuration file '{}' does not exist",
            config_path.display()
        )));
    }

    load_from_env(&mut config);

    Ok(config)
}

async fn load_from_file(path: &Path) -> Result<Config> {
    let contents = tokio::fs::read_to_string(path).await?;

    // Try to parse as TOML first, then JSON as fallback
    if let Ok(config) = toml::from_str::<Config>(&contents) {
        return Ok(config);
    }

    let config = serde_json::from_str::<Config>(&contents)?;
    Ok(config)
}

fn load_from_env(config: &mut Config) {
    if let Ok(value) = std::env::var("DEBUG") {
        config.debug = value.to_lowercase() == "true" || value == "1";
    }

    if let Ok(value) = std::env::var("STORAGE_CONNECTION_STRING") {
        config.connection_string = value;
    }

    if let Ok(value) = std::env::var("BLOBTOUR_BACKEND") {
        match value.to_lowercase().as_str() {
            "azure" => config.backend = BackendKind::Azure,
            "memory" => config.backend = BackendKind::Memory,
            other => tracing::warn!("Ignoring unknown BLOBTOUR_BACKEND '{}'", other),
        }
    }

    if let Ok(value) = std::env::var("BLOBTOUR_IMAGE") {
        config.image_path = PathBuf::from(value);
    }

    if let Ok(value) = std::env::var("BLOBTOUR_DOWNLOAD_DIR") {
        config.download_dir = PathBuf::from(value);
    }

    if let Ok(value) = std::env::var("BLOBTOUR_PAGE_BLOB_SIZE") {
        if let Ok(size) = value.parse::<u64>() {
            config.page_blob_size = size;
        }
    }

    if let Ok(value) = std::env::var("BLOBTOUR_SAS_EXPIRY_HOURS") {
        if let Ok(hours) = value.parse::<i64>() {
            config.sas_expiry_hours = hours;
        }
    }
}

pub async fn save_config(config: &Config, path: &Path) -> Result<()> {
    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| BlobTourError::serialization(e.to_string()))?;

    tokio::fs::write(path, contents).await?;

    Ok(())
}

/// Write the default configuration unless a file already exists.
/// Returns true if a file was written.
pub async fn init_default_config(path: &Path) -> Result<bool> {
    // Don't overwrite existing configuration
    if path.exists() {
        return Ok(false);
    }

    save_config(&Config::default(), path).await?;
    Ok(true)
}
