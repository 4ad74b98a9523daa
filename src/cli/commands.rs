//! CLI commands and argument parsing
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, subcommands, and their arguments.

use crate::auth::{
    create_storage_account_from_connection_string, generate_account_sas, AccountSasPolicy,
    StorageCredential,
};
use crate::blob::BackendKind;
use crate::config::{init_default_config, Config};
use crate::demo;
use crate::error::{BlobTourError, Result};
use crate::utils::generate_container_name;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blobtour")]
#[command(about = "A guided tour of Azure Blob Storage block blobs, page blobs and account SAS tokens")]
#[command(version, author)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Configuration file to load instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Storage connection string (defaults to the local emulator)
    #[arg(long, global = true, env = "STORAGE_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Storage backend to run against
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Exit without waiting for a key press
    #[arg(long, global = true)]
    pub no_pause: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the block blob, account SAS and page blob walkthroughs in order
    Run,
    /// Block blob walkthrough using the account key
    Block,
    /// Block blob walkthrough using an account SAS token
    BlockSas,
    /// Page blob walkthrough
    Page,
    /// Print an account SAS token and the URI of a fresh container
    Sas {
        /// Token lifetime in hours
        #[arg(long)]
        hours: Option<i64>,
    },
    /// Validate a connection string and print the resolved account
    Parse {
        /// Connection string to parse (defaults to the configured one)
        connection_string: Option<String>,
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
    /// Write the default configuration file
    Init,
}

impl Cli {
    /// True when the command talks to the storage service
    pub fn runs_walkthrough(&self) -> bool {
        matches!(
            self.command,
            None | Some(Commands::Run) | Some(Commands::Block) | Some(Commands::BlockSas) | Some(Commands::Page)
        )
    }

    /// Apply flags on top of file and environment settings
    pub fn apply_overrides(&self, config: &mut Config) {
        if self.debug {
            config.debug = true;
        }
        if let Some(connection_string) = &self.connection_string {
            config.connection_string = connection_string.clone();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if self.no_pause {
            config.pause_on_exit = false;
        }
    }

    pub async fn execute(self, config: Config) -> Result<()> {
        match self.command.unwrap_or(Commands::Run) {
            Commands::Run => execute_run_command(&config).await,
            Commands::Block => {
                let backend = demo::backend_from_config(&config)?;
                demo::block_blob_basic(&config, &backend).await.map(|_| ())
            }
            Commands::BlockSas => {
                let backend = demo::backend_from_config(&config)?;
                demo::block_blob_with_account_sas(&config, &backend)
                    .await
                    .map(|_| ())
            }
            Commands::Page => {
                let backend = demo::backend_from_config(&config)?;
                demo::page_blob_basic(&config, &backend).await.map(|_| ())
            }
            Commands::Sas { hours } => execute_sas_command(hours, &config),
            Commands::Parse {
                connection_string,
                format,
            } => execute_parse_command(connection_string, &format, &config),
            Commands::Config { command } => execute_config_command(command, self.config, &config).await,
        }
    }
}

/// Follow-up advice printed under a fatal error, if any applies
pub fn error_hint(error: &BlobTourError) -> Option<&'static str> {
    if error.is_configuration() {
        Some("Check the settings shown by `blobtour config show`, or pass --connection-string")
    } else {
        None
    }
}

async fn execute_run_command(config: &Config) -> Result<()> {
    let backend = demo::backend_from_config(config)?;
    demo::run_all(config, &backend).await
}

fn execute_sas_command(hours: Option<i64>, config: &Config) -> Result<()> {
    let hours = hours.unwrap_or(config.sas_expiry_hours);
    if hours <= 0 {
        return Err(BlobTourError::invalid_argument("--hours must be positive"));
    }

    let account = create_storage_account_from_connection_string(&config.connection_string)?;
    let policy = AccountSasPolicy::blob_container_and_objects(Utc::now(), Duration::hours(hours));
    let token = generate_account_sas(&account, &policy)?;

    let container = generate_container_name(&config.block_container_prefix);
    let container_uri = account.container_uri(&container)?;

    println!("账户SAS的签名: {}", token.signature());
    println!("账户SAS的令牌: {}", token);
    println!("Expires:       {}", token.expiry().to_rfc3339());
    println!("Container URI: {container_uri}?{token}");

    Ok(())
}

/// Resolved view of a connection string, safe to print
#[derive(Debug, Serialize)]
struct ParsedAccount {
    account_name: String,
    blob_endpoint: String,
    credential: &'static str,
    emulator: bool,
}

fn execute_parse_command(
    connection_string: Option<String>,
    format: &str,
    config: &Config,
) -> Result<()> {
    let connection_string = connection_string.unwrap_or_else(|| config.connection_string.clone());
    let account = create_storage_account_from_connection_string(&connection_string)?;

    let parsed = ParsedAccount {
        account_name: account.name().to_string(),
        blob_endpoint: account.blob_endpoint().to_string(),
        credential: match account.credential() {
            StorageCredential::AccountKey(_) => "account key",
            StorageCredential::SharedAccessSignature(_) => "shared access signature",
        },
        emulator: account.is_emulator(),
    };

    match format.to_lowercase().as_str() {
        "json" => {
            let json_output = serde_json::to_string_pretty(&parsed).map_err(|e| {
                BlobTourError::serialization(format!("Failed to serialize account: {e}"))
            })?;
            println!("{json_output}");
        }
        "table" => {
            println!("Account name:  {}", parsed.account_name);
            println!("Blob endpoint: {}", parsed.blob_endpoint);
            println!("Credential:    {}", parsed.credential);
            println!("Emulator:      {}", parsed.emulator);
        }
        other => {
            return Err(BlobTourError::invalid_argument(format!(
                "Unsupported format '{other}'. Use 'table' or 'json'"
            )))
        }
    }

    Ok(())
}

async fn execute_config_command(
    command: ConfigCommands,
    path: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let config_path = match path {
        Some(path) => path,
        None => Config::get_config_path()?,
    };

    match command {
        ConfigCommands::Show => execute_config_show(config),
        ConfigCommands::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
        ConfigCommands::Init => {
            if init_default_config(&config_path).await? {
                println!("Wrote default configuration to {}", config_path.display());
            } else {
                println!("Configuration already exists at {}", config_path.display());
            }
            Ok(())
        }
    }
}

fn execute_config_show(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    shown.connection_string = redact_connection_string(&shown.connection_string);

    let contents = toml::to_string_pretty(&shown)
        .map_err(|e| BlobTourError::serialization(format!("Failed to serialize configuration: {e}")))?;
    print!("{contents}");
    Ok(())
}

/// Hide key and signature values, keep everything else readable
fn redact_connection_string(connection_string: &str) -> String {
    connection_string
        .split(';')
        .map(|segment| match segment.split_once('=') {
            Some((key, _))
                if key.eq_ignore_ascii_case("AccountKey")
                    || key.eq_ignore_ascii_case("SharedAccessSignature") =>
            {
                format!("{key}=***")
            }
            _ => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_runs_walkthrough() {
        let cli = Cli::try_parse_from(["blobtour"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.runs_walkthrough());
    }

    #[test]
    fn test_overrides_win_over_config() {
        let cli = Cli::try_parse_from([
            "blobtour",
            "--backend",
            "memory",
            "--no-pause",
            "--connection-string",
            "UseDevelopmentStorage=true",
            "page",
        ])
        .unwrap();
        assert!(cli.runs_walkthrough());

        let mut config = Config {
            connection_string: "AccountName=other;AccountKey=a2V5".to_string(),
            ..Config::default()
        };
        cli.apply_overrides(&mut config);

        assert_eq!(config.backend, BackendKind::Memory);
        assert!(!config.pause_on_exit);
        assert_eq!(config.connection_string, "UseDevelopmentStorage=true");
    }

    #[test]
    fn test_config_command_does_not_run_walkthrough() {
        let cli = Cli::try_parse_from(["blobtour", "config", "path"]).unwrap();
        assert!(!cli.runs_walkthrough());
    }

    #[test]
    fn test_debug_flag_overrides_config() {
        let cli = Cli::try_parse_from(["blobtour", "--debug", "config", "show"]).unwrap();
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.log_filter(), "blobtour=debug");
    }

    #[test]
    fn test_error_hint_only_for_configuration_errors() {
        assert!(error_hint(&BlobTourError::config("bad page size")).is_some());
        assert!(error_hint(&BlobTourError::connection_string("empty")).is_some());
        assert!(error_hint(&BlobTourError::sas("'sp' is empty")).is_some());
        assert!(error_hint(&BlobTourError::unreachable("connection refused")).is_none());
        assert!(error_hint(&BlobTourError::blob_not_found("a.png")).is_none());
    }

    #[test]
    fn test_redact_connection_string() {
        let redacted = redact_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=demo;AccountKey=c2VjcmV0",
        );
        assert_eq!(
            redacted,
            "DefaultEndpointsProtocol=https;AccountName=demo;AccountKey=***"
        );
    }
}
