//! blobtour - Azure Blob Storage walkthrough
//!
//! Runs the block blob, account SAS and page blob tours against the
//! configured storage account.

use blobtour::cli::{error_hint, Cli};
use blobtour::config::{self, Config};
use blobtour::error::Result;
use blobtour::utils::{wait_for_keypress, PRESS_ANY_KEY};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Load configuration, then initialize logging from it
    let loaded = load(&cli).await;
    let log_filter = match &loaded {
        Ok(config) => config.log_filter(),
        Err(_) => Config {
            debug: cli.debug,
            ..Config::default()
        }
        .log_filter(),
    };
    init_logging(log_filter);

    let pause = cli.runs_walkthrough();
    let (outcome, pause_on_exit) = run(cli, loaded).await;
    let pause = pause && pause_on_exit;

    match outcome {
        Ok(()) => {
            if pause {
                println!("{PRESS_ANY_KEY}");
                finish_pause();
            }
        }
        Err(e) => {
            error!("Error: {}", e);
            eprintln!("Error: {}", e);
            if let Some(hint) = error_hint(&e) {
                eprintln!("{hint}");
            }
            if pause {
                finish_pause();
            }
            std::process::exit(1);
        }
    }
}

/// Returns the command's outcome and whether to pause before exiting
async fn run(cli: Cli, loaded: Result<Config>) -> (Result<()>, bool) {
    info!("Starting blobtour");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => return (Err(e), true),
    };
    let pause_on_exit = config.pause_on_exit;

    // Config commands must work with an invalid configuration
    if cli.runs_walkthrough() {
        if let Err(e) = config.validate() {
            return (Err(e), pause_on_exit);
        }
    }

    (cli.execute(config).await, pause_on_exit)
}

async fn load(cli: &Cli) -> Result<Config> {
    let mut config = config::load_config(cli.config.as_deref()).await?;
    cli.apply_overrides(&mut config);
    Ok(config)
}

fn finish_pause() {
    if let Err(e) = wait_for_keypress() {
        error!("Failed to wait for a key press: {}", e);
    }
}

fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
