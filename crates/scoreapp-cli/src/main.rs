//! ScoreApp CLI - main entry point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scoreapp_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration before logging so the file can set the level
    let config = load_configuration(&cli)?;

    // Initialize logging
    setup_logging(cli.verbose, &config)?;
    match &cli.config {
        Some(path) => info!("Loaded configuration from: {}", path),
        None => info!("Using default configuration"),
    }

    // Execute the command
    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level, `RUST_LOG` and the configured level
fn setup_logging(verbose: bool, config: &AppConfig) -> Result<()> {
    let filter = if verbose {
        EnvFilter::default().add_directive(tracing::Level::DEBUG.into())
    } else {
        let level = config.logging.max_level()?;
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.logging.show_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
    Ok(())
}

/// Load configuration from file or use defaults, then apply CLI overrides
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(config_path) => AppConfig::load_from_file(config_path)?,
        None => AppConfig::default(),
    };
    config.apply_overrides(cli);
    config.validate()?;
    Ok(config)
}
