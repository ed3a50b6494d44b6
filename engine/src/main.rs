// Parley voice assistant
// Main entry point for the parley binary

use clap::Parser;
use parley_engine::cli::{Cli, Command};
use parley_engine::config::{expand_path, Config};
use parley_engine::handlers::{
    handle_ask, handle_chat, handle_doctor, handle_forget_key, handle_voice, OutputFormat,
};
use parley_engine::telemetry::init_telemetry_with_level;
use sdk::errors::{EngineError, ParleyErrorExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = &result {
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            eprintln!("Hint: {}", engine_error.user_hint());
        }
    }

    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config_path = match &cli.config {
        Some(path) => expand_path(path)?,
        None => Config::default_config_path()?,
    };
    let mut config = if cli.config.is_some() {
        Config::load_from_path(&config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG still wins over both
    if let Some(level) = &cli.log {
        config.core.log_level = level.clone();
        config.validate()?;
    }
    init_telemetry_with_level(&config.core.log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Parley v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Voice => {
            tracing::info!("Starting voice conversation...");
            handle_voice(&config, format).await
        }
        Command::Chat => {
            tracing::info!("Starting text conversation...");
            handle_chat(&config, format).await
        }
        Command::Ask { text } => handle_ask(text, &config, format).await,
        Command::Doctor => handle_doctor(&config, &config_path, format).await,
        Command::ForgetKey => handle_forget_key(format),
    }
}
