// Lexis legal-draft pipeline
// Main entry point for the lexis binary

use clap::Parser;
use lexis_engine::cli::{Cli, Command};
use lexis_engine::config::Config;
use lexis_engine::handlers::{
    handle_chat, handle_doctor, handle_run, handle_show, handle_templates, OutputFormat,
};
use lexis_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!("Lexis v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run { input, session } => {
            tracing::info!("Processing turn");
            handle_run(input, session, &config, format).await
        }

        Command::Chat { session } => handle_chat(session, &config, format).await,

        Command::Show { session } => handle_show(session, &config, format).await,

        Command::Templates => handle_templates(&config, format).await,

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
