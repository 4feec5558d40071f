//! wa-gateway: WhatsApp Assistant Gateway Main Binary
//!
//! Usage:
//!   wa-gateway           - Start the webhook server
//!   wa-gateway --help    - Show help
//!   wa-gateway --version - Show version

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use wa_core::{Config, OpenAiClient, SessionManager};
use wa_twilio::WhatsAppBot;
use wa_voice::{WhisperClient, WhisperConfig};

/// Run mode
enum RunMode {
    /// Webhook server mode
    Server,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("wa-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration; missing credentials fail here, not mid-request
    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting wa-gateway...");
    tracing::info!("Model: {}", config.openai.sampling.model);

    run_server(config).await
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    let args: Vec<String> = std::env::args().collect();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("wa-gateway - WhatsApp Assistant Gateway");
    println!();
    println!("Usage:");
    println!("  wa-gateway           Start the webhook server");
    println!("  wa-gateway --help    Show this help message");
    println!("  wa-gateway --version Show version");
    println!();
    println!("Environment Variables:");
    println!("  OPENAI_API_KEY         OpenAI API key (required)");
    println!("  OPENAI_BASE_URL        Custom OpenAI-compatible endpoint");
    println!("  CHAT_MODEL             Chat model (default: gpt-3.5-turbo)");
    println!("  CHAT_START_TEMPLATE    Path to the start-template file");
    println!("  AGENT_NAME             Agent display name for prompt templating");
    println!("  TWILIO_ACCOUNT_SID     Twilio account SID (required)");
    println!("  TWILIO_AUTH_TOKEN      Twilio auth token (required)");
    println!("  TWILIO_WHATSAPP_NUMBER WhatsApp sender number");
    println!("  WEBHOOK_PORT           Webhook port (default: 5001)");
    println!("  DB_PATH                SQLite session database path");
    println!("  MAX_SESSION_MESSAGES   Per-session retention bound (0 = unlimited)");
}

/// Run the webhook server until interrupted
async fn run_server(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);

    let openai = Arc::new(
        OpenAiClient::new(&config)
            .map_err(|e| anyhow::anyhow!("Failed to create OpenAI client: {}", e))?,
    );

    let mut whisper_config = WhisperConfig::openai(&config.openai.api_key);
    if let Some(base_url) = &config.openai.base_url {
        whisper_config = whisper_config.with_base_url(base_url);
    }
    let whisper = Arc::new(
        WhisperClient::new(whisper_config)
            .map_err(|e| anyhow::anyhow!("Failed to create Whisper client: {}", e))?,
    );

    let sessions = Arc::new(
        SessionManager::new(&config.session.db_path, config.session.max_messages)
            .map_err(|e| anyhow::anyhow!("Failed to create session manager: {}", e))?,
    );

    let bot = WhatsAppBot::new(
        Arc::clone(&config),
        openai,
        whisper,
        sessions,
    )
    .map_err(|e| anyhow::anyhow!("Failed to create WhatsApp bot: {}", e))?;

    let port = config.server.port;
    let handle = tokio::spawn(async move {
        if let Err(e) = bot.start().await {
            tracing::error!("Webhook server error: {}", e);
        }
    });
    tracing::info!("Webhook server started on port {}", port);
    tracing::info!("Press Ctrl+C to exit");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    handle.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
