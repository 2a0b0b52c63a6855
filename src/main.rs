//! Second Guess: decision quality measurement service.
//!
//! This is the application entry point. It loads `.env` and the TOML
//! configuration, initializes tracing, opens the decision store, wires the
//! chat model into the evaluation pipeline and starts the HTTP server.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use second_guess::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use second_guess::http::{probe_health, start_server};
use second_guess::llm::{ChatModel, OpenAiClient};
use second_guess::observability::Langfuse;
use second_guess::pipeline::Pipeline;
use second_guess::routes::create_router;
use second_guess::service::DecisionService;
use second_guess::state::AppState;
use second_guess::store::DecisionStore;

/// Second Guess: measures the quality of business decisions
#[derive(Parser, Debug)]
#[command(name = "second-guess", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "second_guess=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the HTTP port from the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create the data directory and apply database migrations
    InitDb,
    /// Probe the local /health endpoint; exit status reflects the result
    Healthcheck,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // A missing .env file is normal in containers
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.http.port = port;
    }

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await?,
        Command::InitDb => init_db(&config).await?,
        Command::Healthcheck => return Ok(healthcheck(&config).await),
    }

    Ok(ExitCode::SUCCESS)
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = config.require_api_key()?.to_string();

    tracing::info!(
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        max_retries = config.llm.max_retries,
        "Loaded configuration"
    );

    let store = DecisionStore::connect(&config.database.location()).await?;

    let model: Arc<dyn ChatModel> = Arc::new(OpenAiClient::new(&config.llm, &api_key)?);
    let langfuse = Langfuse::from_config(&config.langfuse);
    let pipeline = Pipeline::new(model, config.llm.max_retries, langfuse.clone());

    let decisions = DecisionService::new(pipeline, store.clone(), &config.cache);
    let state = AppState::new(config.clone(), decisions);

    let app = create_router(state);
    start_server(app, &config.http).await?;

    // Ship whatever the last evaluations left buffered
    if let Some(langfuse) = langfuse {
        if let Err(e) = langfuse.flush().await {
            tracing::warn!(error = %e, "Failed to flush Langfuse events on shutdown");
        }
    }
    store.close().await;

    Ok(())
}

async fn init_db(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = DecisionStore::connect(&config.database.location()).await?;
    store.ping().await?;
    store.close().await;
    tracing::info!(location = ?config.database.location(), "Database initialized");
    Ok(())
}

async fn healthcheck(config: &AppConfig) -> ExitCode {
    if probe_health(config.http.port).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
