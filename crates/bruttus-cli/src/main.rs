mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bruttus_agents::providers::build_http_client;
use bruttus_agents::{
    Conversation, Dispatcher, FusionRules, GeminiProvider, LlmProvider, OpenAiProvider, probe_all,
};
use bruttus_config::{AppConfig, ConfigLoader};
use bruttus_gateway::GatewayServer;
use bruttus_gateway::state::AppState;
use bruttus_security::RedactingWriter;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser)]
#[command(
    name = "bruttus",
    version,
    about = "Bug-bounty operations assistant backed by Gemini and OpenAI"
)]
struct Cli {
    /// Path to the YAML config file (default: ~/.bruttus/config.yml)
    #[arg(short, long, global = true, env = "BRUTTUS_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `bruttus_agents=debug`. RUST_LOG wins.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive terminal session (default)
    Chat,
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Probe both providers once and print their availability
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::new().with_path(path.clone()),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    init_tracing(&level);
    // logged here because the loader runs before tracing is installed
    match loader.source() {
        Some(path) => info!("loaded config from {}", path.display()),
        None => info!("no config file found, using defaults"),
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let conversation = start_conversation(&config).await?;
            let result = repl::run(&conversation).await;
            conversation.dispatcher().shutdown().await;
            result
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            let conversation = Arc::new(start_conversation(&config).await?);
            let state = Arc::new(AppState::new(config, Arc::clone(&conversation)));
            let result = GatewayServer::new(state).run().await;
            conversation.dispatcher().shutdown().await;
            result.context("gateway stopped with an error")
        }
        Commands::Status => print_status(&config).await,
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(RedactingWriter::stderr())
        .init();
}

fn build_providers(config: &AppConfig) -> Result<Vec<Arc<dyn LlmProvider>>> {
    let client = build_http_client(config.providers.request_timeout())
        .context("failed to build HTTP client")?;
    Ok(vec![
        Arc::new(GeminiProvider::from_config(
            &config.providers.gemini,
            client.clone(),
        )),
        Arc::new(OpenAiProvider::from_config(&config.providers.openai, client)),
    ])
}

async fn start_conversation(config: &AppConfig) -> Result<Conversation> {
    let providers = build_providers(config)?;
    let dispatcher = Arc::new(Dispatcher::new(&config.dispatcher));
    let conversation = Conversation::start(providers, dispatcher)
        .await
        .with_fusion_rules(FusionRules::from_config(&config.fusion));
    info!("providers: {}", conversation.status_line());
    Ok(conversation)
}

async fn print_status(config: &AppConfig) -> Result<()> {
    let providers = build_providers(config)?;
    let statuses = probe_all(&providers).await;
    for (provider, status) in providers.iter().zip(statuses) {
        println!("{}", repl::status_entry(provider.display_name(), &status));
    }
    Ok(())
}
