//! miniagent — the main entry point.
//!
//! Reads configuration from the environment, discovers skills, builds the
//! capability-driven tool registry, and serves the HTTP gateway until
//! interrupted. Exits non-zero on configuration or bind errors.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use miniagent_agent::{AgentLoop, LoopConfig};
use miniagent_config::AppConfig;
use miniagent_gateway::AppState;
use miniagent_memory::MemoryIndex;
use miniagent_providers::OpenAiProvider;
use miniagent_skills::SkillSet;
use miniagent_store::{SessionStore, ToolContextStore};

#[derive(Parser)]
#[command(
    name = "miniagent",
    about = "An LLM-driven agent runtime with an HTTP/SSE gateway",
    version
)]
struct Cli {
    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// User-global skills directory: `~/.miniagent/skills`.
fn user_skills_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".miniagent").join("skills")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("miniagent: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let skills = Arc::new(SkillSet::discover(
        &config.storage_root.join("skills"),
        &user_skills_dir(),
        Path::new("skills"),
    ));

    let provider = Arc::new(OpenAiProvider::new(
        &config.openai_base_url,
        &config.openai_api_key,
    ));
    let tools = Arc::new(miniagent_tools::build_registry(
        config.tavily_api_key.as_deref(),
        skills.clone(),
    ));

    let sessions = Arc::new(SessionStore::new(&config.storage_root));
    let context = Arc::new(ToolContextStore::new(&config.storage_root));
    let memory = Arc::new(MemoryIndex::new(&config.storage_root));

    info!(
        model = %config.model,
        tools = tools.names().len(),
        skills = skills.len(),
        storage = %config.storage_root.display(),
        "Starting miniagent"
    );

    let agent = AgentLoop::new(
        provider,
        tools,
        sessions,
        context,
        memory,
        LoopConfig {
            model: config.model.clone(),
            ..LoopConfig::default()
        },
    );

    miniagent_gateway::serve(AppState { agent, skills }, &config.host, config.port).await?;
    Ok(())
}
