//! KubeSpace Agent Daemon
//!
//! Runs inside the cluster, connects out to the KubeSpace server and serves
//! its requests against the cluster API.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ks_agent::Agent;
use ks_core::config::{self, AgentConfig};

#[derive(Parser)]
#[command(name = "ks-agent")]
#[command(about = "KubeSpace agent - bridges the KubeSpace server to the cluster API")]
#[command(version)]
struct Args {
    /// KubeSpace server address (host[:port])
    #[arg(long, env = "SERVER_URL")]
    server_url: Option<String>,

    /// Agent token issued by the server
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Path to a kubeconfig (in-cluster configuration when omitted)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Connect with wss/https
    #[arg(long)]
    tls: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let loaded = if config_path.exists() {
        Some(config::load_config::<AgentConfig>(&config_path))
    } else {
        None
    };
    let mut config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => AgentConfig::default(),
    };

    // Initialize logging
    let log_level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("KubeSpace Agent starting...");
    match loaded {
        Some(Ok(_)) => tracing::info!("Loaded config from {:?}", config_path),
        Some(Err(e)) => tracing::warn!("Failed to load config from {:?}: {}", config_path, e),
        None => tracing::debug!("No config file at {:?}, using defaults", config_path),
    }

    // Apply command-line overrides
    if let Some(server_url) = args.server_url {
        config.server_url = server_url;
    }
    if let Some(token) = args.token {
        config.token = token;
    }
    if let Some(kubeconfig) = args.kubeconfig {
        config.kubeconfig = Some(kubeconfig);
    }
    if args.tls {
        config.tls = true;
    }

    let agent = Agent::new(config)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    agent.run(shutdown).await
}
