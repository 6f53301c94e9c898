//! Harness Agent binary.
//!
//! Loads the agent configuration, wires registry, controller, provisioner
//! and reaper together, and serves the Agent gRPC service until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use harness_agent::server::{AgentServer, BoxError, Listen};
use harness_core::config::AgentConfig;
use harness_core::event::EventEmitter;
use harness_runtime::{
    InstanceRegistry, LifecycleController, Reaper, RetryPolicy, SimulatedProvisioner,
};

/// Log output format.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Harness Agent
#[derive(Parser, Debug)]
#[command(name = "harness-agent", version, about = "Harness instance lifecycle agent")]
struct Args {
    /// Config file (YAML, or JSON by extension). Defaults to ~/.harness/agent.yaml if present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP address to listen on (overrides the config file).
    #[arg(long)]
    listen: Option<String>,

    /// Unix domain socket to serve on instead of TCP.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Log level or filter directive (overrides the config file; RUST_LOG wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let mut config = AgentConfig::load_or_default(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(socket) = args.socket {
        config.socket = Some(socket);
    }
    config.validate()?;

    let level = args
        .log_level
        .unwrap_or_else(|| config.log_level.as_filter().to_string());
    init_tracing(&level, args.log_format);

    let listen = match config.socket.clone() {
        Some(path) => Listen::Unix(path),
        None => Listen::Tcp(config.listen.clone()),
    };

    tracing::info!(
        listen = %listen,
        version = harness_runtime::VERSION,
        "Starting harness agent"
    );

    let registry = Arc::new(InstanceRegistry::new());
    let events = EventEmitter::default();
    let controller = LifecycleController::new(
        Arc::clone(&registry),
        Arc::new(SimulatedProvisioner::new(config.simulator.clone())),
        RetryPolicy::from_config(&config.retry),
        config.limits.clone(),
        events.clone(),
    );
    let reaper = Reaper::start(Arc::clone(&registry), config.retention.clone(), events);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    };

    let result = AgentServer::new(controller).serve(&listen, shutdown).await;
    reaper.shutdown().await;
    result
}
