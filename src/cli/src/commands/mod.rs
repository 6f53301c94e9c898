//! CLI command definitions and dispatch.

mod create;
mod fault;
mod inspect;
mod ps;
mod restart;
mod terminate;

use clap::{Parser, Subcommand};
use tonic::transport::Channel;

use harness_agent::error::ERROR_KIND_HEADER;
use harness_agent::AgentClient;

/// Default agent address.
const DEFAULT_ADDR: &str = "http://127.0.0.1:9090";

/// Harness - instance lifecycle client.
#[derive(Parser)]
#[command(name = "harness", version, about)]
pub struct Cli {
    /// Agent address (http://host:port)
    #[arg(long, global = true, env = "HARNESS_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Create a new instance
    Create(create::CreateArgs),
    /// List instances
    Ps(ps::PsArgs),
    /// Display detailed instance information as JSON
    Inspect(inspect::InspectArgs),
    /// Restart a running instance
    Restart(restart::RestartArgs),
    /// Terminate an instance
    Terminate(terminate::TerminateArgs),
    /// Inject or undo a fault on a running instance
    Fault(fault::FaultArgs),
}

/// Connect to the agent at `addr`.
pub(crate) async fn connect(addr: &str) -> Result<AgentClient<Channel>, Box<dyn std::error::Error>> {
    tracing::debug!(addr, "Connecting to agent");
    AgentClient::connect(addr.to_string())
        .await
        .map_err(|e| format!("cannot reach agent at {addr}: {e}").into())
}

/// Render an RPC failure as `message (kind)`.
pub(crate) fn rpc_error(status: tonic::Status) -> Box<dyn std::error::Error> {
    let kind = status
        .metadata()
        .get(ERROR_KIND_HEADER)
        .and_then(|v| v.to_str().ok());
    match kind {
        Some(kind) => format!("{} ({kind})", status.message()).into(),
        None => format!("{} ({:?})", status.message(), status.code()).into(),
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(&cli.addr).await?;
    match cli.command {
        Command::Create(args) => create::execute(&mut client, args).await,
        Command::Ps(args) => ps::execute(&mut client, args).await,
        Command::Inspect(args) => inspect::execute(&mut client, args).await,
        Command::Restart(args) => restart::execute(&mut client, args).await,
        Command::Terminate(args) => terminate::execute(&mut client, args).await,
        Command::Fault(args) => fault::execute(&mut client, args).await,
    }
}
