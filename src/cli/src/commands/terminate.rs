//! `harness terminate` command - Terminate one or more instances.

use clap::Args;
use tonic::transport::Channel;

use harness_agent::api::TerminateRequest;
use harness_agent::AgentClient;

use super::rpc_error;

#[derive(Args)]
pub struct TerminateArgs {
    /// Instance ID(s)
    #[arg(required = true)]
    pub ids: Vec<String>,
}

pub async fn execute(
    client: &mut AgentClient<Channel>,
    args: TerminateArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut errors: Vec<String> = Vec::new();

    for id in &args.ids {
        match client.terminate(TerminateRequest { id: id.clone() }).await {
            Ok(_) => println!("{id}"),
            Err(status) => errors.push(format!("{id}: {}", rpc_error(status))),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n").into())
    }
}
