//! `harness restart` command - Restart a running instance.
//!
//! The agent acknowledges immediately; `--wait` polls until the instance
//! settles back to running or fails.

use std::time::{Duration, Instant};

use clap::Args;
use tonic::transport::Channel;

use harness_agent::api::{self, GetInstanceRequest, RestartRequest};
use harness_agent::AgentClient;

use super::rpc_error;

#[derive(Args)]
pub struct RestartArgs {
    /// Instance ID(s)
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Wait until each restart finishes
    #[arg(long)]
    pub wait: bool,

    /// Seconds to wait with --wait
    #[arg(short = 't', long, default_value = "60")]
    pub timeout: u64,
}

pub async fn execute(
    client: &mut AgentClient<Channel>,
    args: RestartArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut errors: Vec<String> = Vec::new();

    for id in &args.ids {
        let result = restart_one(client, id, &args).await;
        match result {
            Ok(()) => println!("{id}"),
            Err(e) => errors.push(format!("{id}: {e}")),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n").into())
    }
}

async fn restart_one(
    client: &mut AgentClient<Channel>,
    id: &str,
    args: &RestartArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    client
        .restart(RestartRequest { id: id.to_string() })
        .await
        .map_err(rpc_error)?;

    if !args.wait {
        return Ok(());
    }

    let timeout = Duration::from_secs(args.timeout);
    let start = Instant::now();
    loop {
        let instance = client
            .get_instance(GetInstanceRequest { id: id.to_string() })
            .await
            .map_err(rpc_error)?
            .into_inner()
            .instance
            .ok_or("agent returned no instance")?;

        match api::InstanceState::try_from(instance.state) {
            Ok(api::InstanceState::Running) => return Ok(()),
            Ok(api::InstanceState::Restarting) => {}
            _ => {
                let reason = instance
                    .last_error
                    .unwrap_or_else(|| "restart did not complete".to_string());
                return Err(reason.into());
            }
        }
        if start.elapsed() > timeout {
            return Err("timed out waiting for restart".into());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
