//! `harness create` command - Create an instance.

use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use tonic::transport::Channel;

use harness_agent::api::{self, CreateInstanceRequest, GetInstanceRequest};
use harness_agent::{convert, AgentClient};
use harness_core::config::{InstanceConfig, NodeType};

use super::rpc_error;
use crate::output::{self, parse_memory};

/// Node type as given on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NodeTypeArg {
    Physical,
    Vm,
    Container,
}

impl From<NodeTypeArg> for NodeType {
    fn from(arg: NodeTypeArg) -> Self {
        match arg {
            NodeTypeArg::Physical => NodeType::Physical,
            NodeTypeArg::Vm => NodeType::Vm,
            NodeTypeArg::Container => NodeType::Container,
        }
    }
}

#[derive(Args)]
pub struct CreateArgs {
    /// Number of CPUs
    #[arg(long)]
    pub cpus: u32,

    /// Memory (e.g., "512m", "2g")
    #[arg(long, value_parser = parse_memory)]
    pub memory: u32,

    /// Where the instance is allocated
    #[arg(long, value_enum, default_value = "physical")]
    pub node_type: NodeTypeArg,

    /// Address the instance advertises
    #[arg(long, default_value = "localhost")]
    pub address: String,

    /// Fixed port (assigned by the provisioner when omitted)
    #[arg(long)]
    pub port: Option<u16>,

    /// Server log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long, default_value = "INFO")]
    pub log_level: String,

    /// Run as a single-node cluster
    #[arg(long)]
    pub single: bool,

    /// Server log file path
    #[arg(long)]
    pub log_path: Option<String>,

    /// Fraction of heap given to the cache (0 < ratio <= 1)
    #[arg(long)]
    pub cache_heap_ratio: Option<f64>,

    /// Initial token for the node
    #[arg(long)]
    pub initial_token: Option<u64>,

    /// Management server address
    #[arg(long)]
    pub management_server: Option<String>,

    /// Enable TLS on the instance endpoint
    #[arg(long)]
    pub tls: bool,

    /// Wait until provisioning finishes
    #[arg(long)]
    pub wait: bool,

    /// Seconds to wait with --wait
    #[arg(short = 't', long, default_value = "60")]
    pub timeout: u64,
}

impl CreateArgs {
    fn to_config(&self) -> InstanceConfig {
        InstanceConfig {
            cpus: self.cpus,
            memory_mb: self.memory,
            node_type: self.node_type.into(),
            address: self.address.clone(),
            port: self.port,
            log_level: self.log_level.clone(),
            single: self.single,
            log_path: self.log_path.clone(),
            cache_heap_ratio: self.cache_heap_ratio,
            initial_token: self.initial_token,
            management_server: self.management_server.clone(),
            enable_tls: self.tls,
        }
    }
}

pub async fn execute(
    client: &mut AgentClient<Channel>,
    args: CreateArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = convert::config_to_api(&args.to_config());

    let id = client
        .create_instance(CreateInstanceRequest {
            config: Some(config),
        })
        .await
        .map_err(rpc_error)?
        .into_inner()
        .id;

    if !args.wait {
        println!("{id}");
        return Ok(());
    }

    let instance = wait_provisioned(client, &id, Duration::from_secs(args.timeout)).await?;
    if instance.state == api::InstanceState::Failed as i32 {
        let reason = instance.last_error.unwrap_or_else(|| "unknown error".to_string());
        return Err(format!("instance {id} failed: {reason}").into());
    }

    println!(
        "{id} {} {}",
        output::state_name(instance.state),
        output::format_endpoint(instance.endpoint.as_ref())
    );
    Ok(())
}

/// Poll until the instance leaves `pending`.
async fn wait_provisioned(
    client: &mut AgentClient<Channel>,
    id: &str,
    timeout: Duration,
) -> Result<api::Instance, Box<dyn std::error::Error>> {
    let start = Instant::now();
    loop {
        let instance = client
            .get_instance(GetInstanceRequest { id: id.to_string() })
            .await
            .map_err(rpc_error)?
            .into_inner()
            .instance
            .ok_or("agent returned no instance")?;

        if instance.state != api::InstanceState::Pending as i32 {
            return Ok(instance);
        }
        if start.elapsed() > timeout {
            return Err(format!("timed out waiting for instance {id}").into());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
