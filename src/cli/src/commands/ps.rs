//! `harness ps` command - List instances.

use clap::Args;
use tonic::transport::Channel;

use harness_agent::api::{self, ListInstancesRequest};
use harness_agent::{convert, AgentClient};
use harness_core::instance::InstanceState;

use super::rpc_error;
use crate::output;

#[derive(Args)]
pub struct PsArgs {
    /// Show all instances (including terminated)
    #[arg(short, long)]
    pub all: bool,

    /// Only display instance IDs
    #[arg(short, long)]
    pub quiet: bool,

    /// Only show instances in this state
    #[arg(long)]
    pub state: Option<InstanceState>,
}

pub async fn execute(
    client: &mut AgentClient<Channel>,
    args: PsArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = args.state.map(|s| convert::state_to_api(s) as i32);
    let mut instances = client
        .list_instances(ListInstancesRequest { state })
        .await
        .map_err(rpc_error)?
        .into_inner()
        .instances;

    instances.retain(|i| visible(i, &args));
    instances.sort_by_key(|i| std::cmp::Reverse(i.created_at));

    if args.quiet {
        for instance in &instances {
            println!("{}", instance.id);
        }
        return Ok(());
    }

    let mut table = output::new_table(&[
        "INSTANCE ID",
        "STATE",
        "ENDPOINT",
        "CPUS",
        "MEMORY",
        "FAULTS",
        "VERSION",
        "CREATED",
    ]);

    for instance in &instances {
        table.add_row(row(instance));
    }

    println!("{table}");
    Ok(())
}

/// Terminated records are hidden unless `--all` or asked for by state.
fn visible(instance: &api::Instance, args: &PsArgs) -> bool {
    args.all
        || args.state.is_some()
        || instance.state != api::InstanceState::Terminated as i32
}

fn row(instance: &api::Instance) -> Vec<String> {
    let (cpus, memory) = match &instance.config {
        Some(c) => (c.cpus.to_string(), format!("{}MB", c.memory_mb)),
        None => ("-".to_string(), "-".to_string()),
    };
    vec![
        output::short_id(&instance.id).to_string(),
        output::state_name(instance.state),
        output::format_endpoint(instance.endpoint.as_ref()),
        cpus,
        memory,
        output::format_faults(&instance.faults),
        instance.version.to_string(),
        output::format_ago(instance.created_at),
    ]
}
