//! `harness fault` command - Inject or undo a fault.

use clap::{Args, Subcommand, ValueEnum};
use tonic::transport::Channel;

use harness_agent::api::{self, FaultRequest};
use harness_agent::AgentClient;

use super::rpc_error;
use crate::output;

/// Fault kinds accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FaultArg {
    Jitter,
}

impl From<FaultArg> for api::FaultType {
    fn from(arg: FaultArg) -> Self {
        match arg {
            FaultArg::Jitter => api::FaultType::Jitter,
        }
    }
}

#[derive(Args)]
pub struct FaultArgs {
    #[command(subcommand)]
    pub action: FaultAction,
}

#[derive(Subcommand)]
pub enum FaultAction {
    /// Inject a fault into a running instance
    Inject {
        /// Instance ID
        id: String,
        /// Fault to inject
        #[arg(value_enum)]
        fault: FaultArg,
    },
    /// Undo a previously injected fault
    Undo {
        /// Instance ID
        id: String,
        /// Fault to undo
        #[arg(value_enum)]
        fault: FaultArg,
    },
}

pub async fn execute(
    client: &mut AgentClient<Channel>,
    args: FaultArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = match args.action {
        FaultAction::Inject { id, fault } => {
            client
                .inject_fault(request(id, fault))
                .await
                .map_err(rpc_error)?
        }
        FaultAction::Undo { id, fault } => {
            client
                .undo_fault(request(id, fault))
                .await
                .map_err(rpc_error)?
        }
    };

    let instance = response
        .into_inner()
        .instance
        .ok_or("agent returned no instance")?;
    println!("{} faults={}", instance.id, output::format_faults(&instance.faults));
    Ok(())
}

fn request(id: String, fault: FaultArg) -> FaultRequest {
    FaultRequest {
        id,
        fault: api::FaultType::from(fault) as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: FaultArgs,
    }

    #[test]
    fn test_parse_inject() {
        let cli = TestCli::try_parse_from(["fault", "inject", "abc", "jitter"]).unwrap();
        match cli.args.action {
            FaultAction::Inject { id, fault } => {
                let req = request(id, fault);
                assert_eq!(req.id, "abc");
                assert_eq!(req.fault, api::FaultType::Jitter as i32);
            }
            FaultAction::Undo { .. } => panic!("expected inject"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_fault() {
        assert!(TestCli::try_parse_from(["fault", "undo", "abc", "latency"]).is_err());
    }
}
