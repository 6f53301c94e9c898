//! `harness inspect` command - Detailed instance information as JSON.

use clap::Args;
use serde::Serialize;
use tonic::transport::Channel;

use harness_agent::api::{self, GetInstanceRequest};
use harness_agent::AgentClient;

use super::rpc_error;
use crate::output;

#[derive(Args)]
pub struct InspectArgs {
    /// Instance ID
    pub id: String,
}

/// JSON view of an instance with enums and timestamps spelled out.
#[derive(Debug, Serialize)]
struct InstanceView {
    id: String,
    state: String,
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    faults: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<ConfigView>,
    created_at: Option<String>,
    updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terminated_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfigView {
    cpus: u32,
    memory_mb: u32,
    node_type: String,
    address: String,
    port: Option<u32>,
    log_level: String,
    single: bool,
    log_path: Option<String>,
    cache_heap_ratio: Option<f64>,
    initial_token: Option<u64>,
    management_server: Option<String>,
    enable_tls: bool,
}

fn rfc3339(millis: i64) -> Option<String> {
    output::from_millis(millis).map(|dt| dt.to_rfc3339())
}

impl From<&api::Instance> for InstanceView {
    fn from(instance: &api::Instance) -> Self {
        Self {
            id: instance.id.clone(),
            state: output::state_name(instance.state),
            version: instance.version,
            last_error: instance.last_error.clone(),
            endpoint: instance
                .endpoint
                .as_ref()
                .map(|e| output::format_endpoint(Some(e))),
            faults: instance
                .faults
                .iter()
                .map(|f| output::format_faults(std::slice::from_ref(f)))
                .collect(),
            config: instance.config.as_ref().map(ConfigView::from),
            created_at: rfc3339(instance.created_at),
            updated_at: rfc3339(instance.updated_at),
            terminated_at: instance.terminated_at.and_then(rfc3339),
        }
    }
}

impl From<&api::InstanceConfig> for ConfigView {
    fn from(config: &api::InstanceConfig) -> Self {
        let node_type = match api::NodeType::try_from(config.node_type) {
            Ok(api::NodeType::Unspecified) => "physical".to_string(),
            Ok(other) => format!("{other:?}").to_lowercase(),
            Err(_) => format!("unknown({})", config.node_type),
        };
        Self {
            cpus: config.cpus,
            memory_mb: config.memory_mb,
            node_type,
            address: config.address.clone(),
            port: config.port,
            log_level: config.log_level.clone(),
            single: config.single,
            log_path: config.log_path.clone(),
            cache_heap_ratio: config.cache_heap_ratio,
            initial_token: config.initial_token,
            management_server: config.management_server.clone(),
            enable_tls: config.enable_tls,
        }
    }
}

pub async fn execute(
    client: &mut AgentClient<Channel>,
    args: InspectArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let instance = client
        .get_instance(GetInstanceRequest { id: args.id })
        .await
        .map_err(rpc_error)?
        .into_inner()
        .instance
        .ok_or("agent returned no instance")?;

    let json = serde_json::to_string_pretty(&InstanceView::from(&instance))?;
    println!("{json}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_spells_out_enums() {
        let instance = api::Instance {
            id: "abc".to_string(),
            config: Some(api::InstanceConfig {
                cpus: 1,
                memory_mb: 512,
                node_type: api::NodeType::Container as i32,
                ..Default::default()
            }),
            state: api::InstanceState::Failed as i32,
            version: 3,
            last_error: Some("boom".to_string()),
            created_at: 0,
            updated_at: 1_000,
            ..Default::default()
        };

        let json = serde_json::to_value(InstanceView::from(&instance)).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["last_error"], "boom");
        assert_eq!(json["config"]["node_type"], "container");
        assert_eq!(json["updated_at"], "1970-01-01T00:00:01+00:00");
        assert!(json.get("endpoint").is_none());
        assert!(json.get("terminated_at").is_none());
    }
}
