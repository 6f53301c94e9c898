//! Conversions between wire messages and domain types.
//!
//! Malformed input (unknown enum values, empty ids, out-of-range ports)
//! is rejected here as `InvalidConfig`, before the controller is called.

use harness_core::config::{InstanceConfig, NodeType};
use harness_core::error::{HarnessError, Result};
use harness_core::instance::{FaultType, Instance, InstanceId, InstanceState};

use crate::api;

/// Parse a wire config. Empty strings fall back to the defaults.
pub fn config_from_api(config: api::InstanceConfig) -> Result<InstanceConfig> {
    let defaults = InstanceConfig::default();

    let node_type = match api::NodeType::try_from(config.node_type) {
        Ok(api::NodeType::Unspecified) => defaults.node_type,
        Ok(api::NodeType::Physical) => NodeType::Physical,
        Ok(api::NodeType::Vm) => NodeType::Vm,
        Ok(api::NodeType::Container) => NodeType::Container,
        Err(_) => {
            return Err(HarnessError::invalid_config(format!(
                "unknown node_type {}",
                config.node_type
            )))
        }
    };

    let port = config
        .port
        .map(|port| {
            u16::try_from(port)
                .map_err(|_| HarnessError::invalid_config(format!("port {} out of range", port)))
        })
        .transpose()?;

    Ok(InstanceConfig {
        cpus: config.cpus,
        memory_mb: config.memory_mb,
        node_type,
        address: non_empty(config.address).unwrap_or(defaults.address),
        port,
        log_level: non_empty(config.log_level).unwrap_or(defaults.log_level),
        single: config.single,
        log_path: config.log_path,
        cache_heap_ratio: config.cache_heap_ratio,
        initial_token: config.initial_token,
        management_server: config.management_server,
        enable_tls: config.enable_tls,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Wire form of a config.
pub fn config_to_api(config: &InstanceConfig) -> api::InstanceConfig {
    api::InstanceConfig {
        cpus: config.cpus,
        memory_mb: config.memory_mb,
        node_type: node_type_to_api(config.node_type) as i32,
        address: config.address.clone(),
        port: config.port.map(u32::from),
        log_level: config.log_level.clone(),
        single: config.single,
        log_path: config.log_path.clone(),
        cache_heap_ratio: config.cache_heap_ratio,
        initial_token: config.initial_token,
        management_server: config.management_server.clone(),
        enable_tls: config.enable_tls,
    }
}

fn node_type_to_api(node_type: NodeType) -> api::NodeType {
    match node_type {
        NodeType::Physical => api::NodeType::Physical,
        NodeType::Vm => api::NodeType::Vm,
        NodeType::Container => api::NodeType::Container,
    }
}

/// Wire form of a state.
pub fn state_to_api(state: InstanceState) -> api::InstanceState {
    match state {
        InstanceState::Pending => api::InstanceState::Pending,
        InstanceState::Running => api::InstanceState::Running,
        InstanceState::Restarting => api::InstanceState::Restarting,
        InstanceState::Terminated => api::InstanceState::Terminated,
        InstanceState::Failed => api::InstanceState::Failed,
    }
}

/// Parse a wire state; `Unspecified` yields `None`.
pub fn state_from_api(value: i32) -> Result<Option<InstanceState>> {
    match api::InstanceState::try_from(value) {
        Ok(api::InstanceState::Unspecified) => Ok(None),
        Ok(api::InstanceState::Pending) => Ok(Some(InstanceState::Pending)),
        Ok(api::InstanceState::Running) => Ok(Some(InstanceState::Running)),
        Ok(api::InstanceState::Restarting) => Ok(Some(InstanceState::Restarting)),
        Ok(api::InstanceState::Terminated) => Ok(Some(InstanceState::Terminated)),
        Ok(api::InstanceState::Failed) => Ok(Some(InstanceState::Failed)),
        Err(_) => Err(HarnessError::invalid_config(format!(
            "unknown instance state {}",
            value
        ))),
    }
}

/// Wire form of a fault.
pub fn fault_to_api(fault: FaultType) -> api::FaultType {
    match fault {
        FaultType::Jitter => api::FaultType::Jitter,
    }
}

/// Parse a wire fault; it must be specified.
pub fn fault_from_api(value: i32) -> Result<FaultType> {
    match api::FaultType::try_from(value) {
        Ok(api::FaultType::Jitter) => Ok(FaultType::Jitter),
        Ok(api::FaultType::Unspecified) => Err(HarnessError::invalid_config("fault is required")),
        Err(_) => Err(HarnessError::invalid_config(format!(
            "unknown fault type {}",
            value
        ))),
    }
}

/// Parse a wire instance id.
pub fn instance_id(id: String) -> Result<InstanceId> {
    if id.trim().is_empty() {
        return Err(HarnessError::invalid_config("instance id is required"));
    }
    Ok(InstanceId::from(id))
}

/// Wire form of an instance record.
pub fn instance_to_api(instance: &Instance) -> api::Instance {
    api::Instance {
        id: instance.id.to_string(),
        config: Some(config_to_api(&instance.config)),
        state: state_to_api(instance.state) as i32,
        version: instance.version,
        last_error: instance.last_error.clone(),
        endpoint: instance.endpoint().map(|e| api::Endpoint {
            address: e.address.clone(),
            port: u32::from(e.port),
        }),
        faults: instance
            .faults
            .iter()
            .map(|f| fault_to_api(*f) as i32)
            .collect(),
        created_at: instance.created_at.timestamp_millis(),
        updated_at: instance.updated_at.timestamp_millis(),
        terminated_at: instance.terminated_at.map(|t| t.timestamp_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_core::instance::{Endpoint, ProvisionHandle};

    #[test]
    fn test_empty_strings_take_defaults() {
        let config = config_from_api(api::InstanceConfig {
            cpus: 2,
            memory_mb: 1024,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config, InstanceConfig::new(2, 1024));
    }

    #[test]
    fn test_empty_config_still_fails_validation() {
        let config = config_from_api(api::InstanceConfig::default()).unwrap();
        let err = config
            .validate(&harness_core::config::LimitsConfig::default())
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let err = config_from_api(api::InstanceConfig {
            cpus: 1,
            memory_mb: 512,
            node_type: 42,
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("node_type 42"));
    }

    #[test]
    fn test_port_out_of_range_rejected() {
        let err = config_from_api(api::InstanceConfig {
            cpus: 1,
            memory_mb: 512,
            port: Some(70_000),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_survives_the_wire() {
        let config = InstanceConfig::new(4, 4096)
            .with_node_type(NodeType::Container)
            .with_port(9001)
            .with_log_path("/var/log/node")
            .single();
        assert_eq!(config_from_api(config_to_api(&config)).unwrap(), config);
    }

    #[test]
    fn test_state_filter() {
        assert_eq!(state_from_api(0).unwrap(), None);
        assert_eq!(state_from_api(2).unwrap(), Some(InstanceState::Running));
        assert!(state_from_api(99).is_err());
    }

    #[test]
    fn test_fault_parsing() {
        assert_eq!(fault_from_api(1).unwrap(), FaultType::Jitter);
        assert!(fault_from_api(0).is_err());
        assert!(fault_from_api(7).is_err());
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(instance_id(String::new()).is_err());
        assert!(instance_id("  ".to_string()).is_err());
        assert_eq!(instance_id("abc".to_string()).unwrap().as_str(), "abc");
    }

    #[test]
    fn test_instance_to_api() {
        let mut instance =
            Instance::pending(InstanceId::from("i-1"), InstanceConfig::new(1, 512));
        instance.state = InstanceState::Running;
        instance.version = 3;
        instance.handle = Some(ProvisionHandle {
            token: "sim-1".to_string(),
            endpoint: Endpoint {
                address: "localhost".to_string(),
                port: 9000,
            },
        });
        instance.faults = vec![FaultType::Jitter];

        let wire = instance_to_api(&instance);
        assert_eq!(wire.id, "i-1");
        assert_eq!(wire.state, api::InstanceState::Running as i32);
        assert_eq!(wire.version, 3);
        assert_eq!(wire.endpoint.unwrap().port, 9000);
        assert_eq!(wire.faults, vec![api::FaultType::Jitter as i32]);
        assert!(wire.terminated_at.is_none());
        assert_eq!(wire.created_at, instance.created_at.timestamp_millis());
    }
}
