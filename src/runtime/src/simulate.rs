//! Simulated provisioner for development and testing.
//!
//! Keeps "instances" as in-memory entries with endpoints handed out from a
//! port range. Latency and failure probability come from `SimulatorConfig`,
//! so the lifecycle paths (slow bring-up, retries, failures) can be
//! exercised without any real infrastructure.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use harness_core::config::{InstanceConfig, SimulatorConfig};
use harness_core::error::{HarnessError, Result};
use harness_core::instance::{Endpoint, FaultType, InstanceId, ProvisionHandle};

use crate::provisioner::Provisioner;

/// A simulated instance.
#[derive(Debug, Clone)]
struct SimulatedNode {
    instance_id: InstanceId,
    restarts: u32,
    faults: HashSet<FaultType>,
}

/// In-memory provisioner.
pub struct SimulatedProvisioner {
    config: SimulatorConfig,
    next_port: AtomicU32,
    next_token: AtomicU64,
    nodes: Mutex<HashMap<String, SimulatedNode>>,
}

impl SimulatedProvisioner {
    /// Create a simulator with the given settings.
    pub fn new(config: SimulatorConfig) -> Self {
        let base_port = u32::from(config.base_port);
        Self {
            config,
            next_port: AtomicU32::new(base_port),
            next_token: AtomicU64::new(1),
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Simulator with no latency and no failures.
    pub fn instant() -> Self {
        Self::new(SimulatorConfig {
            boot_delay_ms: 0,
            restart_delay_ms: 0,
            failure_rate: 0.0,
            base_port: 9000,
        })
    }

    /// Number of live simulated instances.
    pub fn live_count(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Restart count for a handle, if it is live.
    pub fn restarts(&self, handle: &ProvisionHandle) -> Option<u32> {
        self.nodes.lock().get(&handle.token).map(|n| n.restarts)
    }

    /// Active faults for a handle, if it is live.
    pub fn faults(&self, handle: &ProvisionHandle) -> Option<Vec<FaultType>> {
        self.nodes.lock().get(&handle.token).map(|n| {
            let mut faults: Vec<FaultType> = n.faults.iter().copied().collect();
            faults.sort();
            faults
        })
    }

    fn should_fail(&self) -> bool {
        let rate = self.config.failure_rate.clamp(0.0, 1.0);
        rate > 0.0 && rand::thread_rng().gen_bool(rate)
    }

    async fn delay(ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn allocate_port(&self) -> Result<u16> {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        u16::try_from(port)
            .map_err(|_| HarnessError::provisioner("simulated port range exhausted"))
    }

    fn with_node<T>(
        &self,
        handle: &ProvisionHandle,
        f: impl FnOnce(&mut SimulatedNode) -> T,
    ) -> Result<T> {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(&handle.token).ok_or_else(|| {
            HarnessError::provisioner(format!("unknown simulated instance '{}'", handle.token))
        })?;
        Ok(f(node))
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    async fn bring_up(&self, id: &InstanceId, config: &InstanceConfig) -> Result<ProvisionHandle> {
        Self::delay(self.config.boot_delay_ms).await;

        if self.should_fail() {
            return Err(HarnessError::provisioner(format!(
                "simulated bring-up failure for {}",
                id
            )));
        }

        let port = match config.port {
            Some(port) => port,
            None => self.allocate_port()?,
        };
        let token = format!("sim-{}", self.next_token.fetch_add(1, Ordering::SeqCst));

        tracing::debug!(
            instance_id = %id,
            token = %token,
            node_type = %config.node_type,
            command = %format!("{} {}", config.options(), port),
            "Simulated instance up"
        );

        self.nodes.lock().insert(
            token.clone(),
            SimulatedNode {
                instance_id: id.clone(),
                restarts: 0,
                faults: HashSet::new(),
            },
        );

        Ok(ProvisionHandle {
            token,
            endpoint: Endpoint {
                address: config.address.clone(),
                port,
            },
        })
    }

    async fn restart(&self, handle: &ProvisionHandle) -> Result<()> {
        Self::delay(self.config.restart_delay_ms).await;

        if self.should_fail() {
            return Err(HarnessError::provisioner(format!(
                "simulated restart failure for {}",
                handle.token
            )));
        }

        let instance_id = self.with_node(handle, |node| {
            node.restarts += 1;
            node.faults.clear();
            node.instance_id.clone()
        })?;
        tracing::debug!(instance_id = %instance_id, token = %handle.token, "Simulated instance restarted");
        Ok(())
    }

    async fn tear_down(&self, handle: &ProvisionHandle) -> Result<()> {
        if let Some(node) = self.nodes.lock().remove(&handle.token) {
            tracing::debug!(instance_id = %node.instance_id, token = %handle.token, "Simulated instance torn down");
        }
        Ok(())
    }

    async fn inject_fault(&self, handle: &ProvisionHandle, fault: FaultType) -> Result<()> {
        if self.should_fail() {
            return Err(HarnessError::provisioner(format!(
                "simulated fault injection failure for {}",
                handle.token
            )));
        }
        self.with_node(handle, |node| {
            node.faults.insert(fault);
        })
    }

    async fn undo_fault(&self, handle: &ProvisionHandle, fault: FaultType) -> Result<()> {
        self.with_node(handle, |node| {
            node.faults.remove(&fault);
        })
    }
}
