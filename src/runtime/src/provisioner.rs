//! Provisioner - Trait for backends that bring instances up.
//!
//! Calls may be slow and are retried by the controller, so implementations
//! should make each call safe to repeat.

use async_trait::async_trait;

use harness_core::config::InstanceConfig;
use harness_core::error::{HarnessError, Result};
use harness_core::instance::{FaultType, InstanceId, ProvisionHandle};

/// Trait for provisioning backends.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Bring up a new instance with the given configuration.
    async fn bring_up(&self, id: &InstanceId, config: &InstanceConfig) -> Result<ProvisionHandle>;

    /// Restart a previously brought-up instance.
    async fn restart(&self, handle: &ProvisionHandle) -> Result<()>;

    /// Release everything held for the instance.
    async fn tear_down(&self, _handle: &ProvisionHandle) -> Result<()> {
        Ok(())
    }

    /// Start injecting `fault` into the instance.
    async fn inject_fault(&self, _handle: &ProvisionHandle, fault: FaultType) -> Result<()> {
        Err(HarnessError::provisioner(format!(
            "fault injection ({}) is not supported by this provisioner",
            fault
        )))
    }

    /// Stop injecting `fault` into the instance.
    async fn undo_fault(&self, _handle: &ProvisionHandle, fault: FaultType) -> Result<()> {
        Err(HarnessError::provisioner(format!(
            "fault injection ({}) is not supported by this provisioner",
            fault
        )))
    }
}
