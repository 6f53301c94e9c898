//! Instance records and the lifecycle state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::InstanceConfig;

/// Opaque, never-reused instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Instance state machine.
///
/// ```text
/// Pending ──ready──▶ Running ──restart──▶ Restarting ──restarted──▶ Running
///    │                  │                     │
///    └──failure──▶ Failed ◀──────failure──────┘
///                    │      Running ──terminate──▶ Terminated
///                    └──────terminate──────────────▶ Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Record written, provisioner bringing the instance up
    Pending,

    /// Provisioner reported the instance ready
    Running,

    /// Restart requested, provisioner restarting the instance
    Restarting,

    /// Terminated on request; terminal
    Terminated,

    /// Provisioning failed or was cancelled; `last_error` is set
    Failed,
}

impl InstanceState {
    /// All states, in lifecycle order.
    pub const ALL: [InstanceState; 5] = [
        InstanceState::Pending,
        InstanceState::Running,
        InstanceState::Restarting,
        InstanceState::Terminated,
        InstanceState::Failed,
    ];

    /// Whether the state machine allows `self -> next`.
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Restarting)
                | (Restarting, Running)
                | (Restarting, Failed)
                | (Running, Terminated)
                | (Failed, Terminated)
        )
    }

    /// Lowercase name, as shown to users.
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Restarting => "restarting",
            InstanceState::Terminated => "terminated",
            InstanceState::Failed => "failed",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstanceState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown instance state '{}'", s))
    }
}

/// Faults that can be injected into a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultType {
    /// Network jitter on the instance's endpoint
    Jitter,
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultType::Jitter => f.write_str("jitter"),
        }
    }
}

/// Network endpoint of a provisioned instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Provisioner-issued handle for a brought-up instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionHandle {
    /// Provisioner-specific token (process id, VM name, container id...)
    pub token: String,
    /// Where the instance is reachable
    pub endpoint: Endpoint,
}

/// A managed compute instance.
///
/// Records are owned by the registry and only change through its
/// compare-and-swap path, which also maintains `version` and `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub config: InstanceConfig,
    pub state: InstanceState,
    pub version: u64,
    pub last_error: Option<String>,
    pub handle: Option<ProvisionHandle>,
    pub faults: Vec<FaultType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// A fresh `Pending` record at version 1.
    pub fn pending(id: InstanceId, config: InstanceConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            config,
            state: InstanceState::Pending,
            version: 1,
            last_error: None,
            handle: None,
            faults: Vec::new(),
            created_at: now,
            updated_at: now,
            terminated_at: None,
        }
    }

    /// Endpoint of the instance, if provisioned.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.handle.as_ref().map(|h| &h.endpoint)
    }

    /// Whether `fault` is currently injected.
    pub fn has_fault(&self, fault: FaultType) -> bool {
        self.faults.contains(&fault)
    }
}
