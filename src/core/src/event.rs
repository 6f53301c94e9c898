use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::instance::{Instance, InstanceId, InstanceState};

/// Lifecycle event, published after every committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceEvent {
    /// Event key (e.g., "instance.running")
    pub key: String,

    /// Instance the event is about
    pub instance_id: InstanceId,

    /// State after the mutation
    pub state: InstanceState,

    /// Version after the mutation
    pub version: u64,

    /// Error descriptor, for failures
    pub message: Option<String>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InstanceEvent {
    /// Create an event describing the given record.
    pub fn new(key: impl Into<String>, instance: &Instance) -> Self {
        Self {
            key: key.into(),
            instance_id: instance.id.clone(),
            state: instance.state,
            version: instance.version,
            message: instance.last_error.clone(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Event for entering the record's current state.
    pub fn for_state(instance: &Instance) -> Self {
        Self::new(events::state_key(instance.state), instance)
    }
}

/// Event emitter
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<InstanceEvent>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event. Dropped silently when nobody is subscribed.
    pub fn emit(&self, event: InstanceEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<InstanceEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Event catalog - predefined event keys
pub mod events {
    use crate::instance::InstanceState;

    pub const INSTANCE_PENDING: &str = "instance.pending";
    pub const INSTANCE_RUNNING: &str = "instance.running";
    pub const INSTANCE_RESTARTING: &str = "instance.restarting";
    pub const INSTANCE_TERMINATED: &str = "instance.terminated";
    pub const INSTANCE_FAILED: &str = "instance.failed";

    pub const FAULT_INJECTED: &str = "instance.fault.injected";
    pub const FAULT_UNDONE: &str = "instance.fault.undone";

    pub const INSTANCE_REAPED: &str = "instance.reaped";

    /// Key for entering `state`.
    pub fn state_key(state: InstanceState) -> &'static str {
        match state {
            InstanceState::Pending => INSTANCE_PENDING,
            InstanceState::Running => INSTANCE_RUNNING,
            InstanceState::Restarting => INSTANCE_RESTARTING,
            InstanceState::Terminated => INSTANCE_TERMINATED,
            InstanceState::Failed => INSTANCE_FAILED,
        }
    }
}
