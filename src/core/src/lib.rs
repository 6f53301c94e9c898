//! Harness Core - Foundational Types and Abstractions
//!
//! This module provides the types shared across the harness agent:
//! instance records, creation parameters, the agent configuration,
//! the error taxonomy and lifecycle events.

pub mod config;
pub mod error;
pub mod event;
pub mod instance;

// Re-export commonly used types
pub use config::{
    AgentConfig, InstanceConfig, LimitsConfig, LogLevel, NodeType, RetentionConfig, RetryConfig,
    SimulatorConfig,
};
pub use error::{HarnessError, Result};
pub use event::{EventEmitter, InstanceEvent};
pub use instance::{Endpoint, FaultType, Instance, InstanceId, InstanceState, ProvisionHandle};

/// Harness agent version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
