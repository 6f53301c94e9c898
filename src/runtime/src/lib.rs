//! Harness Runtime - instance lifecycle engine.
//!
//! This module provides the registry that owns instance records, the
//! lifecycle controller that drives them through the state machine, the
//! provisioner seam (with a simulated backend) and the retention reaper.

pub mod controller;
pub mod provisioner;
pub mod reaper;
pub mod registry;
pub mod retry;
pub mod simulate;

// Re-export common types
pub use controller::LifecycleController;
pub use provisioner::Provisioner;
pub use reaper::{Reaper, ReaperStats};
pub use registry::{InstanceRegistry, Snapshot};
pub use retry::RetryPolicy;
pub use simulate::SimulatedProvisioner;

/// Harness runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
