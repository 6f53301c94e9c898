//! Harness Agent - gRPC front-end for the instance lifecycle controller.
//!
//! Translates `harness.agent.Agent` RPCs into controller calls and maps
//! controller errors onto gRPC status codes. Holds no lifecycle logic.

pub mod api;
pub mod convert;
pub mod error;
pub mod server;
pub mod service;

/// Generated `harness.agent.Agent` client and server.
pub mod rpc {
    include!(concat!(env!("OUT_DIR"), "/harness.agent.Agent.rs"));
}

pub use rpc::agent_client::AgentClient;
pub use server::AgentServer;
pub use service::AgentService;
