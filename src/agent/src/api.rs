//! Wire messages for the `harness.agent.Agent` service.
//!
//! Timestamps are Unix milliseconds. Enum fields carry `0` for
//! "unspecified"; what that means is decided per request.

/// Instance creation parameters.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstanceConfig {
    #[prost(uint32, tag = "1")]
    pub cpus: u32,
    #[prost(uint32, tag = "2")]
    pub memory_mb: u32,
    #[prost(enumeration = "NodeType", tag = "3")]
    pub node_type: i32,
    #[prost(string, tag = "4")]
    pub address: ::prost::alloc::string::String,
    #[prost(uint32, optional, tag = "5")]
    pub port: ::core::option::Option<u32>,
    #[prost(string, tag = "6")]
    pub log_level: ::prost::alloc::string::String,
    #[prost(bool, tag = "7")]
    pub single: bool,
    #[prost(string, optional, tag = "8")]
    pub log_path: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(double, optional, tag = "9")]
    pub cache_heap_ratio: ::core::option::Option<f64>,
    #[prost(uint64, optional, tag = "10")]
    pub initial_token: ::core::option::Option<u64>,
    #[prost(string, optional, tag = "11")]
    pub management_server: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(bool, tag = "12")]
    pub enable_tls: bool,
}

/// Where a provisioned instance is reachable.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Endpoint {
    #[prost(string, tag = "1")]
    pub address: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub port: u32,
}

/// Instance record as seen by callers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Instance {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub config: ::core::option::Option<InstanceConfig>,
    #[prost(enumeration = "InstanceState", tag = "3")]
    pub state: i32,
    #[prost(uint64, tag = "4")]
    pub version: u64,
    #[prost(string, optional, tag = "5")]
    pub last_error: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "6")]
    pub endpoint: ::core::option::Option<Endpoint>,
    #[prost(enumeration = "FaultType", repeated, tag = "7")]
    pub faults: ::prost::alloc::vec::Vec<i32>,
    #[prost(int64, tag = "8")]
    pub created_at: i64,
    #[prost(int64, tag = "9")]
    pub updated_at: i64,
    #[prost(int64, optional, tag = "10")]
    pub terminated_at: ::core::option::Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateInstanceRequest {
    #[prost(message, optional, tag = "1")]
    pub config: ::core::option::Option<InstanceConfig>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateInstanceResponse {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListInstancesRequest {
    /// Only return instances in this state
    #[prost(enumeration = "InstanceState", optional, tag = "1")]
    pub state: ::core::option::Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListInstancesResponse {
    #[prost(message, repeated, tag = "1")]
    pub instances: ::prost::alloc::vec::Vec<Instance>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetInstanceRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetInstanceResponse {
    #[prost(message, optional, tag = "1")]
    pub instance: ::core::option::Option<Instance>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RestartRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RestartResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TerminateRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TerminateResponse {}

/// Request for both `InjectFault` and `UndoFault`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaultRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(enumeration = "FaultType", tag = "2")]
    pub fault: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaultResponse {
    #[prost(message, optional, tag = "1")]
    pub instance: ::core::option::Option<Instance>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum InstanceState {
    Unspecified = 0,
    Pending = 1,
    Running = 2,
    Restarting = 3,
    Terminated = 4,
    Failed = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum NodeType {
    Unspecified = 0,
    Physical = 1,
    Vm = 2,
    Container = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FaultType {
    Unspecified = 0,
    Jitter = 1,
}
