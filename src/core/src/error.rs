use thiserror::Error;

use crate::instance::InstanceState;

/// Harness agent error types
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Malformed or out-of-range creation parameters
    #[error("Invalid instance config: {0}")]
    InvalidConfig(String),

    /// Unknown instance id
    #[error("Instance not found: {0}")]
    NotFound(String),

    /// Operation is not legal in the instance's current state
    #[error("Cannot {operation} instance {id} in state {state}")]
    InvalidState {
        id: String,
        state: InstanceState,
        operation: &'static str,
    },

    /// Compare-and-swap lost against a concurrent mutation
    #[error("Version conflict on instance {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// Instance id already present in the registry
    #[error("Duplicate instance id: {0}")]
    DuplicateId(String),

    /// Provisioning failed (after retries, where retried)
    #[error("Provisioner error: {0}")]
    Provisioner(String),

    /// Registry inconsistency
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Agent configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HarnessError {
    /// Stable snake_case name of the error kind, carried to RPC callers.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::InvalidConfig(_) => "invalid_config",
            HarnessError::NotFound(_) => "not_found",
            HarnessError::InvalidState { .. } => "invalid_state",
            HarnessError::VersionConflict { .. } => "version_conflict",
            HarnessError::DuplicateId(_) => "duplicate_id",
            HarnessError::Provisioner(_) => "provisioner",
            HarnessError::InternalInvariant(_) => "internal_invariant",
            HarnessError::Config(_) => "config",
            HarnessError::Io(_) => "io",
            HarnessError::Serialization(_) => "serialization",
        }
    }

    /// Create an invalid-config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a provisioner error
    pub fn provisioner(msg: impl Into<String>) -> Self {
        Self::Provisioner(msg.into())
    }

    /// Create an internal-invariant error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalInvariant(msg.into())
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for HarnessError {
    fn from(err: serde_yaml::Error) -> Self {
        HarnessError::Serialization(err.to_string())
    }
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
