use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

/// Log levels accepted by instance servers.
const SERVER_LOG_LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Where the instance is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Local process
    #[default]
    Physical,
    /// Virtual machine
    Vm,
    /// Container
    Container,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Physical => f.write_str("physical"),
            NodeType::Vm => f.write_str("vm"),
            NodeType::Container => f.write_str("container"),
        }
    }
}

/// Instance creation parameters
///
/// Immutable once the instance is created. `cpus` and `memory_mb` are
/// required; a zero value means the field was not supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Number of virtual CPUs
    #[serde(default)]
    pub cpus: u32,

    /// Memory in MB
    #[serde(default)]
    pub memory_mb: u32,

    /// Allocation backend
    #[serde(default)]
    pub node_type: NodeType,

    /// Address the server binds to
    #[serde(default = "default_address")]
    pub address: String,

    /// Server port; assigned by the provisioner when absent
    #[serde(default)]
    pub port: Option<u16>,

    /// Server log level
    #[serde(default = "default_server_log_level")]
    pub log_level: String,

    /// Bootstrap as a single-node cluster
    #[serde(default)]
    pub single: bool,

    /// Persistent log directory; the server runs in memory when absent
    #[serde(default)]
    pub log_path: Option<String>,

    /// Fraction of heap used for the read cache
    #[serde(default)]
    pub cache_heap_ratio: Option<f64>,

    /// Initial sequencer token
    #[serde(default)]
    pub initial_token: Option<u64>,

    /// Management server (host:port) to register with
    #[serde(default)]
    pub management_server: Option<String>,

    /// Serve over TLS
    #[serde(default)]
    pub enable_tls: bool,
}

fn default_address() -> String {
    "localhost".to_string()
}

fn default_server_log_level() -> String {
    "INFO".to_string()
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            cpus: 0,
            memory_mb: 0,
            node_type: NodeType::default(),
            address: default_address(),
            port: None,
            log_level: default_server_log_level(),
            single: false,
            log_path: None,
            cache_heap_ratio: None,
            initial_token: None,
            management_server: None,
            enable_tls: false,
        }
    }
}

impl InstanceConfig {
    /// Config with the required resources set and everything else defaulted.
    pub fn new(cpus: u32, memory_mb: u32) -> Self {
        Self {
            cpus,
            memory_mb,
            ..Default::default()
        }
    }

    /// Set node type
    pub fn with_node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    /// Set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set persistent log path
    pub fn with_log_path(mut self, path: impl Into<String>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Bootstrap as a single-node cluster
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Check required fields and ranges against the agent's limits.
    pub fn validate(&self, limits: &LimitsConfig) -> Result<()> {
        if self.cpus == 0 {
            return Err(HarnessError::invalid_config("cpus is required"));
        }
        if self.cpus > limits.max_cpus {
            return Err(HarnessError::invalid_config(format!(
                "cpus {} exceeds the limit of {}",
                self.cpus, limits.max_cpus
            )));
        }
        if self.memory_mb == 0 {
            return Err(HarnessError::invalid_config("memory_mb is required"));
        }
        if self.memory_mb < limits.min_memory_mb || self.memory_mb > limits.max_memory_mb {
            return Err(HarnessError::invalid_config(format!(
                "memory_mb {} outside [{}, {}]",
                self.memory_mb, limits.min_memory_mb, limits.max_memory_mb
            )));
        }
        if self.address.trim().is_empty() {
            return Err(HarnessError::invalid_config("address must not be empty"));
        }
        if self.port == Some(0) {
            return Err(HarnessError::invalid_config("port must be non-zero"));
        }
        if !SERVER_LOG_LEVELS
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&self.log_level))
        {
            return Err(HarnessError::invalid_config(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        if let Some(ratio) = self.cache_heap_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(HarnessError::invalid_config(format!(
                    "cache_heap_ratio {} outside (0, 1]",
                    ratio
                )));
            }
        }
        if let Some(ref path) = self.log_path {
            if path.trim().is_empty() {
                return Err(HarnessError::invalid_config("log_path must not be empty"));
            }
        }
        if let Some(ref server) = self.management_server {
            let valid = server
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(HarnessError::invalid_config(format!(
                    "management_server '{}' is not host:port",
                    server
                )));
            }
        }
        Ok(())
    }

    /// Server command-line arguments for this config.
    ///
    /// The port is positional and comes last; it is omitted until assigned.
    pub fn options_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--address={}", self.address),
            format!("--log-level={}", self.log_level.to_uppercase()),
        ];
        if self.single {
            args.push("--single".to_string());
        }
        match self.log_path {
            Some(ref path) => args.push(format!("--log-path={}", path)),
            None => args.push("--memory".to_string()),
        }
        if let Some(ratio) = self.cache_heap_ratio {
            args.push(format!("--cache-heap-ratio={}", ratio));
        }
        if let Some(token) = self.initial_token {
            args.push(format!("--initial-token={}", token));
        }
        if let Some(ref server) = self.management_server {
            args.push(format!("--management-server={}", server));
        }
        if self.enable_tls {
            args.push("--enable-tls".to_string());
        }
        if let Some(port) = self.port {
            args.push(port.to_string());
        }
        args
    }

    /// Server command line as a single string.
    pub fn options(&self) -> String {
        self.options_args().join(" ")
    }
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// TCP address the gRPC server listens on
    pub listen: String,

    /// Optional Unix domain socket served instead of TCP
    pub socket: Option<PathBuf>,

    /// Log level
    pub log_level: LogLevel,

    /// Provisioner retry policy
    pub retry: RetryConfig,

    /// Terminated-record retention
    pub retention: RetentionConfig,

    /// Resource limits for instance configs
    pub limits: LimitsConfig,

    /// Simulated provisioner settings
    pub simulator: SimulatorConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9090".to_string(),
            socket: None,
            log_level: LogLevel::Info,
            retry: RetryConfig::default(),
            retention: RetentionConfig::default(),
            limits: LimitsConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Default config file location (~/.harness/agent.yaml).
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".harness").join("agent.yaml"))
    }

    /// Load and validate a config file. `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config: AgentConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if self.socket.is_none() {
            self.listen.parse::<SocketAddr>().map_err(|e| {
                HarnessError::Config(format!("invalid listen address '{}': {}", self.listen, e))
            })?;
        }
        if self.retry.max_attempts == 0 {
            return Err(HarnessError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(HarnessError::Config(format!(
                "retry.initial_backoff_ms ({}) cannot exceed retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        if self.retention.sweep_interval_secs == 0 {
            return Err(HarnessError::Config(
                "retention.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.limits.max_cpus == 0 {
            return Err(HarnessError::Config(
                "limits.max_cpus must be greater than 0".to_string(),
            ));
        }
        if self.limits.min_memory_mb > self.limits.max_memory_mb {
            return Err(HarnessError::Config(format!(
                "limits.min_memory_mb ({}) cannot exceed limits.max_memory_mb ({})",
                self.limits.min_memory_mb, self.limits.max_memory_mb
            )));
        }
        if !(0.0..=1.0).contains(&self.simulator.failure_rate) {
            return Err(HarnessError::Config(format!(
                "simulator.failure_rate {} outside [0, 1]",
                self.simulator.failure_rate
            )));
        }
        Ok(())
    }
}

/// Provisioner retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per provisioner call (including the first)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_backoff_ms: u64,

    /// Backoff cap
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
        }
    }
}

/// Retention of terminated records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How long terminated records stay listable
    pub terminated_ttl_secs: u64,

    /// How often the reaper sweeps
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            terminated_ttl_secs: 3600, // 1 hour
            sweep_interval_secs: 60,
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum vCPUs per instance
    pub max_cpus: u32,

    /// Minimum memory per instance in MB
    pub min_memory_mb: u32,

    /// Maximum memory per instance in MB
    pub max_memory_mb: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_cpus: 64,
            min_memory_mb: 128,
            max_memory_mb: 1024 * 1024,
        }
    }
}

/// Simulated provisioner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Simulated bring-up latency
    pub boot_delay_ms: u64,

    /// Simulated restart latency
    pub restart_delay_ms: u64,

    /// Probability in [0, 1] that any single provisioner call fails
    pub failure_rate: f64,

    /// First port handed out to instances without an explicit port
    pub base_port: u16,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            boot_delay_ms: 500,
            restart_delay_ms: 250,
            failure_rate: 0.0,
            base_port: 9000,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
