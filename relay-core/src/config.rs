use crate::mode::DifficultyMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub network: NetworkConfig,
    pub pool: PoolConfig,
    pub rpc: RpcConfig,
    pub difficulty: DifficultyConfig,
    pub control_panel: ControlPanelConfig,
    pub logging: LoggingConfig,
}

/// Miner-facing listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub listen_backlog: u32,
    /// Upper bound on the single request read from a connection
    pub max_request_bytes: usize,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

/// Upstream pool advertised to miners
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    pub url: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Bitcoin node RPC endpoint, only used by the `aggressive_pool` policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

/// Difficulty policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DifficultyConfig {
    pub initial_mode: DifficultyMode,
    pub initial_difficulty: u64,
    /// Seconds between automatic +1 difficulty ticks
    pub auto_increase_interval_secs: u64,
}

/// Operator control panel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlPanelConfig {
    pub enabled: bool,
    pub bind_address: SocketAddr,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Log output destination
    pub output: LogOutput,
    /// Whether to redact sensitive data
    pub redact_sensitive_data: bool,
    /// Per-component log levels
    pub component_levels: HashMap<String, String>,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// Log output options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File(PathBuf),
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6661,
            listen_backlog: 10,
            max_request_bytes: 1024,
            read_timeout_secs: 30,
            write_timeout_secs: 10,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: "stratum+tcp://examplepool.com".to_string(),
            port: 6661,
            username: "user".to_string(),
            password: "password".to_string(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8332,
            user: "rpcuser".to_string(),
            password: "rpcpassword".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            initial_mode: DifficultyMode::Normal,
            initial_difficulty: 16,
            auto_increase_interval_secs: 600,
        }
    }
}

impl Default for ControlPanelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            redact_sensitive_data: true,
            component_levels: HashMap::new(),
        }
    }
}

impl NetworkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl RpcConfig {
    /// JSON-RPC endpoint URL
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DifficultyConfig {
    pub fn auto_increase_interval(&self) -> Duration {
        Duration::from_secs(self.auto_increase_interval_secs)
    }
}

impl RelayConfig {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file(&self, path: &std::path::Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_network()?;
        self.validate_pool()?;
        self.validate_rpc()?;
        self.validate_difficulty()?;
        self.validate_logging()?;
        Ok(())
    }

    fn validate_network(&self) -> Result<()> {
        if self.network.host.trim().is_empty() {
            return Err(Error::Config("Listen host cannot be empty".to_string()));
        }
        if self.network.max_request_bytes == 0 || self.network.max_request_bytes > 64 * 1024 {
            return Err(Error::Config(format!(
                "max_request_bytes must be between 1 and 65536, got {}",
                self.network.max_request_bytes
            )));
        }
        if self.network.read_timeout_secs == 0 || self.network.write_timeout_secs == 0 {
            return Err(Error::Config("Connection timeouts must be greater than 0".to_string()));
        }
        if self.network.listen_backlog == 0 {
            return Err(Error::Config("listen_backlog must be greater than 0".to_string()));
        }
        Ok(())
    }

    fn validate_pool(&self) -> Result<()> {
        if self.pool.url.trim().is_empty() {
            return Err(Error::Config("Pool URL cannot be empty".to_string()));
        }
        if self.pool.port == 0 {
            return Err(Error::Config("Pool port must be greater than 0".to_string()));
        }
        Ok(())
    }

    fn validate_rpc(&self) -> Result<()> {
        if self.rpc.host.trim().is_empty() {
            return Err(Error::Config("RPC host cannot be empty".to_string()));
        }
        if self.rpc.port == 0 {
            return Err(Error::Config("RPC port must be greater than 0".to_string()));
        }
        if self.rpc.timeout_secs == 0 {
            return Err(Error::Config("RPC timeout must be greater than 0".to_string()));
        }
        Ok(())
    }

    fn validate_difficulty(&self) -> Result<()> {
        if self.difficulty.initial_difficulty == 0 {
            return Err(Error::Config("Initial difficulty must be at least 1".to_string()));
        }
        if self.difficulty.auto_increase_interval_secs == 0 {
            return Err(Error::Config(
                "Auto-increase interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_logging(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(Error::Config(format!("Invalid log level: {}", other))),
        }
    }

    /// Merge with environment variables
    pub fn merge_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("RELAYD_HOST") {
            self.network.host = host;
        }

        if let Ok(port) = std::env::var("RELAYD_PORT") {
            self.network.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid listen port: {}", e)))?;
        }

        if let Ok(url) = std::env::var("RELAYD_POOL_URL") {
            self.pool.url = url;
        }

        if let Ok(port) = std::env::var("RELAYD_POOL_PORT") {
            self.pool.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid pool port: {}", e)))?;
        }

        if let Ok(username) = std::env::var("RELAYD_POOL_USERNAME") {
            self.pool.username = username;
        }

        if let Ok(password) = std::env::var("RELAYD_POOL_PASSWORD") {
            self.pool.password = password;
        }

        if let Ok(host) = std::env::var("RELAYD_RPC_HOST") {
            self.rpc.host = host;
        }

        if let Ok(port) = std::env::var("RELAYD_RPC_PORT") {
            self.rpc.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid RPC port: {}", e)))?;
        }

        if let Ok(user) = std::env::var("RELAYD_RPC_USER") {
            self.rpc.user = user;
        }

        if let Ok(password) = std::env::var("RELAYD_RPC_PASSWORD") {
            self.rpc.password = password;
        }

        if let Ok(mode) = std::env::var("RELAYD_DIFFICULTY_MODE") {
            self.difficulty.initial_mode = mode.parse()?;
        }

        if let Ok(addr) = std::env::var("RELAYD_CONTROL_PANEL_ADDRESS") {
            self.control_panel.bind_address = addr
                .parse()
                .map_err(|e| Error::Config(format!("Invalid control panel address: {}", e)))?;
        }

        if let Ok(log_level) = std::env::var("RELAYD_LOG_LEVEL") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Load configuration with environment variable override
    pub fn load_with_env(path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };

        config.merge_env()?;
        config.validate()?;
        Ok(config)
    }
}
