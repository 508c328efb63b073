//! Configuration management for Tormonol
//!
//! Defaults, TOML files and `TORMONOL_<SECTION>_<KEY>` environment overrides, all
//! funnelled through [`Config::validate`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core_frame::Dimensions;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP / WebSocket server
    pub server: ServerConfig,

    /// Trust anchor for the handshake
    pub auth: AuthConfig,

    /// Handshake store lifetimes
    pub handshake: HandshakeConfig,

    /// Shell spawned for every admitted session
    pub shell: ShellConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Put the detailed handshake failure reason in HTTP bodies.
    /// Off by default so an unauthenticated caller cannot tell which step failed.
    pub expose_failure_reasons: bool,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// SPKI PEM of the single authorized signing key
    pub authorized_key_path: PathBuf,
}

/// Lifetimes of the single-use handshake entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    #[serde(with = "humantime_serde")]
    pub nonce_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub checkpoint_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub session_key_ttl: Duration,

    /// How often expired entries are swept out of memory
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

/// Shell process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub term: String,

    /// Variables set verbatim in the shell environment
    pub env: BTreeMap<String, String>,

    /// Variables copied from the server's own environment when present
    pub env_passthrough: Vec<String>,

    /// Used when admission carries no `dimensions`
    pub default_dimensions: Dimensions,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter
    pub enabled: bool,

    /// Exporter bind address
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            shutdown_timeout: Duration::from_secs(10),
            expose_failure_reasons: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            authorized_key_path: base.join(".config").join("tormonol").join("authorized.pub.pem"),
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            nonce_ttl: Duration::from_millis(3_000),
            checkpoint_ttl: Duration::from_secs(30),
            session_key_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("COLORTERM".to_string(), "truecolor".to_string());

        Self {
            program: env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
            args: Vec::new(),
            cwd: dirs::home_dir(),
            term: "xterm-256color".to_string(),
            env,
            env_passthrough: [
                "PATH",
                "USER",
                "HOME",
                "LANG",
                "XDG_RUNTIME_DIR",
                "DBUS_SESSION_BUS_ADDRESS",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            default_dimensions: Dimensions { cols: 100, rows: 30 },
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}

/// Read and parse one environment override, if set.
fn env_override<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

fn env_duration(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(raw) => humantime_serde::re::humantime::parse_duration(&raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn env_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from environment variables on top of the defaults
    ///
    /// Environment variables follow the pattern: TORMONOL_<SECTION>_<KEY>
    /// Example: TORMONOL_SERVER_BIND_ADDRESS=0.0.0.0:3000
    ///
    /// Logging keys use the shorter `TORMONOL_LOG_` prefix. List values are
    /// comma-separated. `shell.env` can only be set from a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Layer environment overrides over whatever is already loaded
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(addr) = env_override("TORMONOL_SERVER_BIND_ADDRESS")? {
            self.server.bind_address = addr;
        }
        if let Some(timeout) = env_duration("TORMONOL_SERVER_SHUTDOWN_TIMEOUT")? {
            self.server.shutdown_timeout = timeout;
        }
        if let Some(expose) = env_override("TORMONOL_SERVER_EXPOSE_FAILURE_REASONS")? {
            self.server.expose_failure_reasons = expose;
        }

        if let Ok(path) = env::var("TORMONOL_AUTH_AUTHORIZED_KEY_PATH") {
            self.auth.authorized_key_path = PathBuf::from(path);
        }

        if let Some(ttl) = env_duration("TORMONOL_HANDSHAKE_NONCE_TTL")? {
            self.handshake.nonce_ttl = ttl;
        }
        if let Some(ttl) = env_duration("TORMONOL_HANDSHAKE_CHECKPOINT_TTL")? {
            self.handshake.checkpoint_ttl = ttl;
        }
        if let Some(ttl) = env_duration("TORMONOL_HANDSHAKE_SESSION_KEY_TTL")? {
            self.handshake.session_key_ttl = ttl;
        }
        if let Some(interval) = env_duration("TORMONOL_HANDSHAKE_SWEEP_INTERVAL")? {
            self.handshake.sweep_interval = interval;
        }

        if let Ok(program) = env::var("TORMONOL_SHELL_PROGRAM") {
            self.shell.program = program;
        }
        if let Ok(args) = env::var("TORMONOL_SHELL_ARGS") {
            self.shell.args = env_list(&args);
        }
        if let Ok(cwd) = env::var("TORMONOL_SHELL_CWD") {
            self.shell.cwd = Some(PathBuf::from(cwd));
        }
        if let Ok(term) = env::var("TORMONOL_SHELL_TERM") {
            self.shell.term = term;
        }
        if let Ok(names) = env::var("TORMONOL_SHELL_ENV_PASSTHROUGH") {
            self.shell.env_passthrough = env_list(&names);
        }
        if let Some(dims) = env_override::<Dimensions>("TORMONOL_SHELL_DEFAULT_DIMENSIONS")? {
            self.shell.default_dimensions = dims;
        }

        if let Ok(level) = env::var("TORMONOL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_override("TORMONOL_LOG_JSON")? {
            self.logging.json_format = json;
        }
        if let Some(with_target) = env_override("TORMONOL_LOG_WITH_TARGET")? {
            self.logging.with_target = with_target;
        }

        if let Some(enabled) = env_override("TORMONOL_METRICS_ENABLED")? {
            self.metrics.enabled = enabled;
        }
        if let Some(addr) = env_override("TORMONOL_METRICS_BIND_ADDRESS")? {
            self.metrics.bind_address = addr;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let handshake = &self.handshake;
        for (name, value) in [
            ("nonce_ttl", handshake.nonce_ttl),
            ("checkpoint_ttl", handshake.checkpoint_ttl),
            ("session_key_ttl", handshake.session_key_ttl),
            ("sweep_interval", handshake.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.shell.program.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "shell program must not be empty".to_string(),
            ));
        }

        let dims = self.shell.default_dimensions;
        if dims.cols == 0 || dims.rows == 0 {
            return Err(ConfigError::ValidationFailed(
                "default_dimensions must be positive".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents = self.to_toml_string()?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
