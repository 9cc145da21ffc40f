//! Configuration system for the Petstore client.
//!
//! Configuration is built once at process start and is read-only afterwards.
//! It can be loaded from layered TOML files and environment variables, or
//! rebuilt from the flat key/value surface (`server.command`, `retry_attempts`, ...).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Keys accepted by [`ClientConfig::from_flat`].
pub const RECOGNIZED_KEYS: &[&str] = &[
    "server.command",
    "server.args",
    "server.cwd",
    "server.env",
    "server.timeout",
    "retry_attempts",
    "retry_delay",
    "log_level",
    "enable_caching",
    "cache_ttl",
    "max_cache_size",
];

/// Launch parameters for the tool server process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Command to execute
    pub command: String,
    /// Command arguments, in order
    pub args: Vec<String>,
    /// Working directory (inherits the current one when unset)
    pub cwd: Option<PathBuf>,
    /// Environment variable overrides
    pub env: HashMap<String, String>,
    /// Connection and per-request timeout, in seconds
    pub timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["./petstore-mcp-server.py".to_string()],
            cwd: None,
            env: HashMap::new(),
            timeout: 30,
        }
    }
}

impl ServerConfig {
    /// Create a server configuration for a command with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            ..Default::default()
        }
    }

    /// Set the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment variable override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Directory the server is started in.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set the timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Largest accepted base retry delay, in seconds.
pub const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" | "critical" => Ok(Self::Error),
            other => Err(format!(
                "invalid log level '{}'. Valid values: trace, debug, info, warning, error",
                other
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.to_string()
    }
}

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Tool server launch parameters
    pub server: ServerConfig,
    /// Total attempts for transient failures
    pub retry_attempts: u32,
    /// Base delay between retries, in seconds
    pub retry_delay: f64,
    /// Log verbosity
    pub log_level: LogLevel,
    /// Cache read-only tool results
    pub enable_caching: bool,
    /// Cache entry lifetime, in seconds
    pub cache_ttl: u64,
    /// Maximum number of cached results
    pub max_cache_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            retry_attempts: 3,
            retry_delay: 1.0,
            log_level: LogLevel::Info,
            enable_caching: true,
            cache_ttl: 300,
            max_cache_size: 1000,
        }
    }
}

impl ClientConfig {
    /// Create a configuration around a server with default policies.
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            ..Default::default()
        }
    }

    /// Set retry attempts and base delay (seconds).
    pub fn with_retry(mut self, attempts: u32, delay_secs: f64) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay_secs;
        self
    }

    /// Enable or disable caching.
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    /// Set the cache TTL in seconds.
    pub fn with_cache_ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl = seconds;
        self
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Base retry delay as a [`Duration`], clamped to
    /// `0..=MAX_RETRY_DELAY_SECS`. NaN maps to zero.
    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay.clamp(0.0, MAX_RETRY_DELAY_SECS))
            .unwrap_or(Duration::ZERO)
    }

    /// Cache TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    /// Rebuild a configuration from a flat key/value mapping.
    ///
    /// Keys use dots for nesting (`server.timeout`). Missing keys keep their
    /// defaults; unrecognized keys are logged and ignored.
    pub fn from_flat<I, K>(entries: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut nested = serde_json::Map::new();

        for (key, value) in entries {
            let key = key.as_ref();
            if !RECOGNIZED_KEYS.contains(&key) {
                tracing::warn!(key = key, "Ignoring unrecognized configuration key");
                continue;
            }
            insert_dotted(&mut nested, key, value);
        }

        Figment::new()
            .merge(Serialized::defaults(ClientConfig::default()))
            .merge(Serialized::globals(Value::Object(nested)))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Flatten this configuration back into the key/value surface.
    pub fn to_flat(&self) -> BTreeMap<String, Value> {
        let mut flat = BTreeMap::new();
        flat.insert("server.command".to_string(), Value::from(self.server.command.clone()));
        flat.insert("server.args".to_string(), Value::from(self.server.args.clone()));
        flat.insert(
            "server.cwd".to_string(),
            self.server
                .cwd
                .as_ref()
                .map(|p| Value::from(p.display().to_string()))
                .unwrap_or(Value::Null),
        );
        flat.insert(
            "server.env".to_string(),
            serde_json::to_value(&self.server.env).unwrap_or(Value::Null),
        );
        flat.insert("server.timeout".to_string(), Value::from(self.server.timeout));
        flat.insert("retry_attempts".to_string(), Value::from(self.retry_attempts));
        flat.insert("retry_delay".to_string(), Value::from(self.retry_delay));
        flat.insert("log_level".to_string(), Value::from(self.log_level.to_string()));
        flat.insert("enable_caching".to_string(), Value::from(self.enable_caching));
        flat.insert("cache_ttl".to_string(), Value::from(self.cache_ttl));
        flat.insert("max_cache_size".to_string(), Value::from(self.max_cache_size));
        flat
    }

    /// Load configuration from all sources.
    ///
    /// Later sources override earlier ones: defaults, the user config file,
    /// `./petstore.toml`, the explicit `path`, then `PETSTORE_` environment
    /// variables (nested with `__`, e.g. `PETSTORE_SERVER__TIMEOUT`).
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            .merge(Toml::file("petstore.toml"));

        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed("PETSTORE_").split("__"))
            .extract()
    }

    /// Load and validate configuration.
    pub fn load_validated(path: Option<&Path>) -> Result<Self, Error> {
        let config = Self::load(path).map_err(|e| Error::Config(e.to_string()))?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Fail on validation errors and log warnings.
    pub fn ensure_valid(&self) -> Result<(), Error> {
        let result = self.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!(field = %warning.field, "{}", warning.message);
        }

        Ok(())
    }

    /// Check every field, collecting all problems rather than stopping at the first.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.server.command.trim().is_empty() {
            result.add_error("server.command", "command cannot be empty");
        }

        if self.server.timeout == 0 {
            result.add_error("server.timeout", "timeout must be greater than 0");
        }

        if let Some(ref cwd) = self.server.cwd {
            if !cwd.is_dir() {
                result.add_warning(
                    "server.cwd",
                    format!("working directory '{}' does not exist", cwd.display()),
                );
            }
        }

        if self.retry_attempts == 0 {
            result.add_warning(
                "retry_attempts",
                "retry_attempts is 0, requests will be attempted once",
            );
        }

        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            result.add_error("retry_delay", "retry_delay must be a non-negative number");
        } else if self.retry_delay > MAX_RETRY_DELAY_SECS {
            result.add_error(
                "retry_delay",
                format!("retry_delay must be at most {} seconds", MAX_RETRY_DELAY_SECS),
            );
        }

        if self.enable_caching {
            if self.cache_ttl == 0 {
                result.add_warning("cache_ttl", "cache_ttl is 0, cached results expire immediately");
            }
            if self.max_cache_size == 0 {
                result.add_error(
                    "max_cache_size",
                    "max_cache_size must be greater than 0 when caching is enabled",
                );
            }
        }

        result
    }

    /// `<platform config dir>/petstore`
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("petstore"))
            .unwrap_or_else(|| PathBuf::from("~/.config/petstore"))
    }
}

fn insert_dotted(root: &mut serde_json::Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        Some((head, rest)) => {
            let child = root
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !child.is_object() {
                *child = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(map) = child {
                insert_dotted(map, rest, value);
            }
        }
        None => {
            root.insert(key.to_string(), value);
        }
    }
}

/// Outcome of [`ClientConfig::validate`].
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no issue is an error; warnings are allowed.
    pub fn is_ok(&self) -> bool {
        self.errors().is_empty()
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.with_severity(IssueSeverity::Error)
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.with_severity(IssueSeverity::Warning)
    }

    fn with_severity(&self, severity: IssueSeverity) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == severity).collect()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(IssueSeverity::Error, field.into(), message.into());
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(IssueSeverity::Warning, field.into(), message.into());
    }

    fn push(&mut self, severity: IssueSeverity, field: String, message: String) {
        self.issues.push(ValidationIssue {
            severity,
            field,
            message,
        });
    }
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Dotted path, e.g. `server.timeout`
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Reported, but loading continues
    Warning,
    /// Loading fails
    Error,
}
