use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Log level enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log format enum, shared by diagnostics and the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_ssh_listen")]
    pub ssh_listen: String,
    #[serde(default = "default_host_key_path")]
    pub host_key_path: PathBuf,
    /// Identification string sent to clients; pick one matching the emulated distro.
    #[serde(default = "default_server_id")]
    pub server_id: String,
    #[serde(default = "default_max_channels_per_connection")]
    pub max_channels_per_connection: usize,
    /// SSH keepalive interval in seconds (0 = disabled).
    #[serde(default = "default_ssh_keepalive_interval_secs")]
    pub ssh_keepalive_interval_secs: u64,
    /// Maximum number of unanswered SSH keepalives before disconnecting the client.
    #[serde(default = "default_ssh_keepalive_max")]
    pub ssh_keepalive_max: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ssh_listen: default_ssh_listen(),
            host_key_path: default_host_key_path(),
            server_id: default_server_id(),
            max_channels_per_connection: default_max_channels_per_connection(),
            ssh_keepalive_interval_secs: default_ssh_keepalive_interval_secs(),
            ssh_keepalive_max: default_ssh_keepalive_max(),
        }
    }
}

fn default_ssh_listen() -> String {
    "0.0.0.0:2022".to_string()
}

fn default_host_key_path() -> PathBuf {
    PathBuf::from("host_key")
}

fn default_server_id() -> String {
    "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6".to_string()
}

fn default_max_channels_per_connection() -> usize {
    10
}

fn default_ssh_keepalive_interval_secs() -> u64 {
    15
}

fn default_ssh_keepalive_max() -> u32 {
    3
}

/// Which authentication attempts succeed. Every attempt is logged regardless.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Attempts allowed per connection before the client is cut off (0 = unlimited).
    #[serde(default)]
    pub max_tries: u32,
    #[serde(default)]
    pub no_auth: bool,
    #[serde(default = "default_password_auth")]
    pub password_auth: AuthMethodConfig,
    #[serde(default = "default_public_key_auth")]
    pub public_key_auth: AuthMethodConfig,
    #[serde(default)]
    pub keyboard_interactive_auth: KeyboardInteractiveConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_tries: 0,
            no_auth: false,
            password_auth: default_password_auth(),
            public_key_auth: default_public_key_auth(),
            keyboard_interactive_auth: KeyboardInteractiveConfig::default(),
        }
    }
}

/// Keyboard-interactive (RFC 4256) prompts. Off unless enabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyboardInteractiveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub instruction: String,
    #[serde(default = "default_questions")]
    pub questions: Vec<KeyboardInteractiveQuestion>,
}

impl Default for KeyboardInteractiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            accepted: false,
            instruction: String::new(),
            questions: default_questions(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyboardInteractiveQuestion {
    pub text: String,
    /// Whether the client shows what is typed.
    #[serde(default)]
    pub echo: bool,
}

fn default_questions() -> Vec<KeyboardInteractiveQuestion> {
    vec![
        KeyboardInteractiveQuestion {
            text: "User: ".to_string(),
            echo: true,
        },
        KeyboardInteractiveQuestion {
            text: "Password: ".to_string(),
            echo: false,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthMethodConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub accepted: bool,
}

fn default_password_auth() -> AuthMethodConfig {
    AuthMethodConfig {
        enabled: true,
        accepted: true,
    }
}

fn default_public_key_auth() -> AuthMethodConfig {
    AuthMethodConfig {
        enabled: true,
        accepted: false,
    }
}

fn default_true() -> bool {
    true
}

/// Virtual shell configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShellConfig {
    /// Fixed display hostname. When unset a random `vm-NNNNNN` name is generated at start-up.
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Append events here instead of stdout.
    pub event_log_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Emit `debug_*` events (raw channel and request tracing).
    #[serde(default)]
    pub debug: bool,
    /// Render the event source as `{host, port}` instead of `host:port` in JSON mode.
    #[serde(default)]
    pub split_host_port: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            event_log_path: None,
            timestamps: true,
            debug: false,
            split_host_port: false,
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_metrics_listen() -> String {
    "127.0.0.1:9090".to_string()
}
