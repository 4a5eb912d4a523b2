use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Config path used when none is given; a missing file there means built-in defaults.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Parser, Debug)]
#[command(
    name = "sshtrap",
    version,
    about = "SSH honeypot presenting a scripted virtual Linux host"
)]
pub struct Cli {
    /// Path to configuration file (also settable via SSHTRAP_CONFIG env var)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "SSHTRAP_CONFIG")]
    pub config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate configuration file
    CheckConfig,
    /// Show the effective configuration
    ShowConfig {
        /// Output format: toml or json
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Health check: verify the honeypot is reachable via TCP connect
    HealthCheck {
        /// Address to check (host:port)
        #[arg(long, default_value = "127.0.0.1:2022")]
        addr: String,
        /// Timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}
