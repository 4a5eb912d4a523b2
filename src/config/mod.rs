pub mod types;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use types::AppConfig;

/// Maximum config file size (1 MB)
const MAX_CONFIG_SIZE: u64 = 1_048_576;

/// Load and validate configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("reading config metadata: {}", path.display()))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        anyhow::bail!(
            "config file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        );
    }

    check_config_file_permissions(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    parse_config(&content)
}

/// On Unix, warn if the config file is writable by group or others,
/// since it controls which credentials the honeypot accepts.
#[cfg(unix)]
fn check_config_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode();
            if mode & 0o022 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = format!("{:04o}", mode & 0o7777),
                    "Config file is writable by group/others"
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not check config file permissions"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_config_file_permissions(_path: &Path) {}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content).context("parsing TOML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate an already-constructed AppConfig (e.g. the built-in defaults).
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_server(config)?;
    validate_shell(config)?;
    validate_metrics(config)?;
    Ok(())
}

fn validate_server(config: &AppConfig) -> Result<()> {
    config
        .server
        .ssh_listen
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid server.ssh_listen '{}'", config.server.ssh_listen))?;
    if !config.server.server_id.starts_with("SSH-2.0-") {
        anyhow::bail!(
            "server.server_id must start with 'SSH-2.0-' (got '{}')",
            config.server.server_id
        );
    }
    if config.server.max_channels_per_connection == 0 {
        anyhow::bail!("server.max_channels_per_connection must be at least 1");
    }
    Ok(())
}

fn validate_shell(config: &AppConfig) -> Result<()> {
    if let Some(ref hostname) = config.shell.hostname {
        if hostname.is_empty() || hostname.chars().any(char::is_whitespace) {
            anyhow::bail!("shell.hostname must be non-empty and contain no whitespace");
        }
    }
    Ok(())
}

fn validate_metrics(config: &AppConfig) -> Result<()> {
    if config.metrics.enabled {
        config
            .metrics
            .listen
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid metrics.listen '{}'", config.metrics.listen))?;
    }
    Ok(())
}
