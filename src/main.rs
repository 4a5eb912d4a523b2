use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{error, info};

use sshtrap::cli::{Cli, Command, DEFAULT_CONFIG_PATH};
use sshtrap::config;
use sshtrap::config::types::AppConfig;

/// File at the given path, or the defaults when the default path is simply absent.
fn resolve_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        let cfg = AppConfig::default();
        config::validate_config(&cfg)?;
        return Ok(cfg);
    }
    config::load_config(path)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::CheckConfig) => {
            let cfg = resolve_config(&cli.config)?;
            println!("Configuration is valid.");
            println!("  SSH listen: {}", cfg.server.ssh_listen);
            println!("  Server id:  {}", cfg.server.server_id);
            println!(
                "  Auth:       none={} password={} publickey={}",
                cfg.auth.no_auth, cfg.auth.password_auth.accepted, cfg.auth.public_key_auth.accepted
            );
            if cfg.metrics.enabled {
                println!("  Metrics:    {}", cfg.metrics.listen);
            }
            return Ok(());
        }
        Some(Command::ShowConfig { format }) => {
            let cfg = resolve_config(&cli.config)?;
            let rendered = match format.as_str() {
                "json" => serde_json::to_string_pretty(&cfg)?,
                "toml" => toml::to_string_pretty(&cfg)?,
                other => anyhow::bail!("unknown format '{}': expected toml or json", other),
            };
            println!("{}", rendered);
            return Ok(());
        }
        Some(Command::HealthCheck { addr, timeout }) => {
            let addr: std::net::SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid address: {}", addr))?;
            let timeout = std::time::Duration::from_secs(*timeout);
            match std::net::TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => {
                    println!("OK: {} is reachable", addr);
                    return Ok(());
                }
                Err(e) => {
                    eprintln!("FAIL: {} is not reachable: {}", addr, e);
                    std::process::exit(1);
                }
            }
        }
        None => {}
    }

    let app_config = resolve_config(&cli.config)?;

    // CLI override > config
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| app_config.logging.level.to_string());
    sshtrap::logging::setup_logging(&log_level, app_config.logging.format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        ssh_listen = %app_config.server.ssh_listen,
        "Starting sshtrap"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if let Err(e) = sshtrap::server::run(app_config).await {
            error!(error = %e, "Server error");
            std::process::exit(1);
        }
    });

    Ok(())
}
