use crate::api::{self, MetricsState};
use crate::audit::EventLogger;
use crate::config::types::AppConfig;
use crate::context::AppContext;
use crate::metrics::MetricsRegistry;
use crate::ssh::handler::SshHandler;
use crate::ssh::keys;

use anyhow::Result;
use russh::server::Server as _;
use russh::{MethodKind, MethodSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

/// How long shutdown waits for open connections to go away.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the honeypot until SIGINT/SIGTERM.
pub async fn run(config: AppConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(handle_signals(shutdown.clone()));
    run_until(config, shutdown).await
}

/// Run the honeypot until `shutdown` is cancelled.
pub async fn run_until(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    let config = Arc::new(config);

    let metrics = Arc::new(MetricsRegistry::new());
    let events = Arc::new(EventLogger::from_config(&config.logging));
    events.set_dropped_metric(metrics.events_dropped.clone());
    let app_ctx = Arc::new(AppContext::new(config.clone(), events, metrics.clone()));
    info!(hostname = %app_ctx.display_name, "Virtual host ready");

    let host_key = keys::load_or_generate_host_key(&config.server.host_key_path)?;
    let ssh_config = Arc::new(build_ssh_config(&config, host_key));

    let draining = Arc::new(AtomicBool::new(false));
    let services_shutdown = CancellationToken::new();

    let _metrics_handle = spawn_metrics_server(
        &config,
        MetricsState {
            metrics: metrics.clone(),
            draining: draining.clone(),
            start_time: app_ctx.start_time,
        },
        services_shutdown.clone(),
    );

    let listen = config.server.ssh_listen.clone();
    let span = tracing::info_span!("ssh_server", addr = %listen);
    let ssh_handle = tokio::spawn(
        async move {
            let mut server = SshServer::new(app_ctx);
            if let Err(e) = server.run_on_address(ssh_config, &listen as &str).await {
                error!(error = %e, "SSH server error");
            }
        }
        .instrument(span),
    );

    info!(addr = %config.server.ssh_listen, "SSH honeypot listening");

    shutdown.cancelled().await;
    info!("Initiating graceful shutdown");
    draining.store(true, Ordering::Relaxed);
    ssh_handle.abort();

    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    loop {
        let active = metrics.connections_active.get();
        if active <= 0 {
            info!("All connections drained");
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(active_connections = active, "Shutdown grace period over, exiting");
            break;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    services_shutdown.cancel();
    info!("Shutdown complete");
    Ok(())
}

/// russh server configuration from `[server]` and `[auth]`.
pub fn build_ssh_config(
    config: &AppConfig,
    host_key: russh::keys::PrivateKey,
) -> russh::server::Config {
    let mut ssh_config = russh::server::Config::default();
    ssh_config.keys.push(host_key);
    ssh_config.server_id = russh::SshId::Standard(config.server.server_id.clone());
    ssh_config.auth_rejection_time = Duration::from_secs(1);
    ssh_config.auth_rejection_time_initial = Some(Duration::from_secs(0));

    let mut methods = vec![MethodKind::None];
    if config.auth.password_auth.enabled {
        methods.push(MethodKind::Password);
    }
    if config.auth.public_key_auth.enabled {
        methods.push(MethodKind::PublicKey);
    }
    if config.auth.keyboard_interactive_auth.enabled {
        methods.push(MethodKind::KeyboardInteractive);
    }
    ssh_config.methods = MethodSet::from(methods.as_slice());

    // keepalive@openssh.com requests; unanswered ones eventually drop the client.
    if config.server.ssh_keepalive_interval_secs > 0 {
        ssh_config.keepalive_interval = Some(Duration::from_secs(
            config.server.ssh_keepalive_interval_secs,
        ));
        ssh_config.keepalive_max = config.server.ssh_keepalive_max as usize;
    }

    ssh_config
}

fn spawn_metrics_server(
    config: &AppConfig,
    state: MetricsState,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    if !config.metrics.enabled {
        return None;
    }
    let listen = config.metrics.listen.clone();
    Some(tokio::spawn(async move {
        if let Err(e) = api::start_metrics_server(&listen, state, shutdown).await {
            error!(error = %e, "Metrics server error");
        }
    }))
}

/// One `SshHandler` per accepted connection.
pub struct SshServer {
    ctx: Arc<AppContext>,
}

impl SshServer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

impl russh::server::Server for SshServer {
    type Handler = SshHandler;

    fn new_client(&mut self, peer_addr: Option<std::net::SocketAddr>) -> SshHandler {
        let peer = peer_addr.unwrap_or_else(|| {
            std::net::SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, 0))
        });
        SshHandler::new(self.ctx.clone(), peer)
    }

    fn handle_session_error(&mut self, error: <Self::Handler as russh::server::Handler>::Error) {
        warn!(error = %error, "SSH session ended with error");
    }
}

#[cfg(unix)]
async fn handle_signals(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
        _ = tokio::signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown"),
    }
    shutdown.cancel();
}

#[cfg(not(unix))]
async fn handle_signals(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received, initiating graceful shutdown");
        shutdown.cancel();
    }
}
