use crate::audit::events::LogEntry;
use crate::audit::EventLogger;
use crate::config::types::AppConfig;
use crate::metrics::MetricsRegistry;
use crate::utils::generate_display_hostname;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Shared application context, created once at start-up
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub events: Arc<EventLogger>,
    pub metrics: Arc<MetricsRegistry>,
    /// Hostname every virtual shell starts with. Fixed for the life of the process.
    pub display_name: Arc<str>,
    pub start_time: Instant,
}

impl AppContext {
    pub fn new(config: Arc<AppConfig>, events: Arc<EventLogger>, metrics: Arc<MetricsRegistry>) -> Self {
        let display_name: Arc<str> = match &config.shell.hostname {
            Some(name) => Arc::from(name.as_str()),
            None => Arc::from(generate_display_hostname()),
        };
        events.set_dropped_metric(metrics.events_dropped.clone());
        Self {
            config,
            events,
            metrics,
            display_name,
            start_time: Instant::now(),
        }
    }
}

/// Identity of one authenticated connection, shared by its channels.
pub struct ConnectionContext {
    pub app: Arc<AppContext>,
    pub peer: SocketAddr,
    pub conn_id: String,
    pub user: String,
}

impl ConnectionContext {
    pub fn log_event(&self, entry: LogEntry) {
        self.app.events.log_event(self.peer, &self.conn_id, entry);
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.app.metrics
    }
}
