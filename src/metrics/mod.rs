pub mod collectors;

use collectors::{AuthAttemptLabel, RequestTypeLabel};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Session channel request types with their own label value; the rest count as `unknown`.
pub const KNOWN_REQUEST_TYPES: &[&str] = &[
    "pty-req",
    "shell",
    "exec",
    "env",
    "subsystem",
    "window-change",
    "x11-req",
    "signal",
];

/// Centralized metrics registry. Purely observational.
pub struct MetricsRegistry {
    pub registry: Registry,
    pub connections_total: Counter,
    pub connections_active: Gauge,
    pub auth_attempts_total: Family<AuthAttemptLabel, Counter>,
    pub session_channels_total: Counter,
    pub active_session_channels: Gauge,
    pub session_channel_requests_total: Family<RequestTypeLabel, Counter>,
    pub events_dropped: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let connections_total = Counter::default();
        registry.register(
            "sshtrap_connections",
            "Total SSH connections accepted",
            connections_total.clone(),
        );

        let connections_active = Gauge::default();
        registry.register(
            "sshtrap_active_connections",
            "Currently open SSH connections",
            connections_active.clone(),
        );

        let auth_attempts_total = Family::<AuthAttemptLabel, Counter>::default();
        registry.register(
            "sshtrap_auth_attempts",
            "Authentication attempts by method and outcome",
            auth_attempts_total.clone(),
        );

        let session_channels_total = Counter::default();
        registry.register(
            "sshtrap_session_channels",
            "Total number of session channels opened",
            session_channels_total.clone(),
        );

        let active_session_channels = Gauge::default();
        registry.register(
            "sshtrap_active_session_channels",
            "Number of currently active session channels",
            active_session_channels.clone(),
        );

        let session_channel_requests_total = Family::<RequestTypeLabel, Counter>::default();
        registry.register(
            "sshtrap_session_channel_requests",
            "Total number of requests received on session channels",
            session_channel_requests_total.clone(),
        );

        let events_dropped = Counter::default();
        registry.register(
            "sshtrap_events_dropped",
            "Events dropped because the event log queue was full",
            events_dropped.clone(),
        );

        Self {
            registry,
            connections_total,
            connections_active,
            auth_attempts_total,
            session_channels_total,
            active_session_channels,
            session_channel_requests_total,
            events_dropped,
        }
    }

    pub fn record_connection_opened(&self) {
        self.connections_total.inc();
        self.connections_active.inc();
    }

    pub fn record_connection_closed(&self) {
        self.connections_active.dec();
    }

    pub fn record_auth_attempt(&self, method: &str, accepted: bool) {
        self.auth_attempts_total
            .get_or_create(&AuthAttemptLabel {
                method: method.to_string(),
                accepted: accepted.to_string(),
            })
            .inc();
    }

    pub fn record_session_channel_opened(&self) {
        self.session_channels_total.inc();
        self.active_session_channels.inc();
    }

    pub fn record_session_channel_closed(&self) {
        self.active_session_channels.dec();
    }

    /// Unrecognised request types share the `unknown` label to bound cardinality.
    pub fn record_channel_request(&self, request_type: &str) {
        let label = if KNOWN_REQUEST_TYPES.contains(&request_type) {
            request_type
        } else {
            "unknown"
        };
        self.session_channel_requests_total
            .get_or_create(&RequestTypeLabel {
                r#type: label.to_string(),
            })
            .inc();
    }

    pub fn channel_requests(&self, request_type: &str) -> u64 {
        self.session_channel_requests_total
            .get_or_create(&RequestTypeLabel {
                r#type: request_type.to_string(),
            })
            .get()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
