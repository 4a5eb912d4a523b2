pub mod events;

use crate::config::types::{LogFormat, LoggingConfig};
use chrono::SecondsFormat;
use events::{EventRecord, LogEntry};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

const EVENT_CHANNEL_CAPACITY: usize = 10_000;

/// How event lines are rendered by the writer task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFormat {
    pub json: bool,
    pub timestamps: bool,
    pub split_host_port: bool,
}

impl EventFormat {
    pub fn from_config(logging: &LoggingConfig) -> Self {
        Self {
            json: logging.format == LogFormat::Json,
            timestamps: logging.timestamps,
            split_host_port: logging.split_host_port,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Source {
    Joined(String),
    Split { host: String, port: u16 },
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    source: Source,
    conn_id: &'a str,
    event_type: &'static str,
    event: &'a LogEntry,
}

/// Render one record as a single log line (without the trailing newline).
pub fn render(record: &EventRecord, format: EventFormat) -> Result<String, serde_json::Error> {
    let time = format
        .timestamps
        .then(|| record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true));

    if format.json {
        let source = if format.split_host_port {
            Source::Split {
                host: record.source.ip().to_string(),
                port: record.source.port(),
            }
        } else {
            Source::Joined(record.source.to_string())
        };
        serde_json::to_string(&JsonRecord {
            time,
            source,
            conn_id: &record.conn_id,
            event_type: record.entry.event_type(),
            event: &record.entry,
        })
    } else {
        Ok(match time {
            Some(t) => format!("{} [{}] {}", t, record.source, record.entry),
            None => format!("[{}] {}", record.source, record.entry),
        })
    }
}

/// Asynchronous, lossy event sink. Enqueueing never blocks the caller.
pub struct EventLogger {
    sender: mpsc::Sender<EventRecord>,
    debug: bool,
    dropped_count: AtomicU64,
    dropped_metric: OnceLock<prometheus_client::metrics::counter::Counter>,
}

impl EventLogger {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn new(log_path: Option<PathBuf>, format: EventFormat, debug: bool) -> Self {
        let (logger, receiver) = Self::channel(debug, EVENT_CHANNEL_CAPACITY);
        tokio::spawn(event_writer_task(receiver, log_path, format));
        logger
    }

    pub fn from_config(logging: &LoggingConfig) -> Self {
        Self::new(
            logging.event_log_path.clone(),
            EventFormat::from_config(logging),
            logging.debug,
        )
    }

    /// Logger whose records are handed to the caller instead of a writer task.
    pub fn channel(debug: bool, capacity: usize) -> (Self, mpsc::Receiver<EventRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let logger = Self {
            sender,
            debug,
            dropped_count: AtomicU64::new(0),
            dropped_metric: OnceLock::new(),
        };
        (logger, receiver)
    }

    /// Create a no-op logger for testing (no tokio runtime required).
    pub fn new_noop() -> Self {
        let (logger, _receiver) = Self::channel(false, 1);
        logger
    }

    pub fn set_dropped_metric(&self, counter: prometheus_client::metrics::counter::Counter) {
        let _ = self.dropped_metric.set(counter);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn log_event(&self, source: SocketAddr, conn_id: &str, entry: LogEntry) {
        if entry.is_debug() && !self.debug {
            return;
        }
        let record = EventRecord::new(source, conn_id, entry);
        if self.sender.try_send(record).is_err() {
            let dropped = self.dropped_count.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(counter) = self.dropped_metric.get() {
                counter.inc();
            }
            if dropped % 100 == 1 {
                warn!(total_dropped = dropped, "Events being dropped due to channel overflow");
            }
        }
    }
}

async fn open_sink(log_path: Option<&PathBuf>) -> Box<dyn AsyncWrite + Send + Unpin> {
    if let Some(path) = log_path {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
        {
            Ok(f) => return Box::new(f),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to open event log, using stdout");
            }
        }
    }
    Box::new(tokio::io::stdout())
}

async fn event_writer_task(
    mut receiver: mpsc::Receiver<EventRecord>,
    log_path: Option<PathBuf>,
    format: EventFormat,
) {
    let mut sink = open_sink(log_path.as_ref()).await;

    while let Some(record) = receiver.recv().await {
        let line = match render(&record, format) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize event");
                continue;
            }
        };
        debug!(event_type = record.entry.event_type(), "Event");
        if let Err(e) = sink.write_all(format!("{}\n", line).as_bytes()).await {
            error!(error = %e, "Failed to write event log");
            continue;
        }
        if let Err(e) = sink.flush().await {
            error!(error = %e, "Failed to flush event log");
        }
    }
}
