// Tests for src/audit/
//
// Tests cover:
// - JSON and text rendering of event records
// - Debug event suppression
// - Overflow accounting when the queue is full
// - The writer task appending to a file

use chrono::{TimeZone, Utc};
use sshtrap::audit::events::{EventRecord, LogEntry};
use sshtrap::audit::{render, EventFormat, EventLogger};
use std::net::SocketAddr;
use std::time::Duration;

fn peer() -> SocketAddr {
    "198.51.100.7:41234".parse().unwrap()
}

fn record(entry: LogEntry) -> EventRecord {
    EventRecord {
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
        source: peer(),
        conn_id: "deadbeef".to_string(),
        entry,
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[test]
fn json_record_shape() {
    let rec = record(LogEntry::PasswordAuth {
        user: "admin".into(),
        password: "hunter2".into(),
        accepted: true,
    });
    let format = EventFormat {
        json: true,
        timestamps: true,
        split_host_port: false,
    };
    let line = render(&rec, format).unwrap();
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "time": "2024-03-01T12:30:00Z",
            "source": "198.51.100.7:41234",
            "conn_id": "deadbeef",
            "event_type": "password_auth",
            "event": {"user": "admin", "password": "hunter2", "accepted": true},
        })
    );
}

#[test]
fn json_split_source_without_time() {
    let rec = record(LogEntry::ConnectionClose {});
    let format = EventFormat {
        json: true,
        timestamps: false,
        split_host_port: true,
    };
    let value: serde_json::Value = serde_json::from_str(&render(&rec, format).unwrap()).unwrap();
    assert!(value.get("time").is_none());
    assert_eq!(
        value["source"],
        serde_json::json!({"host": "198.51.100.7", "port": 41234})
    );
    assert_eq!(value["event"], serde_json::json!({}));
}

#[test]
fn text_rendering() {
    let rec = record(LogEntry::Exec {
        channel_id: 0,
        command: "cat /proc/cpuinfo".into(),
    });
    let with_time = EventFormat {
        json: false,
        timestamps: true,
        split_host_port: false,
    };
    assert_eq!(
        render(&rec, with_time).unwrap(),
        "2024-03-01T12:30:00Z [198.51.100.7:41234] [channel 0] command \"cat /proc/cpuinfo\" requested"
    );
    assert_eq!(
        render(&rec, EventFormat::default()).unwrap(),
        "[198.51.100.7:41234] [channel 0] command \"cat /proc/cpuinfo\" requested"
    );
}

#[test]
fn event_types_are_snake_case() {
    let entries = [
        LogEntry::NoAuth {
            user: "u".into(),
            accepted: false,
        },
        LogEntry::TcpipForward {
            address: "0.0.0.0:80".into(),
        },
        LogEntry::WindowChange {
            channel_id: 1,
            width: 1,
            height: 1,
        },
        LogEntry::DebugChannelRequest {
            channel_id: 1,
            request_type: "exec".into(),
            want_reply: true,
            payload: String::new(),
        },
    ];
    let types: Vec<_> = entries.iter().map(LogEntry::event_type).collect();
    assert_eq!(
        types,
        vec!["no_auth", "tcpip_forward", "window_change", "debug_channel_request"]
    );
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn debug_events_need_debug_flag() {
    let debug_entry = LogEntry::DebugChannel {
        channel_id: 0,
        channel_type: "session".into(),
    };

    let (quiet, mut quiet_rx) = EventLogger::channel(false, 8);
    quiet.log_event(peer(), "c1", debug_entry.clone());
    quiet.log_event(peer(), "c1", LogEntry::Shell { channel_id: 0 });
    assert_eq!(
        quiet_rx.try_recv().unwrap().entry,
        LogEntry::Shell { channel_id: 0 }
    );
    assert!(quiet_rx.try_recv().is_err());

    let (verbose, mut verbose_rx) = EventLogger::channel(true, 8);
    verbose.log_event(peer(), "c1", debug_entry.clone());
    let rec = verbose_rx.try_recv().unwrap();
    assert_eq!(rec.entry, debug_entry);
    assert_eq!(rec.conn_id, "c1");
    assert_eq!(rec.source, peer());
}

#[tokio::test]
async fn full_queue_drops_and_counts() {
    let (logger, _rx) = EventLogger::channel(false, 2);
    let counter = prometheus_client::metrics::counter::Counter::default();
    logger.set_dropped_metric(counter.clone());

    for _ in 0..5 {
        logger.log_event(peer(), "c1", LogEntry::ConnectionClose {});
    }
    assert_eq!(logger.dropped_count(), 3);
    assert_eq!(counter.get(), 3);
}

#[test]
fn noop_logger_never_panics() {
    let logger = EventLogger::new_noop();
    for _ in 0..10 {
        logger.log_event(peer(), "c1", LogEntry::ConnectionClose {});
    }
}

#[tokio::test]
async fn writer_task_appends_lines_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("events.log");
    let format = EventFormat {
        json: true,
        timestamps: false,
        split_host_port: false,
    };
    let logger = EventLogger::new(Some(path.clone()), format, false);
    logger.log_event(
        peer(),
        "abc",
        LogEntry::Connection {
            client_version: "SSH-2.0-OpenSSH_9.6".into(),
        },
    );
    logger.log_event(
        peer(),
        "abc",
        LogEntry::SessionInput {
            channel_id: 0,
            input: "whoami".into(),
        },
    );

    let mut contents = String::new();
    for _ in 0..100 {
        contents = std::fs::read_to_string(&path).unwrap_or_default();
        if contents.lines().count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"event_type\":\"connection\""));
    assert!(lines[0].contains("\"client_version\":\"SSH-2.0-OpenSSH_9.6\""));
    assert!(lines[1].contains("\"input\":\"whoami\""));
}
