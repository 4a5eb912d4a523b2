use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;

/// One honeypot observation. Serialized as the `event` object of a log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LogEntry {
    NoAuth {
        user: String,
        accepted: bool,
    },
    PasswordAuth {
        user: String,
        password: String,
        accepted: bool,
    },
    PublicKeyAuth {
        user: String,
        public_key_fingerprint: String,
        accepted: bool,
    },
    KeyboardInteractiveAuth {
        user: String,
        answers: Vec<String>,
        accepted: bool,
    },
    Connection {
        client_version: String,
    },
    ConnectionClose {},
    TcpipForward {
        address: String,
    },
    CancelTcpipForward {
        address: String,
    },
    Session {
        channel_id: usize,
    },
    SessionClose {
        channel_id: usize,
    },
    SessionInput {
        channel_id: usize,
        input: String,
    },
    DirectTcpip {
        channel_id: usize,
        from: String,
        to: String,
    },
    Pty {
        channel_id: usize,
        terminal: String,
        width: u32,
        height: u32,
    },
    Shell {
        channel_id: usize,
    },
    Exec {
        channel_id: usize,
        command: String,
    },
    Subsystem {
        channel_id: usize,
        subsystem: String,
    },
    X11 {
        channel_id: usize,
        /// Unset when the request payload could not be read.
        #[serde(skip_serializing_if = "Option::is_none")]
        screen: Option<u32>,
    },
    Env {
        channel_id: usize,
        name: String,
        value: String,
    },
    WindowChange {
        channel_id: usize,
        width: u32,
        height: u32,
    },
    DebugChannel {
        channel_id: usize,
        channel_type: String,
    },
    DebugChannelRequest {
        channel_id: usize,
        request_type: String,
        want_reply: bool,
        payload: String,
    },
}

impl LogEntry {
    pub fn event_type(&self) -> &'static str {
        match self {
            LogEntry::NoAuth { .. } => "no_auth",
            LogEntry::PasswordAuth { .. } => "password_auth",
            LogEntry::PublicKeyAuth { .. } => "public_key_auth",
            LogEntry::KeyboardInteractiveAuth { .. } => "keyboard_interactive_auth",
            LogEntry::Connection { .. } => "connection",
            LogEntry::ConnectionClose {} => "connection_close",
            LogEntry::TcpipForward { .. } => "tcpip_forward",
            LogEntry::CancelTcpipForward { .. } => "cancel_tcpip_forward",
            LogEntry::Session { .. } => "session",
            LogEntry::SessionClose { .. } => "session_close",
            LogEntry::SessionInput { .. } => "session_input",
            LogEntry::DirectTcpip { .. } => "direct_tcpip",
            LogEntry::Pty { .. } => "pty",
            LogEntry::Shell { .. } => "shell",
            LogEntry::Exec { .. } => "exec",
            LogEntry::Subsystem { .. } => "subsystem",
            LogEntry::X11 { .. } => "x11",
            LogEntry::Env { .. } => "env",
            LogEntry::WindowChange { .. } => "window_change",
            LogEntry::DebugChannel { .. } => "debug_channel",
            LogEntry::DebugChannelRequest { .. } => "debug_channel_request",
        }
    }

    /// Debug entries are only emitted when `logging.debug` is enabled.
    pub fn is_debug(&self) -> bool {
        self.event_type().starts_with("debug_")
    }
}

fn verdict(accepted: bool) -> &'static str {
    if accepted {
        "accepted"
    } else {
        "rejected"
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::NoAuth { user, accepted } => {
                write!(f, "authentication for user {:?} without credentials {}", user, verdict(*accepted))
            }
            LogEntry::PasswordAuth {
                user,
                password,
                accepted,
            } => write!(
                f,
                "authentication for user {:?} with password {:?} {}",
                user,
                password,
                verdict(*accepted)
            ),
            LogEntry::PublicKeyAuth {
                user,
                public_key_fingerprint,
                accepted,
            } => write!(
                f,
                "authentication for user {:?} with public key {:?} {}",
                user,
                public_key_fingerprint,
                verdict(*accepted)
            ),
            LogEntry::KeyboardInteractiveAuth {
                user,
                answers,
                accepted,
            } => write!(
                f,
                "authentication for user {:?} with keyboard-interactive answers {:?} {}",
                user,
                answers,
                verdict(*accepted)
            ),
            LogEntry::Connection { client_version } => {
                write!(f, "connection with client version {:?} established", client_version)
            }
            LogEntry::ConnectionClose {} => write!(f, "connection closed"),
            LogEntry::TcpipForward { address } => {
                write!(f, "TCP/IP forwarding on {} requested", address)
            }
            LogEntry::CancelTcpipForward { address } => {
                write!(f, "TCP/IP forwarding on {} canceled", address)
            }
            LogEntry::Session { channel_id } => write!(f, "[channel {}] session requested", channel_id),
            LogEntry::SessionClose { channel_id } => write!(f, "[channel {}] closed", channel_id),
            LogEntry::SessionInput { channel_id, input } => {
                write!(f, "[channel {}] input: {:?}", channel_id, input)
            }
            LogEntry::DirectTcpip {
                channel_id,
                from,
                to,
            } => write!(
                f,
                "[channel {}] direct TCP/IP forwarding from {} to {} requested",
                channel_id, from, to
            ),
            LogEntry::Pty {
                channel_id,
                terminal,
                width,
                height,
            } => write!(
                f,
                "[channel {}] PTY using terminal {:?} (size {}x{}) requested",
                channel_id, terminal, width, height
            ),
            LogEntry::Shell { channel_id } => write!(f, "[channel {}] shell requested", channel_id),
            LogEntry::Exec {
                channel_id,
                command,
            } => write!(f, "[channel {}] command {:?} requested", channel_id, command),
            LogEntry::Subsystem {
                channel_id,
                subsystem,
            } => write!(f, "[channel {}] subsystem {:?} requested", channel_id, subsystem),
            LogEntry::X11 {
                channel_id,
                screen: Some(screen),
            } => write!(
                f,
                "[channel {}] X11 forwarding on screen {} requested",
                channel_id, screen
            ),
            LogEntry::X11 {
                channel_id,
                screen: None,
            } => write!(f, "[channel {}] X11 forwarding requested", channel_id),
            LogEntry::Env {
                channel_id,
                name,
                value,
            } => write!(
                f,
                "[channel {}] environment variable {:?} with value {:?} requested",
                channel_id, name, value
            ),
            LogEntry::WindowChange {
                channel_id,
                width,
                height,
            } => write!(
                f,
                "[channel {}] window size change to {}x{} requested",
                channel_id, width, height
            ),
            LogEntry::DebugChannel {
                channel_id,
                channel_type,
            } => write!(
                f,
                "DEBUG [channel {}] new channel of type {:?} requested",
                channel_id, channel_type
            ),
            LogEntry::DebugChannelRequest {
                channel_id,
                request_type,
                want_reply,
                payload,
            } => write!(
                f,
                "DEBUG [channel {}] channel request {:?} received (want_reply={}, payload={:?})",
                channel_id, request_type, want_reply, payload
            ),
        }
    }
}

/// A log entry stamped with where and when it was observed.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub source: SocketAddr,
    pub conn_id: String,
    pub entry: LogEntry,
}

impl EventRecord {
    pub fn new(source: SocketAddr, conn_id: &str, entry: LogEntry) -> Self {
        Self {
            timestamp: Utc::now(),
            source,
            conn_id: conn_id.to_string(),
            entry,
        }
    }
}
