//! Typed session channel request payloads (RFC 4254 §6).

use crate::audit::events::LogEntry;
use crate::ssh::wire::{WireError, WireReader, WireWriter};

pub const PTY_REQ: &str = "pty-req";
pub const SHELL: &str = "shell";
pub const EXEC: &str = "exec";
pub const ENV: &str = "env";
pub const SUBSYSTEM: &str = "subsystem";
pub const WINDOW_CHANGE: &str = "window-change";
pub const X11_REQ: &str = "x11-req";
pub const SIGNAL: &str = "signal";
pub const AUTH_AGENT_REQ: &str = "auth-agent-req@openssh.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequestPayload {
    Pty {
        term: String,
        width: u32,
        height: u32,
        pixel_width: u32,
        pixel_height: u32,
        /// Encoded terminal modes, kept opaque.
        modes: Vec<u8>,
    },
    Shell,
    X11 {
        single_connection: bool,
        auth_protocol: String,
        auth_cookie: String,
        screen: u32,
    },
    Env {
        name: String,
        value: String,
    },
    Exec {
        command: String,
    },
    Subsystem {
        name: String,
    },
    WindowChange {
        width: u32,
        height: u32,
        pixel_width: u32,
        pixel_height: u32,
    },
}

impl CommandRequestPayload {
    /// Request type this payload belongs to.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandRequestPayload::Pty { .. } => PTY_REQ,
            CommandRequestPayload::Shell => SHELL,
            CommandRequestPayload::X11 { .. } => X11_REQ,
            CommandRequestPayload::Env { .. } => ENV,
            CommandRequestPayload::Exec { .. } => EXEC,
            CommandRequestPayload::Subsystem { .. } => SUBSYSTEM,
            CommandRequestPayload::WindowChange { .. } => WINDOW_CHANGE,
        }
    }

    /// Decode the payload of a `kind` request. The whole payload must be consumed.
    pub fn decode(kind: &str, payload: &[u8]) -> Result<Option<Self>, WireError> {
        let mut r = WireReader::new(payload);
        let decoded = match kind {
            PTY_REQ => CommandRequestPayload::Pty {
                term: r.read_string()?,
                width: r.read_u32()?,
                height: r.read_u32()?,
                pixel_width: r.read_u32()?,
                pixel_height: r.read_u32()?,
                modes: r.read_bytes()?.to_vec(),
            },
            SHELL => CommandRequestPayload::Shell,
            X11_REQ => CommandRequestPayload::X11 {
                single_connection: r.read_bool()?,
                auth_protocol: r.read_string()?,
                auth_cookie: r.read_string()?,
                screen: r.read_u32()?,
            },
            ENV => CommandRequestPayload::Env {
                name: r.read_string()?,
                value: r.read_string()?,
            },
            EXEC => CommandRequestPayload::Exec {
                command: r.read_string()?,
            },
            SUBSYSTEM => CommandRequestPayload::Subsystem {
                name: r.read_string()?,
            },
            WINDOW_CHANGE => CommandRequestPayload::WindowChange {
                width: r.read_u32()?,
                height: r.read_u32()?,
                pixel_width: r.read_u32()?,
                pixel_height: r.read_u32()?,
            },
            _ => return Ok(None),
        };
        r.finish()?;
        Ok(Some(decoded))
    }

    pub fn encode(&self) -> Vec<u8> {
        let w = WireWriter::new();
        match self {
            CommandRequestPayload::Pty {
                term,
                width,
                height,
                pixel_width,
                pixel_height,
                modes,
            } => w
                .string(term)
                .u32(*width)
                .u32(*height)
                .u32(*pixel_width)
                .u32(*pixel_height)
                .bytes(modes),
            CommandRequestPayload::Shell => w,
            CommandRequestPayload::X11 {
                single_connection,
                auth_protocol,
                auth_cookie,
                screen,
            } => w
                .bool(*single_connection)
                .string(auth_protocol)
                .string(auth_cookie)
                .u32(*screen),
            CommandRequestPayload::Env { name, value } => w.string(name).string(value),
            CommandRequestPayload::Exec { command } => w.string(command),
            CommandRequestPayload::Subsystem { name } => w.string(name),
            CommandRequestPayload::WindowChange {
                width,
                height,
                pixel_width,
                pixel_height,
            } => w
                .u32(*width)
                .u32(*height)
                .u32(*pixel_width)
                .u32(*pixel_height),
        }
        .finish()
    }

    pub fn log_entry(&self, channel_id: usize) -> LogEntry {
        match self {
            CommandRequestPayload::Pty {
                term,
                width,
                height,
                ..
            } => LogEntry::Pty {
                channel_id,
                terminal: term.clone(),
                width: *width,
                height: *height,
            },
            CommandRequestPayload::Shell => LogEntry::Shell { channel_id },
            CommandRequestPayload::X11 { screen, .. } => LogEntry::X11 {
                channel_id,
                screen: Some(*screen),
            },
            CommandRequestPayload::Env { name, value } => LogEntry::Env {
                channel_id,
                name: name.clone(),
                value: value.clone(),
            },
            CommandRequestPayload::Exec { command } => LogEntry::Exec {
                channel_id,
                command: command.clone(),
            },
            CommandRequestPayload::Subsystem { name } => LogEntry::Subsystem {
                channel_id,
                subsystem: name.clone(),
            },
            CommandRequestPayload::WindowChange { width, height, .. } => LogEntry::WindowChange {
                channel_id,
                width: *width,
                height: *height,
            },
        }
    }
}

/// Terminal modes as sent on the wire: opcode/value pairs ending with TTY_OP_END.
pub fn encode_terminal_modes(modes: &[(u8, u32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(modes.len() * 5 + 1);
    for (opcode, value) in modes {
        out.push(*opcode);
        out.extend_from_slice(&value.to_be_bytes());
    }
    out.push(0);
    out
}

/// `signal` payload: the signal name without the `SIG` prefix.
pub fn encode_signal(name: &str) -> Vec<u8> {
    WireWriter::new().string(name).finish()
}
