//! Session channel request handling (RFC 4254 §6) and the per-channel event loop.

use crate::audit::events::LogEntry;
use crate::context::ConnectionContext;
use crate::shell::commands::Outcome;
use crate::shell::executor::{self, Program};
use crate::shell::input::INPUT_LOG_CAPACITY;
use crate::shell::{tokenize, DEFAULT_SHELL};
use crate::ssh::payload::{
    CommandRequestPayload, ENV, EXEC, PTY_REQ, SHELL, SIGNAL, SUBSYSTEM, WINDOW_CHANGE, X11_REQ,
};
use crate::ssh::transport::ChannelTransport;
use crate::ssh::wire::WireError;
use crate::utils::escape_bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info_span, warn};

/// A channel request as received from the client.
#[derive(Debug)]
pub struct ChannelRequest {
    pub kind: String,
    pub want_reply: bool,
    pub payload: Vec<u8>,
    reply: Option<oneshot::Sender<bool>>,
}

impl ChannelRequest {
    pub fn new(kind: impl Into<String>, want_reply: bool, payload: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            want_reply,
            payload,
            reply: None,
        }
    }

    pub fn from_payload(payload: &CommandRequestPayload, want_reply: bool) -> Self {
        Self::new(payload.kind(), want_reply, payload.encode())
    }

    /// Route the answer to this request through the returned receiver. The
    /// sender is dropped unanswered when the request wants no reply.
    pub fn reply_channel(&mut self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.reply = Some(tx);
        rx
    }

    /// Answer at most once; later calls and requests without a reply slot are no-ops.
    fn answer(&mut self, ok: bool) {
        let Some(tx) = self.reply.take() else {
            return;
        };
        if self.want_reply {
            let _ = tx.send(ok);
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("a pty was already requested")]
    PtyAlreadyRequested,
    #[error("pty must precede shell/exec")]
    PtyAfterActivation,
    #[error("session already active")]
    AlreadyActive,
    #[error("environment must be set before shell/exec")]
    EnvAfterActivation,
    #[error("unexpected request payload")]
    UnexpectedPayload,
    #[error("window change is only valid for pty sessions")]
    WindowChangeWithoutPty,
    #[error("malformed payload: {0}")]
    Malformed(#[from] WireError),
    #[error("unsupported request type: {0}")]
    Unsupported(String),
}

/// State of one session channel: `pty` and `active` only ever go from false to true.
pub struct ChannelSession {
    channel_id: usize,
    conn: Arc<ConnectionContext>,
    transport: Arc<dyn ChannelTransport>,
    /// Client data, handed to the program on activation.
    input: Option<mpsc::Receiver<Vec<u8>>>,
    input_log: Option<mpsc::Sender<String>>,
    pty: bool,
    active: bool,
}

impl ChannelSession {
    pub fn new(
        channel_id: usize,
        conn: Arc<ConnectionContext>,
        transport: Arc<dyn ChannelTransport>,
        input: mpsc::Receiver<Vec<u8>>,
        input_log: mpsc::Sender<String>,
    ) -> Self {
        Self {
            channel_id,
            conn,
            transport,
            input: Some(input),
            input_log: Some(input_log),
            pty: false,
            active: false,
        }
    }

    pub fn channel_id(&self) -> usize {
        self.channel_id
    }

    pub fn is_pty(&self) -> bool {
        self.pty
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Validate one request against the channel state, log it, and answer it.
    /// The answer is sent before any program starts. Errors are scoped to this
    /// request; the channel stays usable.
    pub async fn handle_request(&mut self, mut req: ChannelRequest) -> Result<(), RequestError> {
        let req = &mut req;
        self.conn.metrics().record_channel_request(&req.kind);

        match req.kind.as_str() {
            PTY_REQ => {
                if self.active {
                    req.answer(false);
                    return Err(RequestError::PtyAfterActivation);
                }
                if self.pty {
                    req.answer(false);
                    return Err(RequestError::PtyAlreadyRequested);
                }
                let payload = decode(req)?;
                self.conn.log_event(payload.log_entry(self.channel_id));
                req.answer(true);
                self.pty = true;
                Ok(())
            }
            SHELL => {
                if self.active {
                    req.answer(false);
                    return Err(RequestError::AlreadyActive);
                }
                if !req.payload.is_empty() {
                    req.answer(false);
                    return Err(RequestError::UnexpectedPayload);
                }
                self.conn.log_event(LogEntry::Shell {
                    channel_id: self.channel_id,
                });
                req.answer(true);
                self.start(vec![DEFAULT_SHELL.to_string()]);
                Ok(())
            }
            EXEC => {
                if self.active {
                    req.answer(false);
                    return Err(RequestError::AlreadyActive);
                }
                let payload = decode(req)?;
                self.conn.log_event(payload.log_entry(self.channel_id));
                req.answer(true);
                let args = match &payload {
                    CommandRequestPayload::Exec { command } => tokenize(command),
                    _ => Vec::new(),
                };
                if args.is_empty() {
                    self.finish_empty().await;
                } else {
                    self.start(args);
                }
                Ok(())
            }
            ENV => {
                if self.active {
                    req.answer(false);
                    return Err(RequestError::EnvAfterActivation);
                }
                let payload = decode(req)?;
                self.conn.log_event(payload.log_entry(self.channel_id));
                // Recorded only; commands never see the client environment.
                req.answer(true);
                Ok(())
            }
            SUBSYSTEM => {
                if self.active {
                    req.answer(false);
                    return Err(RequestError::AlreadyActive);
                }
                let payload = decode(req)?;
                self.conn.log_event(payload.log_entry(self.channel_id));
                if let CommandRequestPayload::Subsystem { name } = &payload {
                    warn!(channel = self.channel_id, subsystem = %name, "Unsupported subsystem requested");
                }
                req.answer(false);
                Ok(())
            }
            WINDOW_CHANGE => {
                // Never answered, whatever the outcome.
                if !self.pty {
                    return Err(RequestError::WindowChangeWithoutPty);
                }
                let payload = CommandRequestPayload::decode(&req.kind, &req.payload)?;
                if let Some(payload) = payload {
                    self.conn.log_event(payload.log_entry(self.channel_id));
                }
                Ok(())
            }
            X11_REQ => {
                // Logged even when the payload cannot be read.
                let decoded = decode(req);
                let entry = match &decoded {
                    Ok(payload) => payload.log_entry(self.channel_id),
                    Err(_) => LogEntry::X11 {
                        channel_id: self.channel_id,
                        screen: None,
                    },
                };
                self.conn.log_event(entry);
                warn!(channel = self.channel_id, "X11 forwarding requested, refusing");
                req.answer(false);
                decoded.map(|_| ())
            }
            SIGNAL => {
                warn!(
                    channel = self.channel_id,
                    payload = %escape_bytes(&req.payload),
                    "Signal requested, ignoring"
                );
                Ok(())
            }
            _ => {
                req.answer(false);
                Err(RequestError::Unsupported(req.kind.clone()))
            }
        }
    }

    /// Hand `args` to a program task and mark the channel active.
    fn start(&mut self, args: Vec<String>) {
        let (Some(input), Some(input_log)) = (self.input.take(), self.input_log.take()) else {
            warn!(channel = self.channel_id, "Channel input already consumed");
            return;
        };
        let span = info_span!("program", channel = self.channel_id, program = %args[0]);
        let program = Program {
            args,
            pty: self.pty,
            user: self.conn.user.clone(),
            display_name: self.conn.app.display_name.clone(),
            transport: self.transport.clone(),
            input,
            input_log,
        };
        span.in_scope(|| program.spawn());
        self.active = true;
    }

    /// `exec` with nothing to run: exit 0 and close without starting a program.
    async fn finish_empty(&mut self) {
        self.input.take();
        self.input_log.take();
        self.active = true;
        executor::finish(self.transport.as_ref(), self.pty, Outcome::status(0)).await;
    }

    /// Nothing will ever be written to the input log once requests stop on an idle channel.
    fn release_input_log(&mut self) {
        if !self.active {
            self.input_log.take();
            self.input.take();
        }
    }
}

/// Decode the payload, refusing the request when it cannot be read.
fn decode(req: &mut ChannelRequest) -> Result<CommandRequestPayload, RequestError> {
    match CommandRequestPayload::decode(&req.kind, &req.payload) {
        Ok(Some(payload)) => Ok(payload),
        Ok(None) => {
            req.answer(false);
            Err(RequestError::Unsupported(req.kind.clone()))
        }
        Err(e) => {
            req.answer(false);
            Err(RequestError::Malformed(e))
        }
    }
}

/// Run one session channel until both its request stream and its input log are closed.
pub async fn serve_channel(
    channel_id: usize,
    conn: Arc<ConnectionContext>,
    transport: Arc<dyn ChannelTransport>,
    input: mpsc::Receiver<Vec<u8>>,
    mut requests: mpsc::UnboundedReceiver<ChannelRequest>,
) {
    let (input_log, mut input_lines) = mpsc::channel::<String>(INPUT_LOG_CAPACITY);
    let mut session = ChannelSession::new(channel_id, conn.clone(), transport, input, input_log);

    conn.metrics().record_session_channel_opened();
    conn.log_event(LogEntry::Session { channel_id });

    let mut requests_open = true;
    let mut lines_open = true;
    while requests_open || lines_open {
        tokio::select! {
            line = input_lines.recv(), if lines_open => match line {
                Some(input) => conn.log_event(LogEntry::SessionInput { channel_id, input }),
                None => lines_open = false,
            },
            req = requests.recv(), if requests_open => match req {
                Some(req) => {
                    conn.log_event(LogEntry::DebugChannelRequest {
                        channel_id,
                        request_type: req.kind.clone(),
                        want_reply: req.want_reply,
                        payload: escape_bytes(&req.payload),
                    });
                    let kind = req.kind.clone();
                    if let Err(e) = session.handle_request(req).await {
                        warn!(channel = channel_id, request = %kind, error = %e, "Session request failed");
                    }
                }
                None => {
                    requests_open = false;
                    session.release_input_log();
                }
            },
        }
    }

    conn.log_event(LogEntry::SessionClose { channel_id });
    conn.metrics().record_session_channel_closed();
    debug!(channel = channel_id, "Session channel finished");
}
