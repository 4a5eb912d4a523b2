//! In-memory collaborators for exercising channels and commands without a network.
//!
//! Always compiled so the integration suites under `tests/` can use them.

use crate::audit::events::EventRecord;
use crate::audit::EventLogger;
use crate::config::types::AppConfig;
use crate::context::{AppContext, ConnectionContext};
use crate::metrics::MetricsRegistry;
use crate::shell::commands::{self, ExecutionContext, Outcome};
use crate::shell::error::ExecError;
use crate::shell::filesystem::JAIL_ROOT;
use crate::shell::input::LineReader;
use crate::shell::output::OutputSink;
use crate::ssh::transport::{ChannelTransport, Stream, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Hostname used by [`test_config`].
pub const TEST_HOSTNAME: &str = "testhost";

/// One outbound operation seen by a [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    EndOfWrite,
    CloseWrite,
    Close,
}

/// Transport that records every operation in order.
#[derive(Default)]
pub struct RecordingChannel {
    ops: Mutex<Vec<Op>>,
    fail_writes: AtomicBool,
    changed: Notify,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every data write fails with `TransportError::Closed`.
    pub fn failing_writes() -> Arc<Self> {
        let channel = Self::default();
        channel.fail_writes.store(true, Ordering::Relaxed);
        Arc::new(channel)
    }

    fn push(&self, op: Op) {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).push(op);
        self.changed.notify_waiters();
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Operations other than data writes, in order.
    pub fn control_ops(&self) -> Vec<Op> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, Op::Stdout(_) | Op::Stderr(_)))
            .collect()
    }

    pub fn stdout(&self) -> String {
        self.collect(Stream::Stdout)
    }

    pub fn stderr(&self) -> String {
        self.collect(Stream::Stderr)
    }

    fn collect(&self, stream: Stream) -> String {
        let mut out = Vec::new();
        for op in self.ops() {
            match (stream, op) {
                (Stream::Stdout, Op::Stdout(data)) | (Stream::Stderr, Op::Stderr(data)) => {
                    out.extend_from_slice(&data)
                }
                _ => {}
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.ops().contains(&Op::Close)
    }

    /// Wait until `close` has been sent.
    pub async fn wait_closed(&self) {
        loop {
            let changed = self.changed.notified();
            if self.is_closed() {
                return;
            }
            changed.await;
        }
    }

    /// Wait until stdout contains `needle`.
    pub async fn wait_for_stdout(&self, needle: &str) {
        loop {
            let changed = self.changed.notified();
            if self.stdout().contains(needle) {
                return;
            }
            changed.await;
        }
    }
}

#[async_trait]
impl ChannelTransport for RecordingChannel {
    async fn write(&self, stream: Stream, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        self.push(match stream {
            Stream::Stdout => Op::Stdout(data.to_vec()),
            Stream::Stderr => Op::Stderr(data.to_vec()),
        });
        Ok(())
    }

    async fn exit_status(&self, status: u32) -> Result<(), TransportError> {
        self.push(Op::ExitStatus(status));
        Ok(())
    }

    async fn end_of_write(&self) -> Result<(), TransportError> {
        self.push(Op::EndOfWrite);
        Ok(())
    }

    async fn close_write(&self) -> Result<(), TransportError> {
        self.push(Op::CloseWrite);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.push(Op::Close);
        Ok(())
    }
}

/// Sink that keeps everything written to it.
#[derive(Default)]
pub struct CaptureSink {
    buf: Mutex<Vec<u8>>,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap_or_else(|e| e.into_inner())).into_owned()
    }
}

#[async_trait]
impl OutputSink for CaptureSink {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        self.buf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(data);
        Ok(())
    }
}

/// Reader that hands out prepared lines, then ends with `end`.
pub struct ScriptedInput {
    lines: VecDeque<String>,
    end: ExecError,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            end: ExecError::Eof,
        }
    }

    /// End with `end` instead of `ExecError::Eof`.
    pub fn ending_with(mut self, end: ExecError) -> Self {
        self.end = end;
        self
    }
}

#[async_trait]
impl LineReader for ScriptedInput {
    async fn read_line(&mut self) -> Result<String, ExecError> {
        self.lines.pop_front().ok_or_else(|| self.end.clone())
    }
}

/// Runs commands against capture sinks with a persistent working directory.
pub struct CommandHarness {
    pub stdout: Arc<CaptureSink>,
    pub stderr: Arc<CaptureSink>,
    pub cwd: String,
    pub user: String,
    pub pty: bool,
}

impl CommandHarness {
    pub fn new() -> Self {
        Self {
            stdout: CaptureSink::new(),
            stderr: CaptureSink::new(),
            cwd: JAIL_ROOT.to_string(),
            user: "root".to_string(),
            pty: false,
        }
    }

    pub async fn run(&mut self, args: &[&str], stdin: &mut dyn LineReader) -> Outcome {
        let ctx = ExecutionContext {
            args: args.iter().map(|a| a.to_string()).collect(),
            stdin,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            pty: self.pty,
            user: self.user.clone(),
            cwd: &mut self.cwd,
            hostname: TEST_HOSTNAME.to_string(),
            display_name: Arc::from(TEST_HOSTNAME),
        };
        commands::dispatch(ctx).await
    }
}

impl Default for CommandHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Defaults with a fixed hostname and debug events enabled.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.shell.hostname = Some(TEST_HOSTNAME.to_string());
    config.logging.debug = true;
    config
}

/// App context whose event log is handed back instead of written out.
pub fn test_app_context(config: AppConfig) -> (Arc<AppContext>, mpsc::Receiver<EventRecord>) {
    let (events, records) = EventLogger::channel(config.logging.debug, 1024);
    let ctx = AppContext::new(
        Arc::new(config),
        Arc::new(events),
        Arc::new(MetricsRegistry::new()),
    );
    (Arc::new(ctx), records)
}

pub fn test_peer() -> SocketAddr {
    SocketAddr::from(([192, 0, 2, 10], 50022))
}

pub fn test_connection(app: Arc<AppContext>, user: &str) -> Arc<ConnectionContext> {
    Arc::new(ConnectionContext {
        app,
        peer: test_peer(),
        conn_id: "c0ffee00".to_string(),
        user: user.to_string(),
    })
}

/// Event types received so far, in order.
pub fn drain_event_types(records: &mut mpsc::Receiver<EventRecord>) -> Vec<&'static str> {
    let mut types = Vec::new();
    while let Ok(record) = records.try_recv() {
        types.push(record.entry.event_type());
    }
    types
}
