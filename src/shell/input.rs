use crate::shell::error::ExecError;
use crate::shell::terminal::{LineEditor, LineEvent};
use crate::ssh::transport::{ChannelTransport, Stream};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Capacity of the per-channel input log queue.
pub const INPUT_LOG_CAPACITY: usize = 10;

/// Longest line a [`ScannerReader`] buffers before giving up on the input.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Source of input lines for a running program.
#[async_trait]
pub trait LineReader: Send {
    /// Next line without its terminator.
    async fn read_line(&mut self) -> Result<String, ExecError>;
}

/// Lossy mirror of every line read, consumed by the channel event loop.
/// A full queue drops the line from the log only.
pub struct InputLog {
    sender: mpsc::Sender<String>,
}

impl InputLog {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }

    pub fn record(&self, line: &str) {
        match self.sender.try_send(line.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Input log queue full, line not logged"),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Line-buffered reader over raw channel data (non-PTY sessions).
pub struct ScannerReader {
    input: mpsc::Receiver<Vec<u8>>,
    buf: Vec<u8>,
    closed: bool,
    log: InputLog,
}

impl ScannerReader {
    pub fn new(input: mpsc::Receiver<Vec<u8>>, log: InputLog) -> Self {
        Self {
            input,
            buf: Vec::new(),
            closed: false,
            log,
        }
    }

    fn emit(&self, mut raw: Vec<u8>) -> String {
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        let line = String::from_utf8_lossy(&raw).into_owned();
        self.log.record(&line);
        line
    }
}

#[async_trait]
impl LineReader for ScannerReader {
    async fn read_line(&mut self) -> Result<String, ExecError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut raw: Vec<u8> = self.buf.drain(..=pos).collect();
                raw.pop();
                return Ok(self.emit(raw));
            }
            if self.closed {
                if self.buf.is_empty() {
                    return Err(ExecError::Eof);
                }
                // Final line without a terminator.
                let raw = std::mem::take(&mut self.buf);
                return Ok(self.emit(raw));
            }
            if self.buf.len() > MAX_LINE_LENGTH {
                self.buf = Vec::new();
                return Err(ExecError::LineTooLong(MAX_LINE_LENGTH));
            }
            match self.input.recv().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => self.closed = true,
            }
        }
    }
}

/// Interactive reader for PTY sessions: feeds client bytes through a [`LineEditor`]
/// and echoes to the terminal. Any end of input is reported as [`ExecError::ClientEof`].
pub struct TerminalReader {
    input: mpsc::Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    editor: LineEditor,
    transport: Arc<dyn ChannelTransport>,
    log: InputLog,
}

impl TerminalReader {
    pub fn new(
        input: mpsc::Receiver<Vec<u8>>,
        transport: Arc<dyn ChannelTransport>,
        log: InputLog,
    ) -> Self {
        Self {
            input,
            pending: VecDeque::new(),
            editor: LineEditor::new(),
            transport,
            log,
        }
    }
}

#[async_trait]
impl LineReader for TerminalReader {
    async fn read_line(&mut self) -> Result<String, ExecError> {
        loop {
            // One echo write per chunk rather than per byte.
            let mut echo = Vec::new();
            let mut event = None;
            while let Some(byte) = self.pending.pop_front() {
                let (out, ev) = self.editor.process_byte(byte);
                echo.extend_from_slice(&out);
                if ev.is_some() {
                    event = ev;
                    break;
                }
            }
            if !echo.is_empty() {
                self.transport.write(Stream::Stdout, &echo).await?;
            }
            match event {
                Some(LineEvent::Line(line)) => {
                    self.log.record(&line);
                    return Ok(line);
                }
                Some(LineEvent::Eof) => return Err(ExecError::ClientEof),
                None => {}
            }
            match self.input.recv().await {
                Some(chunk) => self.pending.extend(chunk),
                None => {
                    let partial = self.editor.current_line();
                    if !partial.is_empty() {
                        self.log.record(&partial);
                    }
                    return Err(ExecError::ClientEof);
                }
            }
        }
    }
}
