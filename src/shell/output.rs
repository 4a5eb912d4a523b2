use crate::ssh::transport::{ChannelTransport, Stream, TransportError};
use async_trait::async_trait;
use std::sync::Arc;

/// Byte sink a command writes its stdout or stderr to.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    async fn write_str(&self, s: &str) -> Result<(), TransportError> {
        self.write(s.as_bytes()).await
    }

    /// Write `line` followed by a newline.
    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write(&buf).await
    }
}

/// Raw channel stream, used outside PTY mode.
pub struct ChannelWriter {
    transport: Arc<dyn ChannelTransport>,
    stream: Stream,
}

impl ChannelWriter {
    pub fn new(transport: Arc<dyn ChannelTransport>, stream: Stream) -> Self {
        Self { transport, stream }
    }
}

#[async_trait]
impl OutputSink for ChannelWriter {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        self.transport.write(self.stream, data).await
    }
}

/// Terminal output in PTY mode: everything goes to stdout with `\n` expanded to `\r\n`.
pub struct TerminalWriter {
    transport: Arc<dyn ChannelTransport>,
}

impl TerminalWriter {
    pub fn new(transport: Arc<dyn ChannelTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl OutputSink for TerminalWriter {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        self.transport
            .write(Stream::Stdout, &expand_newlines(data))
            .await
    }
}

/// Convert bare `\n` to `\r\n`; existing `\r\n` pairs are left alone.
pub fn expand_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    let mut prev = 0u8;
    for &b in data {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    out
}
