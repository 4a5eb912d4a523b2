use async_trait::async_trait;
use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// SSH_EXTENDED_DATA_STDERR
const EXTENDED_DATA_STDERR: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("channel is closed")]
    Closed,
    #[error("failed to send {0}")]
    SendFailed(&'static str),
}

/// Outbound half of one session channel. Request replies are not part of it;
/// they travel back with the request itself.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn write(&self, stream: Stream, data: &[u8]) -> Result<(), TransportError>;

    async fn exit_status(&self, status: u32) -> Result<(), TransportError>;

    /// `eow@openssh.com`, sent between `exit_status` and `close_write`.
    ///
    /// [`RusshChannel`] cannot emit it: russh has no way to send arbitrary
    /// channel requests, so in production this only traces and succeeds. The
    /// in-memory transports used by tests record it to check ordering.
    async fn end_of_write(&self) -> Result<(), TransportError>;

    async fn close_write(&self) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// One queued operation for the channel writer task.
#[derive(Debug)]
enum Outbound {
    Data(Stream, Vec<u8>),
    ExitStatus(u32),
    EndOfWrite,
    Eof,
    Close,
}

/// Transport backed by a russh session handle.
///
/// Operations are queued to a writer task and sent in order, so a program never
/// waits on the session loop while that loop waits on the program's input.
/// After the first failed send the writer stops and every later call reports
/// [`TransportError::Closed`].
#[derive(Clone)]
pub struct RusshChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl RusshChannel {
    pub fn spawn(handle: Handle, id: ChannelId) -> Self {
        let (outbound, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_outbound(handle, id, queue));
        Self { outbound }
    }

    fn queue(&self, op: Outbound) -> Result<(), TransportError> {
        self.outbound.send(op).map_err(|_| TransportError::Closed)
    }
}

async fn write_outbound(handle: Handle, id: ChannelId, mut queue: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(op) = queue.recv().await {
        let sent = match op {
            Outbound::Data(Stream::Stdout, data) => handle
                .data(id, CryptoVec::from_slice(&data))
                .await
                .map_err(|_| TransportError::Closed),
            Outbound::Data(Stream::Stderr, data) => handle
                .extended_data(id, EXTENDED_DATA_STDERR, CryptoVec::from_slice(&data))
                .await
                .map_err(|_| TransportError::Closed),
            Outbound::ExitStatus(status) => handle
                .exit_status_request(id, status)
                .await
                .map_err(|_| TransportError::SendFailed("exit-status")),
            Outbound::EndOfWrite => {
                debug!(channel = ?id, "eow@openssh.com not sent");
                Ok(())
            }
            Outbound::Eof => handle
                .eof(id)
                .await
                .map_err(|_| TransportError::SendFailed("eof")),
            Outbound::Close => handle
                .close(id)
                .await
                .map_err(|_| TransportError::SendFailed("close")),
        };
        if let Err(e) = sent {
            debug!(channel = ?id, error = %e, "Channel writer stopped");
            return;
        }
    }
}

#[async_trait]
impl ChannelTransport for RusshChannel {
    async fn write(&self, stream: Stream, data: &[u8]) -> Result<(), TransportError> {
        self.queue(Outbound::Data(stream, data.to_vec()))
    }

    async fn exit_status(&self, status: u32) -> Result<(), TransportError> {
        self.queue(Outbound::ExitStatus(status))
    }

    async fn end_of_write(&self) -> Result<(), TransportError> {
        self.queue(Outbound::EndOfWrite)
    }

    async fn close_write(&self) -> Result<(), TransportError> {
        self.queue(Outbound::Eof)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.queue(Outbound::Close)
    }
}
