use crate::shell::commands::{self, ExecutionContext, Outcome};
use crate::shell::error::ExecError;
use crate::shell::filesystem::JAIL_ROOT;
use crate::shell::input::{InputLog, LineReader, ScannerReader, TerminalReader};
use crate::shell::output::{ChannelWriter, OutputSink, TerminalWriter};
use crate::ssh::transport::{ChannelTransport, Stream};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

/// One program invocation bound to a session channel.
pub struct Program {
    pub args: Vec<String>,
    pub pty: bool,
    pub user: String,
    pub display_name: Arc<str>,
    pub transport: Arc<dyn ChannelTransport>,
    /// Client data for this channel.
    pub input: mpsc::Receiver<Vec<u8>>,
    /// Every line read is mirrored here; dropped when the program ends.
    pub input_log: mpsc::Sender<String>,
}

impl Program {
    /// Run on its own task so the channel keeps processing requests meanwhile.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run().in_current_span())
    }

    pub async fn run(self) {
        let Program {
            args,
            pty,
            user,
            display_name,
            transport,
            input,
            input_log,
        } = self;

        let outcome = {
            let log = InputLog::new(input_log);
            let mut stdin: Box<dyn LineReader>;
            let stdout: Arc<dyn OutputSink>;
            let stderr: Arc<dyn OutputSink>;
            if pty {
                stdin = Box::new(TerminalReader::new(input, transport.clone(), log));
                stdout = Arc::new(TerminalWriter::new(transport.clone()));
                stderr = stdout.clone();
            } else {
                stdin = Box::new(ScannerReader::new(input, log));
                stdout = Arc::new(ChannelWriter::new(transport.clone(), Stream::Stdout));
                stderr = Arc::new(ChannelWriter::new(transport.clone(), Stream::Stderr));
            }

            let mut cwd = JAIL_ROOT.to_string();
            let ctx = ExecutionContext {
                args,
                stdin: stdin.as_mut(),
                stdout,
                stderr,
                pty,
                user,
                cwd: &mut cwd,
                hostname: display_name.to_string(),
                display_name,
            };
            let outcome = commands::dispatch(ctx).await;
            // Readers drop here, closing the input log.
            outcome
        };

        finish(transport.as_ref(), pty, outcome).await;
    }
}

/// Exit-status, EOW, close-write, close. Later steps run even when earlier ones fail.
/// A program that died on a real I/O error gets none of them.
pub async fn finish(transport: &dyn ChannelTransport, pty: bool, outcome: Outcome) {
    let client_eof = match outcome.error {
        None | Some(ExecError::Eof) => false,
        Some(ExecError::ClientEof) => true,
        Some(ref e) => {
            warn!(error = %e, status = outcome.status, "Program failed, channel left open");
            return;
        }
    };

    if client_eof && pty {
        if let Err(e) = transport.write(Stream::Stdout, b"\r\n").await {
            warn!(error = %e, "Failed to write CRLF");
        }
    }

    if let Err(e) = transport.exit_status(outcome.status).await {
        warn!(error = %e, "Failed to send exit-status");
    }

    if (pty && client_eof) || outcome.error.is_none() {
        if let Err(e) = transport.end_of_write().await {
            warn!(error = %e, "Failed to send eow@openssh.com");
        }
    }

    if let Err(e) = transport.close_write().await {
        warn!(error = %e, "Failed to send EOF");
    }

    if let Err(e) = transport.close().await {
        warn!(error = %e, "Failed to close channel");
    }

    debug!(status = outcome.status, "Program finished");
}
