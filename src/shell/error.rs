use crate::ssh::transport::TransportError;
use thiserror::Error;

/// Errors a running program can end with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The input stream was closed by the client.
    #[error("end of input")]
    Eof,
    /// The client hung up while an interactive terminal was reading.
    #[error("client closed the terminal")]
    ClientEof,
    /// A non-PTY line grew past the scanner limit without a newline.
    #[error("input line longer than {0} bytes")]
    LineTooLong(usize),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ExecError {
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, ExecError::Eof | ExecError::ClientEof)
    }
}
