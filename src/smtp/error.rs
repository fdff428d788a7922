//! Error types shared by both protocol roles

use std::io::ErrorKind;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input that violates line framing (missing CRLF, truncated read).
    /// Fatal to the session it occurred on, and to nothing else.
    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("not connected")]
    NotConnected,

    #[error("malformed response from server")]
    BadResponse,

    #[error("non-ASCII data on the wire")]
    NonAscii,
}

impl SmtpError {
    pub fn is_connection_reset(&self) -> bool {
        match self {
            SmtpError::ConnectionReset => true,
            SmtpError::Io(err) => matches!(
                err.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    pub fn is_connection_refused(&self) -> bool {
        matches!(self, SmtpError::Io(err) if err.kind() == ErrorKind::ConnectionRefused)
    }
}
