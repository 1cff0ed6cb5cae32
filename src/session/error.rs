//! Session error types

use std::fmt;
use std::io;

use crate::protocol::{ConnAckResult, DecodeError, EncodeError};

/// Error type for a broker exchange
#[derive(Debug)]
pub enum SessionError {
    /// Request could not be encoded; nothing was sent
    Encode(EncodeError),
    /// Broker reply could not be decoded
    Decode(DecodeError),
    /// No reply within the stream's read timeout
    Timeout,
    /// Broker closed the connection before replying
    ConnectionClosed,
    /// Broker answered with a non-zero return code
    Rejected(ConnAckResult),
    /// Other transport error
    Io(io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Encode(e) => write!(f, "encode error: {}", e),
            SessionError::Decode(e) => write!(f, "decode error: {}", e),
            SessionError::Timeout => write!(f, "operation timed out"),
            SessionError::ConnectionClosed => write!(f, "connection closed by broker"),
            SessionError::Rejected(connack) => {
                write!(f, "connection refused: {}", connack.describe())
            }
            SessionError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Encode(e) => Some(e),
            SessionError::Decode(e) => Some(e),
            SessionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EncodeError> for SessionError {
    fn from(e: EncodeError) -> Self {
        SessionError::Encode(e)
    }
}

impl From<DecodeError> for SessionError {
    fn from(e: DecodeError) -> Self {
        SessionError::Decode(e)
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            // Read timeouts surface as WouldBlock on Unix and TimedOut on Windows
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => SessionError::Timeout,
            io::ErrorKind::UnexpectedEof => SessionError::ConnectionClosed,
            _ => SessionError::Io(e),
        }
    }
}
