//! Error types for the WebSocket client

use std::io;

use thiserror::Error;

/// Result type alias for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket error types
///
/// Construction failures are returned to the caller. Failures that happen
/// while polling never propagate: they move the connection to `Closed` and
/// are kept for inspection via [`WebSocket::last_error`](crate::WebSocket::last_error).
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// URL could not be parsed into host, port and path
    #[error("invalid URL: {0}")]
    InvalidUrl(&'static str),

    /// Only plain `ws://` is supported
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Host name exceeds the allowed length
    #[error("host name too long ({0} bytes)")]
    HostTooLong(usize),

    /// Origin header value exceeds the allowed length
    #[error("origin too long ({0} bytes)")]
    OriginTooLong(usize),

    /// TCP connection could not be established
    #[error("unable to connect to {host}:{port}")]
    Connect {
        /// Host that was dialled
        host: String,
        /// Port that was dialled
        port: u16,
        /// Last error seen while trying the resolved addresses
        #[source]
        source: io::Error,
    },

    /// Invalid HTTP in the upgrade response
    #[error("invalid HTTP: {0}")]
    InvalidHttp(&'static str),

    /// Server answered the upgrade with something other than 101
    #[error("unexpected handshake status {0}")]
    UnexpectedStatus(u16),

    /// Handshake failed
    #[error("handshake failed: {0}")]
    HandshakeFailed(&'static str),

    /// Handshake did not finish before its deadline
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection reset by peer
    #[error("connection reset by peer")]
    ConnectionReset,

    /// Would block (non-blocking I/O)
    #[error("would block")]
    WouldBlock,

    /// Frame carried a reserved opcode
    #[error("invalid opcode {0:#x}")]
    InvalidOpcode(u8),

    /// Frame payload exceeds the configured maximum
    #[error("frame too large ({0} bytes)")]
    FrameTooLarge(u64),

    /// Reassembled message exceeds the configured maximum
    #[error("message too large ({0} bytes)")]
    MessageTooLarge(usize),

    /// Operation not allowed in the current ready state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Whether this error only signals that the operation should be retried later
    #[inline]
    pub fn is_would_block(&self) -> bool {
        matches!(self, Error::WouldBlock)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::ConnectionReset => Error::ConnectionReset,
            io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            io::ErrorKind::TimedOut => Error::HandshakeTimeout,
            _ => Error::Io(e),
        }
    }
}
