//! Byte-stream transports for WebSocket connections
//!
//! The connection state machine only talks to the network through the
//! [`Transport`] trait:
//! - non-blocking `send`/`recv`, where `WouldBlock` is transient
//! - `wait` for readiness with a bounded timeout
//! - `idle` for the no-op wait performed while the connection is closed
//!
//! [`TcpTransport`] is the default implementation over a std `TcpStream`
//! driven by the `polling` crate.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use polling::{Event, Poller};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Readiness a caller waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    readable: bool,
    writable: bool,
}

impl Interest {
    /// Wait until readable
    pub const READABLE: Interest = Interest {
        readable: true,
        writable: false,
    };

    /// Wait until writable
    pub const WRITABLE: Interest = Interest {
        readable: false,
        writable: true,
    };

    /// Wait until readable or writable
    pub const BOTH: Interest = Interest {
        readable: true,
        writable: true,
    };

    /// Read interest, plus write interest when `pending_output` is set
    #[inline]
    pub fn for_output(pending_output: bool) -> Self {
        if pending_output {
            Self::BOTH
        } else {
            Self::READABLE
        }
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        self.readable
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// A connected, non-blocking byte stream
///
/// `send` and `recv` follow `std::io` conventions: `Ok(0)` from `recv` is an
/// orderly shutdown by the peer and `ErrorKind::WouldBlock` means "try again
/// after the next readiness wait".
pub trait Transport {
    /// Write as many bytes of `buf` as the stream accepts right now
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Read the bytes available right now into `buf`
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Block up to `timeout` until the stream is ready for `interest`
    ///
    /// Returning without readiness (timeout) is not an error.
    fn wait(&mut self, interest: Interest, timeout: Duration) -> io::Result<()>;

    /// Yield for `timeout` without doing any I/O
    fn idle(&mut self, timeout: Duration) {
        if !timeout.is_zero() {
            std::thread::sleep(timeout);
        }
    }

    /// Enable or disable Nagle's algorithm where the stream supports it
    fn set_nodelay(&mut self, _nodelay: bool) -> io::Result<()> {
        Ok(())
    }

    /// Shut the stream down. Further calls are no-ops.
    fn close(&mut self);
}

/// Process-wide socket subsystem guard
///
/// Opening a [`TcpTransport`] requires a borrow of this guard, so sockets
/// cannot outlive the subsystem's startup/shutdown scope.
#[derive(Debug)]
pub struct SocketSubsystem {
    _private: (),
}

impl SocketSubsystem {
    /// Start the socket subsystem for the lifetime of the returned guard
    pub fn new() -> Self {
        debug!("socket subsystem started");
        Self { _private: () }
    }
}

impl Default for SocketSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SocketSubsystem {
    fn drop(&mut self) {
        debug!("socket subsystem stopped");
    }
}

const STREAM_KEY: usize = 0;

/// Non-blocking TCP transport with readiness polling
pub struct TcpTransport {
    stream: TcpStream,
    poller: Poller,
    events: Vec<Event>,
    closed: bool,
}

impl TcpTransport {
    /// Resolve `host` and connect to the first address that accepts
    ///
    /// Each resolved address gets `timeout` to complete the TCP handshake.
    pub fn connect(
        _net: &SocketSubsystem,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|source| Error::Connect {
                host: host.to_string(),
                port,
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            trace!(%addr, "connecting");
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    debug!(host, port, %addr, "TCP connection established");
                    return Self::from_stream(stream);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(Error::Connect {
            host: host.to_string(),
            port,
            source: last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
            }),
        })
    }

    /// Wrap an already connected stream, switching it to non-blocking mode
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let poller = Poller::new()?;
        poller.add(&stream, Event::none(STREAM_KEY))?;

        Ok(Self {
            stream,
            poller,
            events: Vec::with_capacity(1),
            closed: false,
        })
    }

    /// Local address of the socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Remote address of the socket
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.stream.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn wait(&mut self, interest: Interest, timeout: Duration) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }

        let event = match (interest.is_readable(), interest.is_writable()) {
            (true, true) => Event::all(STREAM_KEY),
            (false, true) => Event::writable(STREAM_KEY),
            _ => Event::readable(STREAM_KEY),
        };
        // Registrations are oneshot; re-arm before every wait
        self.poller.modify(&self.stream, event)?;

        self.events.clear();
        match self.poller.wait(&mut self.events, Some(timeout)) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn set_nodelay(&mut self, nodelay: bool) -> io::Result<()> {
        self.stream.set_nodelay(nodelay)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.poller.delete(&self.stream);
        let _ = self.stream.shutdown(Shutdown::Both);
        trace!("TCP transport closed");
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.stream.peer_addr().ok())
            .field("closed", &self.closed)
            .finish()
    }
}
