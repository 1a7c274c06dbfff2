//! Poll-driven WebSocket connection
//!
//! A [`WebSocket`] owns its transport and three buffers: raw inbound bytes,
//! queued outbound frames and the message being reassembled. All I/O happens
//! inside [`WebSocket::poll`]; sends only queue frames.

use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use crate::Config;
use crate::buffer::{ByteBuffer, GrowBuffer};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::frame::{FrameDecoder, OpCode, encode_close_frame, encode_frame};
use crate::handshake::{check_origin, client_handshake};
use crate::mask::generate_mask;
use crate::protocol::{MessageHandler, ReadyState, Reassembler};
use crate::transport::{Interest, SocketSubsystem, TcpTransport, Transport};

/// Poll interval used while draining on release
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A client WebSocket connection
///
/// Created in the `Open` state by a successful handshake; construction
/// fails otherwise. Dropping the connection closes it gracefully, bounded by
/// [`Config::drain_timeout`].
pub struct WebSocket<T: Transport = TcpTransport> {
    transport: T,
    state: ReadyState,
    use_mask: bool,
    inbound: GrowBuffer,
    outbound: GrowBuffer,
    reassembler: Reassembler,
    decoder: FrameDecoder,
    read_chunk_size: usize,
    drain_timeout: Duration,
    last_error: Option<Error>,
    /// Set after a protocol violation; the inbound stream is no longer framed
    discard_inbound: bool,
}

impl WebSocket<TcpTransport> {
    /// Connect to a `ws://` URL
    ///
    /// An empty `origin` sends no `Origin` header.
    pub fn create(net: &SocketSubsystem, url: &str, origin: &str, use_mask: bool) -> Result<Self> {
        let config = Config::builder().origin(origin).use_mask(use_mask).build();
        Self::connect(net, url, &config)
    }

    /// Connect to a `ws://` URL with a full configuration
    pub fn connect(net: &SocketSubsystem, url: &str, config: &Config) -> Result<Self> {
        let endpoint = Endpoint::parse(url)?;
        check_origin(config.origin.as_deref())?;

        debug!(host = endpoint.host(), port = endpoint.port(), "connecting");
        let transport = TcpTransport::connect(
            net,
            endpoint.host(),
            endpoint.port(),
            config.connect_timeout,
        )?;

        Self::handshake(transport, &endpoint, config)
    }
}

impl<T: Transport> WebSocket<T> {
    /// Run the upgrade handshake over an already connected transport
    ///
    /// The transport is closed if the handshake fails.
    pub fn handshake(mut transport: T, endpoint: &Endpoint, config: &Config) -> Result<Self> {
        let inbound = match client_handshake(&mut transport, endpoint, config) {
            Ok(leftover) => leftover,
            Err(e) => {
                debug!(error = %e, "handshake failed");
                transport.close();
                return Err(e);
            }
        };

        if let Err(e) = transport.set_nodelay(config.nodelay) {
            debug!(error = %e, "unable to set TCP_NODELAY");
        }

        debug!(endpoint = %endpoint, "connection open");
        Ok(Self {
            transport,
            state: ReadyState::Open,
            use_mask: config.use_mask,
            inbound,
            outbound: GrowBuffer::with_capacity(config.write_buffer_size),
            reassembler: Reassembler::new(config.max_message_size),
            decoder: FrameDecoder::new(config.max_frame_size),
            read_chunk_size: config.read_chunk_size.max(1),
            drain_timeout: config.drain_timeout,
            last_error: None,
            discard_inbound: false,
        })
    }

    /// Current ready state
    #[inline]
    pub fn ready_state(&self) -> ReadyState {
        self.state
    }

    /// The failure that moved the connection to `Closed`, if any
    #[inline]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Bytes queued but not yet written to the transport
    #[inline]
    pub fn buffered_amount(&self) -> usize {
        self.outbound.len()
    }

    /// Get a reference to the underlying transport
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Queue a text message
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_frame(OpCode::Text, text.as_bytes())
    }

    /// Queue a binary message
    pub fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.send_frame(OpCode::Binary, data)
    }

    /// Queue an empty ping
    pub fn send_ping(&mut self) -> Result<()> {
        self.send_frame(OpCode::Ping, &[])
    }

    /// Start the closing handshake
    ///
    /// Queues one close frame and moves to `Closing`; the connection reaches
    /// `Closed` once a later `poll` has flushed it. No-op unless `Open`.
    pub fn close(&mut self) {
        if self.state != ReadyState::Open {
            return;
        }
        encode_close_frame(&mut self.outbound);
        self.set_state(ReadyState::Closing);
    }

    /// Drive one I/O cycle
    ///
    /// Waits up to `timeout` for readiness, reads what is available, flushes
    /// queued frames and, when `handler` is given, dispatches every complete
    /// frame. Failures never surface here: they move the connection to
    /// `Closed` and are kept in [`last_error`](Self::last_error).
    pub fn poll(&mut self, handler: Option<&mut dyn MessageHandler>, timeout: Duration) {
        if self.state == ReadyState::Closed {
            self.transport.idle(timeout);
            return;
        }

        if !timeout.is_zero() {
            let interest = Interest::for_output(!self.outbound.is_empty());
            if let Err(e) = self.transport.wait(interest, timeout) {
                self.fail(e.into());
                return;
            }
        }

        if self.fill_inbound()
            && self.flush_outbound()
            && self.state == ReadyState::Closing
            && self.outbound.is_empty()
        {
            self.shutdown();
        }

        if let Some(handler) = handler {
            self.dispatch(handler);
        }
    }

    /// Close gracefully and release the transport
    ///
    /// Polls until `Closed` or until the drain timeout passes, then returns
    /// the failure that ended the connection, if any.
    pub fn release(mut self) -> Option<Error> {
        self.drain();
        self.last_error.take()
    }

    fn send_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if self.state != ReadyState::Open {
            return Err(Error::InvalidState("connection is not open"));
        }
        let mask = self.next_mask();
        encode_frame(&mut self.outbound, opcode, payload, mask);
        trace!(?opcode, len = payload.len(), "frame queued");
        Ok(())
    }

    #[inline]
    fn next_mask(&self) -> Option<[u8; 4]> {
        self.use_mask.then(generate_mask)
    }

    /// Read until the transport would block. Returns false once closed.
    fn fill_inbound(&mut self) -> bool {
        loop {
            let spare = self.inbound.reserve(self.read_chunk_size);
            match self.transport.recv(spare) {
                Ok(0) => {
                    self.fail(Error::ConnectionClosed);
                    return false;
                }
                Ok(n) if self.discard_inbound => {
                    trace!(bytes = n, "discarded");
                }
                Ok(n) => {
                    self.inbound.commit(n);
                    trace!(bytes = n, "read");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) => {
                    self.fail(e.into());
                    return false;
                }
            }
        }
    }

    /// Write until the outbound queue is empty or the transport would block.
    /// Returns false once closed.
    fn flush_outbound(&mut self) -> bool {
        while !self.outbound.is_empty() {
            match self.transport.send(self.outbound.data()) {
                Ok(0) => {
                    self.fail(Error::ConnectionClosed);
                    return false;
                }
                Ok(n) => {
                    self.outbound.consume_front(n);
                    trace!(bytes = n, "wrote");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.fail(e.into());
                    return false;
                }
            }
        }
        true
    }

    /// Decode and handle every complete frame in the inbound buffer
    fn dispatch(&mut self, handler: &mut dyn MessageHandler) {
        if self.discard_inbound {
            return;
        }
        loop {
            let header = match self.decoder.decode(self.inbound.data_mut()) {
                Ok(Some(header)) => header,
                Ok(None) => return,
                Err(e) => {
                    self.protocol_violation(e);
                    return;
                }
            };
            trace!(opcode = ?header.opcode, fin = header.fin, len = header.payload_len, "frame");

            match header.opcode {
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    let payload = &self.inbound.data()[header.payload_range()];
                    if let Err(e) = self.reassembler.push(&header, payload, handler) {
                        self.protocol_violation(e);
                        return;
                    }
                }
                OpCode::Ping => {
                    if self.state == ReadyState::Open {
                        let mask = self.next_mask();
                        let payload = &self.inbound.data()[header.payload_range()];
                        encode_frame(&mut self.outbound, OpCode::Pong, payload, mask);
                    }
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    debug!("close frame received");
                    self.close();
                }
            }

            self.inbound.consume_front(header.frame_len());
        }
    }

    fn protocol_violation(&mut self, err: Error) {
        warn!(error = %err, "protocol violation, closing");
        self.inbound.clear();
        self.discard_inbound = true;
        self.reassembler.reset();
        self.last_error = Some(err);
        self.close();
    }

    /// Transport failure or peer shutdown: straight to `Closed`
    fn fail(&mut self, err: Error) {
        match err {
            Error::ConnectionClosed => debug!("connection closed by peer"),
            ref e => error!(error = %e, "transport failure, closing"),
        }
        self.last_error = Some(err);
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.transport.close();
        self.outbound.clear();
        self.set_state(ReadyState::Closed);
    }

    fn set_state(&mut self, state: ReadyState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "ready state");
            self.state = state;
        }
    }

    fn drain(&mut self) {
        if self.state == ReadyState::Closed {
            return;
        }

        self.close();
        let deadline = Instant::now() + self.drain_timeout;
        while self.state != ReadyState::Closed {
            if Instant::now() >= deadline {
                warn!(
                    pending = self.outbound.len(),
                    "close drain timed out, dropping connection"
                );
                self.shutdown();
                break;
            }
            self.poll(None, DRAIN_POLL_INTERVAL);
        }
    }
}

impl<T: Transport> Drop for WebSocket<T> {
    fn drop(&mut self) {
        self.drain();
    }
}

impl<T: Transport + fmt::Debug> fmt::Debug for WebSocket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("use_mask", &self.use_mask)
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}
