//! # wspoll: poll-driven WebSocket client
//!
//! An RFC 6455 client over plain TCP for applications that own their event
//! loop. There are no background threads and no async runtime: the caller
//! drives each connection by calling [`WebSocket::poll`] repeatedly from one
//! thread.
//!
//! ## Features
//!
//! - **SIMD Masking**: AVX2/SSE2/NEON XOR masking with a word-at-a-time fallback
//! - **In-Place Decoding**: Frames are unmasked and dispatched straight from the inbound buffer
//! - **Fragment Reassembly**: Fragmented messages reach the callback as one message
//! - **Automatic Control Frames**: Pings are answered, pongs are swallowed, close is echoed
//! - **Pluggable I/O**: Any [`Transport`] can stand in for the TCP socket
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wspoll::{Message, ReadyState, SocketSubsystem, WebSocket};
//!
//! let net = SocketSubsystem::new();
//! let mut ws = WebSocket::create(&net, "ws://localhost:8126/foo", "", true)?;
//! ws.send_text("hello")?;
//!
//! let mut on_message = |msg: Message<'_>| {
//!     if let Some(text) = msg.as_text() {
//!         println!(">>> {}", text);
//!     }
//! };
//! while ws.ready_state() != ReadyState::Closed {
//!     ws.poll(Some(&mut on_message), Duration::from_millis(10));
//! }
//! # Ok::<(), wspoll::Error>(())
//! ```

pub mod buffer;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod protocol;
pub mod simd;
pub mod transport;
pub mod websocket;

use std::time::Duration;

pub use buffer::{ByteBuffer, GrowBuffer};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use frame::{FrameDecoder, FrameHeader, OpCode};
pub use protocol::{Message, MessageHandler, MessageKind, ReadyState};
pub use transport::{Interest, SocketSubsystem, TcpTransport, Transport};
pub use websocket::WebSocket;

/// Default outbound buffer size (16KB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 16 * 1024;

/// Default size of each inbound read (one Ethernet MTU)
pub const READ_CHUNK_SIZE: usize = 1500;

/// Maximum WebSocket frame header size (2 + 8 + 4 = 14 bytes)
pub const MAX_FRAME_HEADER_SIZE: usize = 14;

/// Small message threshold for fast-path optimization (< 126 bytes uses 2-byte header)
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Medium message threshold (< 64KB uses 4-byte header)
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// WebSocket GUID for handshake
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `Sec-WebSocket-Key` sent with every upgrade request
pub const HANDSHAKE_KEY: &str = "x3JJHMbDL1EzLkh9GBhXDw==";

/// Maximum HTTP response head size (8KB)
pub const MAX_HEADER_SIZE: usize = 8192;

/// Maximum host name length accepted in a URL
pub const MAX_HOST_LEN: usize = 255;

/// Maximum `Origin` header length
pub const MAX_ORIGIN_LEN: usize = 200;

/// Configuration for WebSocket connections
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use wspoll::Config;
///
/// let config = Config::builder()
///     .origin("http://localhost")
///     .max_message_size(1024 * 1024)
///     .handshake_timeout(Duration::from_secs(3))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Mask outbound frames (default: true)
    pub use_mask: bool,
    /// `Origin` header value, at most 200 bytes (default: none)
    pub origin: Option<String>,
    /// Maximum payload of a single received frame (default: 16MB)
    pub max_frame_size: usize,
    /// Maximum size of a reassembled message (default: 64MB)
    pub max_message_size: usize,
    /// Bytes requested per inbound read (default: 1500)
    pub read_chunk_size: usize,
    /// Initial outbound buffer capacity (default: 16KB)
    pub write_buffer_size: usize,
    /// TCP connect timeout per resolved address (default: 10s)
    pub connect_timeout: Duration,
    /// Deadline for writing the upgrade request and reading the response (default: 10s)
    pub handshake_timeout: Duration,
    /// Bound on the close drain performed on release (default: 5s)
    pub drain_timeout: Duration,
    /// Disable Nagle's algorithm after the handshake (default: true)
    pub nodelay: bool,
    /// Check `Sec-WebSocket-Accept` against the sent key (default: false)
    pub verify_accept: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_mask: true,
            origin: None,
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            read_chunk_size: READ_CHUNK_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            nodelay: true,
            verify_accept: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for WebSocket configuration
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Enable or disable outbound masking
    pub fn use_mask(mut self, enabled: bool) -> Self {
        self.config.use_mask = enabled;
        self
    }

    /// Set the `Origin` header; an empty string sends none
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        self.config.origin = (!origin.is_empty()).then_some(origin);
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set maximum message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the inbound read chunk size
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    /// Set the initial outbound buffer capacity
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Set the TCP connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the handshake deadline
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the bound on the close drain performed on release
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    /// Enable or disable `TCP_NODELAY`
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Enable or disable `Sec-WebSocket-Accept` verification
    pub fn verify_accept(mut self, enabled: bool) -> Self {
        self.config.verify_accept = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::Config;
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{Message, MessageHandler, ReadyState};
    pub use crate::transport::{SocketSubsystem, Transport};
    pub use crate::websocket::WebSocket;
}
