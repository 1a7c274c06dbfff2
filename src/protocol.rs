//! WebSocket protocol types
//!
//! This module holds the pieces of the connection state machine that do not
//! touch the transport:
//! - Ready states
//! - Borrowed message views and the callback trait
//! - Fragment reassembly

use std::fmt;

use crate::buffer::{ByteBuffer, GrowBuffer};
use crate::error::{Error, Result};
use crate::frame::{FrameHeader, OpCode};

/// Connection lifecycle phase
///
/// States only move forward: `Connecting` is left once, on handshake
/// success, and `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    /// Handshake in progress
    Connecting,
    /// Open, sends are accepted
    Open,
    /// Close frame queued, waiting for the outbound buffer to drain
    Closing,
    /// Terminal
    Closed,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closing => "CLOSING",
            ReadyState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Whether a data message is text or binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Started by a text frame
    Text,
    /// Started by a binary or stray continuation frame
    Binary,
}

impl MessageKind {
    /// Kind of a message whose first frame carries `opcode`
    ///
    /// A continuation frame with no message in flight is delivered as binary.
    #[inline]
    fn from_opcode(opcode: OpCode) -> Self {
        match opcode {
            OpCode::Text => MessageKind::Text,
            _ => MessageKind::Binary,
        }
    }
}

/// A complete message, borrowed for the duration of the callback
///
/// Text payloads are not validated on receipt; [`Message::as_text`] decodes
/// them on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    /// Text message
    Text(&'a [u8]),
    /// Binary message
    Binary(&'a [u8]),
}

impl<'a> Message<'a> {
    #[inline]
    fn new(kind: MessageKind, payload: &'a [u8]) -> Self {
        match kind {
            MessageKind::Text => Message::Text(payload),
            MessageKind::Binary => Message::Binary(payload),
        }
    }

    /// Message kind
    #[inline]
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::Binary(_) => MessageKind::Binary,
        }
    }

    /// Check if this is a text message
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Check if this is a binary message
    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Get the payload bytes
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            Message::Text(b) | Message::Binary(b) => b,
        }
    }

    /// Get a text message as `&str`
    ///
    /// Returns None for binary messages and for text that is not valid UTF-8.
    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            Message::Text(b) => std::str::from_utf8(b).ok(),
            Message::Binary(_) => None,
        }
    }
}

/// Receiver of completed messages
///
/// Any `FnMut(Message<'_>)` closure is a handler.
pub trait MessageHandler {
    /// Called once per complete message; the bytes are only valid for the call
    fn on_message(&mut self, message: Message<'_>);
}

impl<F> MessageHandler for F
where
    F: FnMut(Message<'_>),
{
    #[inline]
    fn on_message(&mut self, message: Message<'_>) {
        self(message)
    }
}

/// Accumulates data frames into complete messages
///
/// Text, binary and continuation frames all append to the same buffer; the
/// first frame decides the message kind and the first `fin` frame completes
/// the message. Between messages the buffer is empty.
///
/// Empty messages are delivered too: a zero-length text or binary message is
/// a valid message and reaches the handler like any other.
#[derive(Debug)]
pub struct Reassembler {
    buf: GrowBuffer,
    kind: Option<MessageKind>,
    max_message_size: usize,
}

impl Reassembler {
    /// Create a reassembler rejecting messages above `max_message_size`
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buf: GrowBuffer::new(),
            kind: None,
            max_message_size,
        }
    }

    /// Check if a fragmented message is in flight
    #[inline]
    pub fn in_progress(&self) -> bool {
        self.kind.is_some()
    }

    /// Bytes accumulated for the message in flight
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed one data frame, calling `handler` once the message completes
    pub fn push(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
        handler: &mut dyn MessageHandler,
    ) -> Result<()> {
        let kind = *self
            .kind
            .get_or_insert_with(|| MessageKind::from_opcode(header.opcode));

        let total = self.buf.len() + payload.len();
        if total > self.max_message_size {
            self.reset();
            return Err(Error::MessageTooLarge(total));
        }

        if header.fin && self.buf.is_empty() {
            // Single-frame message, deliver straight from the inbound buffer
            self.kind = None;
            handler.on_message(Message::new(kind, payload));
            return Ok(());
        }

        self.buf.append(payload);

        if header.fin {
            handler.on_message(Message::new(kind, self.buf.data()));
            self.reset();
        }

        Ok(())
    }

    /// Drop any partially assembled message
    #[inline]
    pub fn reset(&mut self) {
        self.buf.clear();
        self.kind = None;
    }
}
