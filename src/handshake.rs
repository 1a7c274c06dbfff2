//! WebSocket handshake implementation
//!
//! This module handles the client side of the HTTP upgrade handshake:
//! - Building the upgrade request with a fixed `Sec-WebSocket-Key`
//! - Parsing the response head with `httparse`
//! - Optional `Sec-WebSocket-Accept` verification
//!
//! The exchange is performed over a non-blocking [`Transport`] with a single
//! deadline covering both the request write and the response read.

use std::io;
use std::time::Instant;

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tracing::{debug, trace};

use crate::buffer::{ByteBuffer, GrowBuffer};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::transport::{Interest, Transport};
use crate::{Config, HANDSHAKE_KEY, MAX_HEADER_SIZE, MAX_ORIGIN_LEN, WS_GUID};

/// Bytes requested from the transport per read while the head is incomplete
const HEAD_READ_CHUNK: usize = 1024;

const MIN_HEADER_SLOTS: usize = 16;

/// Generate the Sec-WebSocket-Accept key
///
/// This computes: Base64(SHA-1(key + GUID))
#[inline]
pub fn generate_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Validate the server's accept key
pub fn validate_accept_key(sent_key: &str, received_accept: &str) -> bool {
    let expected = generate_accept_key(sent_key);
    expected == received_accept
}

/// Reject an `Origin` value that exceeds [`MAX_ORIGIN_LEN`]
pub fn check_origin(origin: Option<&str>) -> Result<()> {
    match origin {
        Some(origin) if origin.len() > MAX_ORIGIN_LEN => Err(Error::OriginTooLong(origin.len())),
        _ => Ok(()),
    }
}

/// Build the HTTP/1.1 upgrade request
///
/// `Origin` is only sent when present and non-empty.
pub fn build_request(endpoint: &Endpoint, key: &str, origin: Option<&str>) -> Bytes {
    let mut buf = BytesMut::with_capacity(256);

    buf.put_slice(b"GET ");
    buf.put_slice(endpoint.request_target().as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    buf.put_slice(b"Host: ");
    buf.put_slice(endpoint.host_header().as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Key: ");
    buf.put_slice(key.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Sec-WebSocket-Version: 13\r\n");

    if let Some(origin) = origin.filter(|o| !o.is_empty()) {
        buf.put_slice(b"Origin: ");
        buf.put_slice(origin.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Parsed upgrade response head
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
    /// HTTP status code
    pub status: u16,
    /// The Sec-WebSocket-Accept header
    pub accept: Option<&'a str>,
}

/// Parse the upgrade response head
///
/// Returns the response and the number of bytes the head occupies, or
/// `Ok(None)` while the head is still incomplete.
pub fn parse_response(buf: &[u8]) -> Result<Option<(HandshakeResponse<'_>, usize)>> {
    // One slot per line is enough for any head within the size limit
    let lines = buf[..buf.len().min(MAX_HEADER_SIZE)]
        .iter()
        .filter(|&&b| b == b'\n')
        .count();
    let mut headers = vec![httparse::EMPTY_HEADER; lines.max(MIN_HEADER_SLOTS)];
    let mut res = httparse::Response::new(&mut headers[..]);

    match res.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            if res.version != Some(1) {
                return Err(Error::InvalidHttp("expected HTTP/1.1"));
            }

            let status = res.code.unwrap_or(0);
            if status != 101 {
                return Err(Error::UnexpectedStatus(status));
            }

            let mut accept = None;
            for header in res.headers.iter() {
                if header.name.eq_ignore_ascii_case("sec-websocket-accept") {
                    let value = std::str::from_utf8(header.value)
                        .map_err(|_| Error::InvalidHttp("invalid header value"))?;
                    accept = Some(value.trim());
                }
            }

            Ok(Some((HandshakeResponse { status, accept }, len)))
        }
        Ok(httparse::Status::Partial) => {
            if buf.len() >= MAX_HEADER_SIZE {
                return Err(Error::InvalidHttp("response head too large"));
            }
            Ok(None)
        }
        Err(_) => Err(Error::InvalidHttp("failed to parse HTTP response")),
    }
}

/// Perform the client-side handshake over `transport`
///
/// Returns the bytes received after the response head; they are the start
/// of the first frame.
pub fn client_handshake<T: Transport + ?Sized>(
    transport: &mut T,
    endpoint: &Endpoint,
    config: &Config,
) -> Result<GrowBuffer> {
    let origin = config.origin.as_deref();
    check_origin(origin)?;

    let deadline = Instant::now() + config.handshake_timeout;
    let request = build_request(endpoint, HANDSHAKE_KEY, origin);

    debug!(endpoint = %endpoint, "sending upgrade request");
    let mut written = 0;
    while written < request.len() {
        match transport.send(&request[written..]) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                wait_until(transport, Interest::WRITABLE, deadline)?
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut head = GrowBuffer::with_capacity(HEAD_READ_CHUNK);
    loop {
        if let Some((response, consumed)) = parse_response(head.data())? {
            if config.verify_accept {
                let accept = response
                    .accept
                    .ok_or(Error::HandshakeFailed("missing Sec-WebSocket-Accept"))?;
                if !validate_accept_key(HANDSHAKE_KEY, accept) {
                    return Err(Error::HandshakeFailed("invalid Sec-WebSocket-Accept"));
                }
            }

            let mut leftover = GrowBuffer::with_capacity(config.read_chunk_size);
            leftover.append(&head.data()[consumed..]);
            debug!(
                status = response.status,
                leftover = leftover.len(),
                "handshake complete"
            );
            return Ok(leftover);
        }

        let spare = head.reserve(HEAD_READ_CHUNK);
        match transport.recv(spare) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => {
                trace!(bytes = n, "read response head");
                head.commit(n);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                wait_until(transport, Interest::READABLE, deadline)?
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn wait_until<T: Transport + ?Sized>(
    transport: &mut T,
    interest: Interest,
    deadline: Instant,
) -> Result<()> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(Error::HandshakeTimeout);
    }
    transport.wait(interest, remaining)?;
    Ok(())
}
