//! WebSocket frame parsing and serialization
//!
//! This module implements RFC 6455 base framing:
//! - Header encoding with 7/16/64-bit payload lengths
//! - Peek-then-commit decoding straight out of the inbound buffer
//! - In-place unmasking of complete frames only

use std::ops::Range;

use bytes::{Buf, BufMut};

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::simd::apply_mask;
use crate::{MAX_FRAME_HEADER_SIZE, MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD};

/// The fixed close frame: FIN + CLOSE, mask bit set, empty payload, zero key
pub const CLOSE_FRAME: [u8; 6] = [0x88, 0x80, 0x00, 0x00, 0x00, 0x00];

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Connection close
    Close = 0x8,
    /// Ping
    Ping = 0x9,
    /// Pong
    Pong = 0xA,
}

impl OpCode {
    /// Parse opcode from the low nibble of the first header byte
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        (*self as u8) >= 0x8
    }

    /// Check if this is a data frame
    #[inline]
    pub fn is_data(&self) -> bool {
        (*self as u8) <= 0x2
    }
}

/// A parsed WebSocket frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag
    pub fin: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Mask flag
    pub masked: bool,
    /// Payload length
    pub payload_len: u64,
    /// Masking key, present iff `masked`
    pub mask: Option<[u8; 4]>,
    /// Bytes occupied by the header on the wire (2 to 14)
    pub header_size: usize,
}

impl FrameHeader {
    /// Build the header for an outbound final frame
    pub fn new(opcode: OpCode, payload_len: u64, mask: Option<[u8; 4]>) -> Self {
        Self {
            fin: true,
            opcode,
            masked: mask.is_some(),
            payload_len,
            mask,
            header_size: Self::encoded_size(payload_len, mask.is_some()),
        }
    }

    /// Header size needed to encode a payload of `payload_len` bytes
    #[inline]
    pub fn encoded_size(payload_len: u64, masked: bool) -> usize {
        let ext = if payload_len > MEDIUM_MESSAGE_THRESHOLD as u64 {
            8
        } else if payload_len > SMALL_MESSAGE_THRESHOLD as u64 {
            2
        } else {
            0
        };
        2 + ext + if masked { 4 } else { 0 }
    }

    /// Header size implied by the second header byte alone
    #[inline]
    pub fn size_from_second_byte(b1: u8) -> usize {
        let ext = match b1 & 0x7F {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        2 + ext + if b1 & 0x80 != 0 { 4 } else { 0 }
    }

    /// Total bytes of header plus payload
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.header_size + self.payload_len as usize
    }

    /// Location of the payload relative to the start of the frame
    #[inline]
    pub fn payload_range(&self) -> Range<usize> {
        self.header_size..self.frame_len()
    }

    /// Serialize the header, returning the number of bytes written
    pub fn encode(&self, out: &mut [u8; MAX_FRAME_HEADER_SIZE]) -> usize {
        let mut cursor = &mut out[..];

        let mut b0 = self.opcode as u8;
        if self.fin {
            b0 |= 0x80;
        }
        cursor.put_u8(b0);

        let mask_bit = if self.masked { 0x80 } else { 0x00 };

        if self.payload_len <= SMALL_MESSAGE_THRESHOLD as u64 {
            cursor.put_u8(mask_bit | self.payload_len as u8);
        } else if self.payload_len <= MEDIUM_MESSAGE_THRESHOLD as u64 {
            cursor.put_u8(mask_bit | 126);
            cursor.put_u16(self.payload_len as u16);
        } else {
            cursor.put_u8(mask_bit | 127);
            cursor.put_u64(self.payload_len);
        }

        if let Some(mask) = self.mask {
            cursor.put_slice(&mask);
        }

        MAX_FRAME_HEADER_SIZE - cursor.len()
    }
}

/// Frame decoder working on the head of an inbound byte queue.
///
/// Nothing is consumed: the caller removes [`FrameHeader::frame_len`] bytes
/// once it is done with the frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_size: u64,
}

impl FrameDecoder {
    /// Create a decoder rejecting payloads above `max_frame_size`
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size as u64,
        }
    }

    /// Parse the header at the front of `buf`
    ///
    /// Returns:
    /// - Ok(Some(header)) once the whole header is buffered
    /// - Ok(None) if more data is needed
    /// - Err(e) for a reserved opcode or an oversized payload
    pub fn parse_header(&self, buf: &[u8]) -> Result<Option<FrameHeader>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let b0 = buf[0];
        let b1 = buf[1];

        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::from_u8(b0 & 0x0F).ok_or(Error::InvalidOpcode(b0 & 0x0F))?;
        let masked = b1 & 0x80 != 0;
        let header_size = FrameHeader::size_from_second_byte(b1);

        if buf.len() < header_size {
            return Ok(None);
        }

        let mut cursor = &buf[2..header_size];
        let payload_len = match b1 & 0x7F {
            126 => cursor.get_u16() as u64,
            127 => cursor.get_u64(),
            n => n as u64,
        };

        if payload_len > self.max_frame_size
            || usize::try_from(payload_len)
                .ok()
                .and_then(|len| len.checked_add(header_size))
                .is_none()
        {
            return Err(Error::FrameTooLarge(payload_len));
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            cursor.copy_to_slice(&mut key);
            Some(key)
        } else {
            None
        };

        Ok(Some(FrameHeader {
            fin,
            opcode,
            masked,
            payload_len,
            mask,
            header_size,
        }))
    }

    /// Decode one complete frame from the front of `buf`
    ///
    /// When the whole frame is buffered its payload is unmasked in place and
    /// the header is returned; the payload lives at
    /// `buf[header.payload_range()]`. Partial frames are left untouched.
    pub fn decode(&self, buf: &mut [u8]) -> Result<Option<FrameHeader>> {
        let Some(header) = self.parse_header(buf)? else {
            return Ok(None);
        };

        if buf.len() < header.frame_len() {
            return Ok(None);
        }

        if let Some(mask) = header.mask {
            apply_mask(&mut buf[header.payload_range()], mask);
        }

        Ok(Some(header))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

/// Encode a final frame into `buf`
///
/// With a mask the payload is copied and masked in the buffer; the caller's
/// slice is never modified.
pub fn encode_frame<B: ByteBuffer + ?Sized>(
    buf: &mut B,
    opcode: OpCode,
    payload: &[u8],
    mask: Option<[u8; 4]>,
) {
    let header = FrameHeader::new(opcode, payload.len() as u64, mask);
    let mut raw = [0u8; MAX_FRAME_HEADER_SIZE];
    let written = header.encode(&mut raw);
    debug_assert_eq!(written, header.header_size);

    buf.append(&raw[..written]);
    let start = buf.len();
    buf.append(payload);

    if let Some(mask) = mask {
        apply_mask(&mut buf.data_mut()[start..], mask);
    }
}

/// Queue the fixed 6-byte close frame
#[inline]
pub fn encode_close_frame<B: ByteBuffer + ?Sized>(buf: &mut B) {
    buf.append(&CLOSE_FRAME);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::GrowBuffer;
    use proptest::prelude::*;

    const OPCODES: [OpCode; 6] = [
        OpCode::Continuation,
        OpCode::Text,
        OpCode::Binary,
        OpCode::Close,
        OpCode::Ping,
        OpCode::Pong,
    ];

    const LENGTHS: [usize; 7] = [0, 1, 125, 126, 127, 65535, 65536];

    #[test]
    fn test_opcode() {
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(OpCode::Close.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(OpCode::Text.is_data());
        assert!(OpCode::Binary.is_data());
        assert!(OpCode::Continuation.is_data());
        assert_eq!(OpCode::from_u8(0x3), None);
        assert_eq!(OpCode::from_u8(0xB), None);
    }

    #[test]
    fn test_parse_small_unmasked() {
        let decoder = FrameDecoder::default();
        let mut buf = [0x81, 0x05, b'h', b'e', b'l', b'l', b'o'];

        let header = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(header.fin);
        assert_eq!(header.opcode, OpCode::Text);
        assert_eq!(header.header_size, 2);
        assert_eq!(&buf[header.payload_range()], b"hello");
    }

    #[test]
    fn test_parse_small_masked() {
        let decoder = FrameDecoder::default();
        let mask = [0x37, 0xfa, 0x21, 0x3d];

        let mut payload = *b"Hello";
        apply_mask(&mut payload, mask);

        let mut buf = vec![0x81, 0x85];
        buf.extend_from_slice(&mask);
        buf.extend_from_slice(&payload);

        let header = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.mask, Some(mask));
        assert_eq!(header.header_size, 6);
        assert_eq!(&buf[header.payload_range()], b"Hello");
    }

    #[test]
    fn test_parse_medium_length() {
        let decoder = FrameDecoder::default();
        let mut buf = vec![0x82, 126, 0x00, 200];
        buf.extend_from_slice(&[0x42; 200]);

        let header = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.opcode, OpCode::Binary);
        assert_eq!(header.payload_len, 200);
        assert_eq!(header.frame_len(), buf.len());
    }

    #[test]
    fn test_encode_frame() {
        let mut buf = GrowBuffer::new();
        encode_frame(&mut buf, OpCode::Text, b"hello", None);
        assert_eq!(buf.data(), b"\x81\x05hello");
    }

    #[test]
    fn test_encode_frame_masked() {
        let mask = [0x01, 0x02, 0x03, 0x04];
        let mut buf = GrowBuffer::new();
        encode_frame(&mut buf, OpCode::Text, b"test", Some(mask));

        let data = buf.data();
        assert_eq!(data[0], 0x81);
        assert_eq!(data[1], 0x84);
        assert_eq!(&data[2..6], &mask);

        let mut payload = data[6..].to_vec();
        apply_mask(&mut payload, mask);
        assert_eq!(&payload, b"test");
    }

    #[test]
    fn test_close_frame_bytes() {
        let mut buf = GrowBuffer::new();
        encode_close_frame(&mut buf);
        assert_eq!(buf.data(), &CLOSE_FRAME);

        let header = FrameDecoder::default()
            .decode(buf.data_mut())
            .unwrap()
            .unwrap();
        assert_eq!(header.opcode, OpCode::Close);
        assert!(header.masked);
        assert_eq!(header.payload_len, 0);
        assert_eq!(header.frame_len(), 6);
    }

    #[test]
    fn test_round_trip_all_opcodes_and_tiers() {
        let decoder = FrameDecoder::default();
        for opcode in OPCODES {
            for len in LENGTHS {
                for mask in [None, Some([0x9a, 0x0b, 0xc7, 0x11])] {
                    let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
                    let mut buf = GrowBuffer::new();
                    encode_frame(&mut buf, opcode, &payload, mask);

                    let header = decoder.decode(buf.data_mut()).unwrap().unwrap();
                    assert!(header.fin);
                    assert_eq!(header.opcode, opcode);
                    assert_eq!(header.mask, mask);
                    assert_eq!(header.frame_len(), buf.len());
                    assert_eq!(&buf.data()[header.payload_range()], &payload[..]);
                }
            }
        }
    }

    #[test]
    fn test_header_size_per_tier() {
        // (payload length, expected header size without mask)
        let tiers = [(125usize, 2usize), (126, 4), (65535, 4), (65536, 10)];

        for (len, unmasked) in tiers {
            for masked in [false, true] {
                let mask = masked.then_some([1, 2, 3, 4]);
                let mut buf = GrowBuffer::new();
                encode_frame(&mut buf, OpCode::Binary, &vec![0u8; len], mask);

                let expected = unmasked + if masked { 4 } else { 0 };
                assert_eq!(FrameHeader::size_from_second_byte(buf.data()[1]), expected);
                assert_eq!(buf.len() - len, expected);
            }
        }
    }

    #[test]
    fn test_extended_length_bytes_are_big_endian() {
        let mut buf = GrowBuffer::new();
        encode_frame(&mut buf, OpCode::Binary, &[0u8; 300], None);
        assert_eq!(&buf.data()[..4], &[0x82, 126, 0x01, 0x2C]);

        let mut buf = GrowBuffer::new();
        encode_frame(&mut buf, OpCode::Binary, &vec![0u8; 65536], None);
        assert_eq!(
            &buf.data()[..10],
            &[0x82, 127, 0, 0, 0, 0, 0, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_partial_input_one_byte_at_a_time() {
        let decoder = FrameDecoder::default();
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let payload: Vec<u8> = (0..300).map(|i| i as u8).collect();

        let mut wire = GrowBuffer::new();
        encode_frame(&mut wire, OpCode::Binary, &payload, Some(mask));
        let wire = wire.data().to_vec();

        let mut inbound = GrowBuffer::new();
        for (i, &byte) in wire.iter().enumerate() {
            inbound.append(&[byte]);
            let decoded = decoder.decode(inbound.data_mut()).unwrap();
            if i + 1 < wire.len() {
                assert!(decoded.is_none(), "decoded early at byte {}", i);
                // Nothing may be unmasked before the frame is complete
                assert_eq!(inbound.data(), &wire[..=i]);
            } else {
                let header = decoded.unwrap();
                assert_eq!(header.frame_len(), wire.len());
                assert_eq!(&inbound.data()[header.payload_range()], &payload[..]);
            }
        }
    }

    #[test]
    fn test_back_to_back_frames() {
        let decoder = FrameDecoder::default();
        let mut inbound = GrowBuffer::new();
        encode_frame(&mut inbound, OpCode::Text, b"one", None);
        encode_frame(&mut inbound, OpCode::Binary, b"two", Some([5, 6, 7, 8]));
        inbound.append(&[0x81]);

        let first = decoder.decode(inbound.data_mut()).unwrap().unwrap();
        assert_eq!(&inbound.data()[first.payload_range()], b"one");
        inbound.consume_front(first.frame_len());

        let second = decoder.decode(inbound.data_mut()).unwrap().unwrap();
        assert_eq!(second.opcode, OpCode::Binary);
        assert_eq!(&inbound.data()[second.payload_range()], b"two");
        inbound.consume_front(second.frame_len());

        assert!(decoder.decode(inbound.data_mut()).unwrap().is_none());
        assert_eq!(inbound.data(), &[0x81]);
    }

    #[test]
    fn test_reserved_opcode_rejected() {
        let decoder = FrameDecoder::default();
        let mut buf = [0x83, 0x00];
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(Error::InvalidOpcode(0x3))
        ));
    }

    #[test]
    fn test_frame_too_large_rejected_from_header() {
        let decoder = FrameDecoder::new(1024);
        // Only the header is present; the cap applies before the payload arrives
        let mut buf = [0x82, 127, 0, 0, 0, 0, 0, 0x10, 0, 0];
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(Error::FrameTooLarge(0x100000))
        ));
    }

    proptest! {
        #[test]
        fn decode_waits_for_complete_frame(
            opcode in proptest::sample::select(OPCODES.to_vec()),
            payload in proptest::collection::vec(any::<u8>(), 0..600),
            mask in proptest::option::of(any::<[u8; 4]>()),
            split in any::<proptest::sample::Index>(),
        ) {
            let decoder = FrameDecoder::default();
            let mut wire = GrowBuffer::new();
            encode_frame(&mut wire, opcode, &payload, mask);
            let wire = wire.data().to_vec();

            let cut = split.index(wire.len());
            let mut prefix = wire[..cut].to_vec();
            prop_assert!(decoder.decode(&mut prefix).unwrap().is_none());
            prop_assert_eq!(&prefix[..], &wire[..cut]);

            let mut full = wire.clone();
            let header = decoder.decode(&mut full).unwrap().unwrap();
            prop_assert_eq!(header.opcode, opcode);
            prop_assert_eq!(header.frame_len(), wire.len());
            prop_assert_eq!(&full[header.payload_range()], &payload[..]);
        }
    }

    #[test]
    fn test_unfinished_frame_keeps_fin_clear() {
        let decoder = FrameDecoder::default();
        let mut buf = [0x01, 0x02, b'h', b'i'];
        let header = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(!header.fin);
        assert_eq!(header.opcode, OpCode::Text);
    }
}
