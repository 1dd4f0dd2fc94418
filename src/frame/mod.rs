//! Websocket data frame.
//!
//! [RFC-6455 Section5](https://datatracker.ietf.org/doc/html/rfc6455#section-5)
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! :                     Payload Data continued ...                :
//! + - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - +
//! |                     Payload Data continued ...                |
//! +---------------------------------------------------------------+
//! ```

pub mod close;
pub mod flag;
pub mod length;
pub mod mask;

pub use close::CloseCode;
pub use flag::{Fin, OpCode, Rsv};
pub use length::PayloadLen;
pub use mask::{apply_mask, new_mask_key};

use crate::deflate;
use crate::endian;
use crate::error::{DeflateError, FrameError};
use crate::stream::{validate_utf8, ByteStream};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Websocket frame head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHead {
    pub fin: Fin,
    pub rsv: Rsv,
    pub opcode: OpCode,
    pub mask: Option<u32>,
    pub length: PayloadLen,
}

impl FrameHead {
    /// Parse from the front of `buf`, returning the head and the
    /// count of bytes it occupies. [`FrameError::NotEnoughData`]
    /// means the caller should wait for more input.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        if buf.len() < 2 {
            return Err(FrameError::NotEnoughData);
        }

        let b1 = buf[0];
        let b2 = buf[1];
        let mut n: usize = 2;

        let fin = Fin::from_flag(b1);
        let rsv = Rsv::from_flag(b1);
        let opcode = OpCode::from_flag(b1)?;

        let mut length = PayloadLen::from_flag(b2);
        match length {
            PayloadLen::Standard(_) => {}
            PayloadLen::Extended1(_) => {
                if buf.len() < n + 2 {
                    return Err(FrameError::NotEnoughData);
                }
                length = PayloadLen::from_byte2([buf[n], buf[n + 1]]);
                n += 2;
            }
            PayloadLen::Extended2(_) => {
                if buf.len() < n + 8 {
                    return Err(FrameError::NotEnoughData);
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&buf[n..n + 8]);
                length = PayloadLen::from_byte8(bytes)?;
                n += 8;
            }
        }

        let mask = if b2 & 0x80 != 0 {
            if buf.len() < n + 4 {
                return Err(FrameError::NotEnoughData);
            }
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&buf[n..n + 4]);
            n += 4;
            Some(endian::network_to_host_32(u32::from_ne_bytes(bytes)))
        } else {
            None
        };

        Ok((
            FrameHead {
                fin,
                rsv,
                opcode,
                mask,
                length,
            },
            n,
        ))
    }

    /// Serialize onto the tail of `output`.
    pub fn encode(&self, output: &mut ByteStream) {
        let b1 = self.fin as u8 | self.rsv.to_flag() | self.opcode as u8;
        let mask_flag = if self.mask.is_some() { 0x80 } else { 0x00 };
        let b2 = mask_flag | self.length.to_flag();

        let mut head = Vec::with_capacity(14);
        head.push(b1);
        head.push(b2);
        self.length.extend_bytes(&mut head);
        if let Some(key) = self.mask {
            head.extend_from_slice(&mask::key_bytes(key));
        }
        output.push_back_slice(&head);
    }
}

/// A websocket frame with its payload.
///
/// Users build one with an opcode, push payload into it, and hand it
/// to the endpoint for transmission. The engine builds them out of
/// wire bytes on the inbound path.
#[derive(Debug, Clone)]
pub struct Frame {
    fin: bool,
    rsv: Rsv,
    opcode: OpCode,
    mask: Option<u32>,
    payload: ByteStream,
}

impl Frame {
    /// A final, unmasked, uncompressed frame with an empty payload.
    pub fn new(opcode: OpCode) -> Self {
        Self {
            fin: true,
            rsv: Rsv::default(),
            opcode,
            mask: None,
            payload: ByteStream::new(),
        }
    }

    /// A close frame carrying `code` and an optional reason.
    pub fn close(code: CloseCode, reason: &[u8]) -> Self {
        let mut frame = Self::new(OpCode::Close);
        frame
            .payload
            .push_back_slice(&endian::host_to_network_16(code.0).to_ne_bytes());
        frame.payload.push_back_slice(reason);
        frame
    }

    #[inline]
    pub fn opcode(&self) -> OpCode { self.opcode }

    #[inline]
    pub fn fin(&self) -> bool { self.fin }

    /// Clear fin to start or continue a fragmented message.
    #[inline]
    pub fn set_fin(&mut self, fin: bool) { self.fin = fin }

    #[inline]
    pub fn rsv(&self) -> Rsv { self.rsv }

    #[inline]
    pub fn mask_key(&self) -> Option<u32> { self.mask }

    /// Pin the mask key the payload will be XORed with on encode.
    #[inline]
    pub fn set_mask(&mut self, key: u32) { self.mask = Some(key) }

    #[inline]
    pub fn payload(&self) -> &ByteStream { &self.payload }

    #[inline]
    pub fn payload_len(&self) -> usize { self.payload.len() }

    /// Append payload bytes. Mirrors the stream and never fails
    /// short of allocation failure, hence the plain bool.
    pub fn push(&mut self, data: &[u8]) -> bool {
        self.payload.push_back_slice(data);
        true
    }

    /// Drop the payload, keeping the head fields.
    #[inline]
    pub fn flush(&mut self) { self.payload.flush() }

    /// Move the payload out, leaving the frame empty.
    #[inline]
    pub fn take_payload(&mut self) -> ByteStream { std::mem::take(&mut self.payload) }

    /// Whether the payload is valid utf-8.
    pub fn is_payload_utf8(&self) -> bool { self.payload.is_utf8() }

    /// Compress the payload in place with the negotiated window and
    /// raise rsv1. Call once, on the first frame of a message only.
    pub fn deflate(&mut self, window_bits: u8) -> Result<(), DeflateError> {
        let input = self.payload.to_vec();
        let mut packed = ByteStream::new();
        deflate::deflate(&input, &mut packed, window_bits)?;

        // the wire form drops the sync flush trailer
        debug_assert!(packed.to_vec().ends_with(&deflate::TRAILER));
        let _ = packed.pop_back(deflate::TRAILER.len());

        self.payload = packed;
        self.rsv.rsv1 = true;
        Ok(())
    }

    /// Serialize onto the tail of `output`, masking a copy of the
    /// payload when a key is set.
    pub fn encode(&self, output: &mut ByteStream) {
        let head = FrameHead {
            fin: Fin::from(self.fin),
            rsv: self.rsv,
            opcode: self.opcode,
            mask: self.mask,
            length: PayloadLen::from_num(self.payload.len() as u64),
        };
        head.encode(output);

        let mut payload = self.payload.to_vec();
        if let Some(key) = self.mask {
            apply_mask(key, &mut payload);
        }
        output.push_back_slice(&payload);
    }

    /// Take one complete frame off the front of `input`, unmasking
    /// the payload in place. [`FrameError::NotEnoughData`] leaves the
    /// stream untouched for a later retry.
    pub fn decode(input: &mut ByteStream) -> Result<Frame, FrameError> {
        let (head, head_len) = FrameHead::decode(input.as_slice())?;

        let payload_len = head.length.to_num() as usize;
        if input.len() < head_len + payload_len {
            return Err(FrameError::NotEnoughData);
        }

        // the range is known present, stream errors cannot surface
        let _ = input.pop(head_len);
        let mut payload = input
            .take_front(payload_len)
            .unwrap_or_default();
        if let Some(key) = head.mask {
            apply_mask(key, &mut payload);
        }

        Ok(Frame {
            fin: head.fin.is_final(),
            rsv: head.rsv,
            opcode: head.opcode,
            mask: head.mask,
            payload: ByteStream::from(payload),
        })
    }

    /// Split a close frame payload into its status code and reason.
    ///
    /// An empty payload means no status was supplied (1005 semantics,
    /// echoed as 1000-normal). A single byte, an out-of-range code or
    /// a malformed utf-8 reason is a protocol error.
    pub fn parse_close_payload(&self) -> Result<(CloseCode, Vec<u8>), FrameError> {
        let raw = self.payload.to_vec();
        match raw.len() {
            0 => return Ok((CloseCode::NORMAL, Vec::new())),
            1 => return Err(FrameError::IllegalClosePayload),
            _ => {}
        }
        let code = CloseCode(endian::network_to_host_16(u16::from_ne_bytes([
            raw[0], raw[1],
        ])));
        if !code.is_valid_on_wire() {
            return Err(FrameError::IllegalClosePayload);
        }
        let reason = raw[2..].to_vec();
        if !validate_utf8(reason.iter().copied()) {
            return Err(FrameError::IllegalClosePayload);
        }
        Ok((code, reason))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn head_roundtrip() {
        let heads = [
            FrameHead {
                fin: Fin::Y,
                rsv: Rsv::default(),
                opcode: OpCode::Binary,
                mask: Some(new_mask_key()),
                length: PayloadLen::from_num(4096),
            },
            FrameHead {
                fin: Fin::N,
                rsv: Rsv {
                    rsv1: true,
                    ..Rsv::default()
                },
                opcode: OpCode::Text,
                mask: None,
                length: PayloadLen::from_num(64),
            },
            FrameHead {
                fin: Fin::Y,
                rsv: Rsv::default(),
                opcode: OpCode::Ping,
                mask: Some(0),
                length: PayloadLen::from_num(0),
            },
            FrameHead {
                fin: Fin::Y,
                rsv: Rsv::default(),
                opcode: OpCode::Binary,
                mask: None,
                length: PayloadLen::from_num(100_000),
            },
        ];

        for head in heads {
            let mut buf = ByteStream::new();
            head.encode(&mut buf);

            let encode_n = buf.len();
            let (head2, decode_n) = FrameHead::decode(buf.as_slice()).unwrap();

            assert_eq!(encode_n, decode_n);
            assert_eq!(head, head2);
        }
    }

    #[test]
    fn frame_roundtrip_modulo_mask() {
        let mut frame = Frame::new(OpCode::Binary);
        frame.push(&[0xAA; 300]);
        frame.set_mask(new_mask_key());

        let mut wire = ByteStream::new();
        frame.encode(&mut wire);

        let frame2 = Frame::decode(&mut wire).unwrap();
        assert!(wire.is_empty());
        assert_eq!(frame2.opcode(), OpCode::Binary);
        assert!(frame2.fin());
        assert_eq!(frame2.payload().to_vec(), vec![0xAA; 300]);
    }

    #[test]
    fn decode_is_resumable_at_any_split() {
        let mut frame = Frame::new(OpCode::Text);
        frame.push(b"The quick brown fox jumps over the lazy dog");
        frame.set_mask(0x1234_5678);

        let mut wire = ByteStream::new();
        frame.encode(&mut wire);
        let wire = wire.to_vec();

        for split in 0..wire.len() {
            let mut input = ByteStream::from(&wire[..split]);
            assert_eq!(
                Frame::decode(&mut input).unwrap_err(),
                FrameError::NotEnoughData
            );
            // nothing consumed on a partial feed
            assert_eq!(input.len(), split);

            input.push_back_slice(&wire[split..]);
            let frame2 = Frame::decode(&mut input).unwrap();
            assert_eq!(
                frame2.payload().to_vec(),
                b"The quick brown fox jumps over the lazy dog"
            );
        }
    }

    #[test]
    fn known_client_text_frame() {
        // masked "Hello" from rfc 6455 section 5.7
        let mut input = ByteStream::from(
            &[
                0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
            ][..],
        );
        let frame = Frame::decode(&mut input).unwrap();
        assert_eq!(frame.opcode(), OpCode::Text);
        assert!(frame.fin());
        assert_eq!(frame.mask_key(), Some(0x37fa213d));
        assert_eq!(frame.payload().to_vec(), b"Hello");
    }

    #[test]
    fn zero_mask_writes_zero_key_bytes() {
        let mut frame = Frame::new(OpCode::Text);
        frame.push(b"Hi");
        frame.set_mask(0);

        let mut wire = ByteStream::new();
        frame.encode(&mut wire);
        assert_eq!(
            wire.to_vec(),
            [0x81, 0x82, 0x00, 0x00, 0x00, 0x00, b'H', b'i']
        );
    }

    #[test]
    fn reserved_opcode_rejected() {
        let mut input = ByteStream::from(&[0x83, 0x00][..]);
        assert_eq!(
            Frame::decode(&mut input).unwrap_err(),
            FrameError::IllegalOpCode
        );
    }

    #[test]
    fn close_payload_rules() {
        let ok = Frame::close(CloseCode::NORMAL, b"bye");
        assert_eq!(
            ok.parse_close_payload().unwrap(),
            (CloseCode::NORMAL, b"bye".to_vec())
        );

        let empty = Frame::new(OpCode::Close);
        assert_eq!(
            empty.parse_close_payload().unwrap(),
            (CloseCode::NORMAL, Vec::new())
        );

        let mut one_byte = Frame::new(OpCode::Close);
        one_byte.push(&[0x03]);
        assert_eq!(
            one_byte.parse_close_payload().unwrap_err(),
            FrameError::IllegalClosePayload
        );

        let reserved = Frame::close(CloseCode::ABNORMAL, b"");
        assert_eq!(
            reserved.parse_close_payload().unwrap_err(),
            FrameError::IllegalClosePayload
        );
    }

    #[test]
    fn deflate_strips_trailer_and_sets_rsv1() {
        let payload = b"compress me compress me compress me";
        let mut frame = Frame::new(OpCode::Text);
        frame.push(payload);
        frame.deflate(15).unwrap();
        assert!(frame.rsv().rsv1);
        assert!(!frame.payload().to_vec().ends_with(&deflate::TRAILER));

        // round back through the collaborator with the trailer restored
        let mut packed = frame.payload().to_vec();
        packed.extend_from_slice(&deflate::TRAILER);
        let mut unpacked = ByteStream::new();
        deflate::inflate(&packed, &mut unpacked, 15).unwrap();
        assert_eq!(unpacked.to_vec(), payload);
    }
}
