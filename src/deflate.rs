//! Deflate codec for per-message compression.
//!
//! [RFC-7692](https://datatracker.ietf.org/doc/html/rfc7692)
//!
//! Pure compress/decompress over byte buffers with a configured
//! window; no stream context survives between calls. The sync-flush
//! trailer `00 00 FF FF` stays in the output here, the frame layer
//! owns stripping and re-appending it.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::DeflateError;
use crate::stream::ByteStream;

/// The sync flush trailer every deflate block ends with on the wire.
pub const TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Smallest window the extension may negotiate.
pub const MIN_WINDOW_BITS: u8 = 9;

/// Largest window, also the value an absent parameter implies.
pub const MAX_WINDOW_BITS: u8 = 15;

fn check_window(window_bits: u8) -> Result<(), DeflateError> {
    if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
        return Err(DeflateError::IllegalWindowBits);
    }
    Ok(())
}

/// Compress `input` onto the tail of `output` as a raw deflate
/// stream finished with a sync flush.
pub fn deflate(
    input: &[u8],
    output: &mut ByteStream,
    window_bits: u8,
) -> Result<(), DeflateError> {
    check_window(window_bits)?;

    let mut codec = Compress::new_with_window_bits(Compression::default(), false, window_bits);
    let mut buf: Vec<u8> = Vec::with_capacity(input.len() / 2 + 64);

    loop {
        if buf.len() == buf.capacity() {
            buf.reserve(buf.capacity().max(64));
        }
        let consumed = codec.total_in() as usize;
        codec
            .compress_vec(&input[consumed..], &mut buf, FlushCompress::Sync)
            .map_err(|_| DeflateError::Compress)?;

        // the flush is complete once all input is consumed and the
        // codec stopped short of filling the output
        if codec.total_in() as usize == input.len() && buf.len() < buf.capacity() {
            break;
        }
    }

    output.push_back_slice(&buf);
    Ok(())
}

/// Decompress the raw deflate stream `input` onto the tail of
/// `output`. The caller appends the trailer beforehand.
pub fn inflate(
    input: &[u8],
    output: &mut ByteStream,
    window_bits: u8,
) -> Result<(), DeflateError> {
    check_window(window_bits)?;

    let mut codec = Decompress::new_with_window_bits(false, window_bits);
    let mut buf: Vec<u8> = Vec::with_capacity(input.len().saturating_mul(2).max(64));

    loop {
        if buf.len() == buf.capacity() {
            buf.reserve(buf.capacity().max(64));
        }
        let consumed = codec.total_in() as usize;
        let status = codec
            .decompress_vec(&input[consumed..], &mut buf, FlushDecompress::None)
            .map_err(|_| DeflateError::Decompress)?;

        if matches!(status, Status::StreamEnd) {
            break;
        }
        if codec.total_in() as usize == input.len() && buf.len() < buf.capacity() {
            break;
        }
    }

    output.push_back_slice(&buf);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(payload: &[u8], window_bits: u8) {
        let mut packed = ByteStream::new();
        deflate(payload, &mut packed, window_bits).unwrap();
        let packed = packed.to_vec();
        assert!(packed.ends_with(&TRAILER));

        let mut unpacked = ByteStream::new();
        inflate(&packed, &mut unpacked, window_bits).unwrap();
        assert_eq!(unpacked.to_vec(), payload);
    }

    #[test]
    fn roundtrip_all_windows() {
        let payload: Vec<u8> = (0..4096u32).flat_map(|v| v.to_le_bytes()).collect();
        for bits in MIN_WINDOW_BITS..=MAX_WINDOW_BITS {
            roundtrip(&payload, bits);
        }
    }

    #[test]
    fn roundtrip_small_and_empty() {
        roundtrip(b"", 15);
        roundtrip(b"x", 9);
        roundtrip(b"Hello", 15);
    }

    #[test]
    fn window_bits_bounds() {
        let mut out = ByteStream::new();
        assert_eq!(
            deflate(b"x", &mut out, 8),
            Err(DeflateError::IllegalWindowBits)
        );
        assert_eq!(
            inflate(b"x", &mut out, 16),
            Err(DeflateError::IllegalWindowBits)
        );
    }

    #[test]
    fn garbage_does_not_roundtrip() {
        let mut out = ByteStream::new();
        assert_eq!(
            inflate(&[0xde, 0xad, 0xbe, 0xef, 0x00], &mut out, 15),
            Err(DeflateError::Decompress)
        );
    }
}
