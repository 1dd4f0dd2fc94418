//! Utf-8 scanning shared by the stream and the message assembler.
//!
//! Rejects stray continuation bytes, overlong forms, surrogate halves
//! (U+D800..U+DFFF) and codepoints above U+10FFFF.

/// Whether the byte sequence is valid utf-8.
pub fn validate_utf8<I: Iterator<Item = u8>>(mut bytes: I) -> bool {
    loop {
        let first = match bytes.next() {
            None => return true,
            Some(b) => b,
        };
        let (tail, acc, min) = match first {
            0x00..=0x7F => continue,
            0xC2..=0xDF => (1, (first & 0x1F) as u32, 0x80),
            0xE0..=0xEF => (2, (first & 0x0F) as u32, 0x800),
            0xF0..=0xF4 => (3, (first & 0x07) as u32, 0x1_0000),
            // 0x80..=0xC1 covers continuations and overlong 2-byte
            // forms, 0xF5..=0xFF can only encode past U+10FFFF
            _ => return false,
        };
        let mut code = acc;
        for _ in 0..tail {
            let b = match bytes.next() {
                None => return false,
                Some(b) => b,
            };
            if b & 0xC0 != 0x80 {
                return false;
            }
            code = (code << 6) | (b & 0x3F) as u32;
        }
        if code < min || code > 0x10_FFFF || (0xD800..=0xDFFF).contains(&code) {
            return false;
        }
    }
}

/// Copy `bytes` keeping only well-formed sequences. Malformed bytes
/// are dropped one at a time so a later valid sequence survives.
pub(crate) fn repair(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let len = sequence_len(&bytes[i..]);
        if len == 0 {
            i += 1;
            continue;
        }
        out.extend_from_slice(&bytes[i..i + len]);
        i += len;
    }
    out
}

// length of the valid sequence at the head, 0 if malformed
fn sequence_len(bytes: &[u8]) -> usize {
    let first = bytes[0];
    let len = match first {
        0x00..=0x7F => return 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return 0,
    };
    if bytes.len() < len || !validate_utf8(bytes[..len].iter().copied()) {
        return 0;
    }
    len
}

#[cfg(test)]
mod test {
    use super::*;

    fn ok(b: &[u8]) -> bool { validate_utf8(b.iter().copied()) }

    #[test]
    fn accepts_what_str_accepts() {
        for s in ["", "ascii", "höhe", "遥遥领先", "a\u{10FFFF}b"] {
            assert!(ok(s.as_bytes()), "{:?}", s);
        }
    }

    #[test]
    fn agrees_with_std_on_random_bytes() {
        use rand::prelude::*;
        let mut rng = rand::thread_rng();
        for _ in 0..2048 {
            let len = rng.gen_range(0..32);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            assert_eq!(
                ok(&bytes),
                std::str::from_utf8(&bytes).is_ok(),
                "{:02x?}",
                bytes
            );
        }
    }

    #[test]
    fn repair_keeps_valid_tail() {
        assert_eq!(repair(b"\xFFabc"), b"abc");
        assert_eq!(repair(b"a\xE2\x82b"), b"ab");
        assert_eq!(repair("✓".as_bytes()), "✓".as_bytes());
    }
}
