//! Key exchange.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use super::GUID;

/// Generate a new `sec-websocket-key`: sixteen random bytes, base64.
///
/// Always lands on 24 ascii characters, so the fixed-size buffer
/// cannot come up short.
pub fn new_sec_key() -> [u8; 24] {
    let nonce: [u8; 16] = rand::random();
    let mut key = [0_u8; 24];
    let n = Engine::encode_slice(&STANDARD, nonce, &mut key).unwrap();
    debug_assert_eq!(n, key.len());
    key
}

/// Derive `sec-websocket-accept` from `sec-websocket-key`:
/// `base64(sha1(key || guid))`.
pub fn derive_accept_key(sec_key: &[u8]) -> [u8; 28] {
    let digest = Sha1::new().chain_update(sec_key).chain_update(GUID).finalize();
    let mut accept = [0_u8; 28];
    let n = Engine::encode_slice(&STANDARD, digest, &mut accept).unwrap();
    debug_assert_eq!(n, accept.len());
    accept
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generate_sec_key() {
        for _ in 0..=1024 {
            // should not panic, and stays 24 ascii chars
            let key = new_sec_key();
            assert!(key.iter().all(u8::is_ascii));
        }
    }

    #[test]
    fn derive_sec_key() {
        assert_eq!(
            &derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            b"s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
