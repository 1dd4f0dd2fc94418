//! Server handshake response.
//!
//! From [RFC-6455 Section 4.2](https://datatracker.ietf.org/doc/html/rfc6455#section-4.2):
//!
//! If the server chooses to accept the incoming connection, it MUST
//! reply with a valid HTTP response.
//!
//! Example:
//!
//! ```text
//! HTTP/1.1 101 Switching Protocols
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```

use std::fmt::Write as _;

use super::extension;
use super::*;
use crate::error::HandshakeError;
use crate::http::{HttpMessage, StartLine};
use crate::settings::PermessageDeflate;
use crate::stream::ByteStream;

/// What goes into the 101 a server answers a valid upgrade with.
pub struct ServerResponse<'a> {
    pub sec_accept: &'a [u8],
    /// Window pinned by negotiation, absent when the extension is
    /// off for this connection.
    pub deflate: Option<&'a PermessageDeflate>,
}

impl ServerResponse<'_> {
    /// Serialize onto the tail of `output`.
    pub fn encode(&self, output: &mut ByteStream) {
        let mut text = String::with_capacity(192);

        text.push_str("HTTP/1.1 101 Switching Protocols\r\n");
        let _ = write!(text, "{}: {}\r\n", HEADER_UPGRADE, UPGRADE_VALUE);
        let _ = write!(text, "{}: {}\r\n", HEADER_CONNECTION, CONNECTION_VALUE);
        let _ = write!(
            text,
            "{}: {}\r\n",
            HEADER_SEC_WEBSOCKET_ACCEPT,
            String::from_utf8_lossy(self.sec_accept)
        );
        if let Some(negotiated) = self.deflate {
            let _ = write!(
                text,
                "{}: {}\r\n",
                HEADER_SEC_WEBSOCKET_EXTENSIONS,
                extension::accept_value(negotiated)
            );
        }
        text.push_str("\r\n");

        output.push_back_slice(text.as_bytes());
    }

    /// Client-side validation of the server's answer: status 101,
    /// upgrade headers intact, the accept key matching what was
    /// derived from the request key, and the extension grant within
    /// what was offered. Returns the pinned extension state.
    pub fn validate(
        message: &HttpMessage,
        expected_accept: &[u8],
        local: &PermessageDeflate,
    ) -> Result<Option<PermessageDeflate>, HandshakeError> {
        match &message.start {
            StartLine::Response {
                version,
                status_code,
                ..
            } => {
                if *version != 1 {
                    return Err(HandshakeError::HttpVersion);
                }
                if *status_code != 101 {
                    return Err(HandshakeError::HttpStatusCode);
                }
            }
            StartLine::Request { .. } => return Err(HandshakeError::HttpStatusCode),
        }

        let upgrade = message
            .header(HEADER_UPGRADE)
            .ok_or(HandshakeError::Upgrade)?;
        if !upgrade.eq_ignore_ascii_case(UPGRADE_VALUE) {
            return Err(HandshakeError::Upgrade);
        }

        if !message.header_has_token(HEADER_CONNECTION, CONNECTION_VALUE) {
            return Err(HandshakeError::Connection);
        }

        let accept = message
            .header(HEADER_SEC_WEBSOCKET_ACCEPT)
            .ok_or(HandshakeError::SecWebSocketAccept)?;
        if accept.as_bytes() != expected_accept {
            return Err(HandshakeError::SecWebSocketAccept);
        }

        extension::parse_accept(message.headers_named(HEADER_SEC_WEBSOCKET_EXTENSIONS), local)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handshake::derive_accept_key;

    const ACCEPT: &[u8] = b"s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    fn deflate_off() -> PermessageDeflate {
        PermessageDeflate::default()
    }

    #[test]
    fn encode_matches_the_rfc_sample() {
        let response = ServerResponse {
            sec_accept: &derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            deflate: None,
        };
        let mut wire = ByteStream::new();
        response.encode(&mut wire);

        let text = String::from_utf8(wire.to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn validate_accepts_the_expected_key() {
        let response = ServerResponse {
            sec_accept: ACCEPT,
            deflate: None,
        };
        let mut wire = ByteStream::new();
        response.encode(&mut wire);

        let message = HttpMessage::parse(wire.as_slice()).unwrap();
        let pinned = ServerResponse::validate(&message, ACCEPT, &deflate_off()).unwrap();
        assert!(pinned.is_none());
    }

    #[test]
    fn validate_rejects_key_mismatch() {
        let response = ServerResponse {
            sec_accept: b"bogus-accept-value-aaaaaaaa=",
            deflate: None,
        };
        let mut wire = ByteStream::new();
        response.encode(&mut wire);

        let message = HttpMessage::parse(wire.as_slice()).unwrap();
        assert!(matches!(
            ServerResponse::validate(&message, ACCEPT, &deflate_off()),
            Err(HandshakeError::SecWebSocketAccept)
        ));
    }

    #[test]
    fn validate_rejects_wrong_status() {
        let message = HttpMessage::parse(
            b"HTTP/1.1 200 OK\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
        )
        .unwrap();
        assert!(matches!(
            ServerResponse::validate(&message, ACCEPT, &deflate_off()),
            Err(HandshakeError::HttpStatusCode)
        ));
    }

    #[test]
    fn grant_is_pinned() {
        let local = PermessageDeflate {
            enabled: true,
            window_bits: 13,
        };
        let granted = PermessageDeflate {
            enabled: true,
            window_bits: 11,
        };
        let response = ServerResponse {
            sec_accept: ACCEPT,
            deflate: Some(&granted),
        };
        let mut wire = ByteStream::new();
        response.encode(&mut wire);

        let message = HttpMessage::parse(wire.as_slice()).unwrap();
        let pinned = ServerResponse::validate(&message, ACCEPT, &local)
            .unwrap()
            .unwrap();
        assert_eq!(pinned, granted);
    }
}
