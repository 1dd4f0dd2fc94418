//! Client upgrade request.
//!
//! From [RFC-6455 Section 4.1](https://datatracker.ietf.org/doc/html/rfc6455#section-4.1):
//!
//! Once a connection to the server has been established (including a
//! connection via a proxy or over a TLS-encrypted tunnel), the client
//! MUST send an opening handshake to the server.  The handshake consists
//! of an HTTP Upgrade request, along with a list of required and
//! optional header fields.
//!
//! Example:
//!
//! ```text
//! GET /path HTTP/1.1
//! Host: www.example.com
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Sec-WebSocket-Version: 13
//! ```

use std::fmt::Write as _;

use super::extension;
use super::*;
use crate::error::HandshakeError;
use crate::http::{HttpMessage, StartLine};
use crate::settings::PermessageDeflate;
use crate::stream::ByteStream;

/// What goes into the upgrade request a client sends.
pub struct ClientRequest<'a> {
    pub host: &'a str,
    pub resource: &'a str,
    pub origin: Option<&'a str>,
    pub sec_key: &'a [u8],
    pub deflate: &'a PermessageDeflate,
}

impl ClientRequest<'_> {
    /// Serialize onto the tail of `output`.
    pub fn encode(&self, output: &mut ByteStream) {
        let mut text = String::with_capacity(256);

        let _ = write!(text, "GET {} HTTP/1.1\r\n", self.resource);
        let _ = write!(text, "{}: {}\r\n", HEADER_HOST, self.host);
        let _ = write!(text, "{}: {}\r\n", HEADER_UPGRADE, UPGRADE_VALUE);
        let _ = write!(text, "{}: {}\r\n", HEADER_CONNECTION, CONNECTION_VALUE);
        let _ = write!(
            text,
            "{}: {}\r\n",
            HEADER_SEC_WEBSOCKET_KEY,
            String::from_utf8_lossy(self.sec_key)
        );
        let _ = write!(
            text,
            "{}: {}\r\n",
            HEADER_SEC_WEBSOCKET_VERSION, VERSION_VALUE
        );
        if let Some(origin) = self.origin {
            let _ = write!(text, "{}: {}\r\n", HEADER_ORIGIN, origin);
        }
        if self.deflate.enabled {
            let _ = write!(
                text,
                "{}: {}\r\n",
                HEADER_SEC_WEBSOCKET_EXTENSIONS,
                extension::offer_value(self.deflate)
            );
        }
        text.push_str("\r\n");

        output.push_back_slice(text.as_bytes());
    }
}

/// The server's view of a validated upgrade request.
#[derive(Debug)]
pub struct AcceptedRequest {
    pub resource: String,
    pub sec_key: String,
    /// `None` when the extension stays off for this connection.
    pub deflate: Option<PermessageDeflate>,
}

impl AcceptedRequest {
    /// Validate an inbound upgrade request against the endpoint's
    /// host, origin policy and extension configuration.
    ///
    /// Checks follow RFC 6455 section 4.2.1: the method is GET over
    /// HTTP/1.1, `Upgrade` names websocket, `Connection` carries the
    /// Upgrade token, the version is 13 and the key is present. The
    /// host check only applies when the endpoint pins one.
    pub fn validate(
        message: &HttpMessage,
        host: &str,
        allowed_origin: Option<&str>,
        local: &PermessageDeflate,
    ) -> Result<Self, HandshakeError> {
        let resource = match &message.start {
            StartLine::Request {
                method,
                resource,
                version,
            } => {
                if method != "GET" {
                    return Err(HandshakeError::HttpMethod);
                }
                if *version != 1 {
                    return Err(HandshakeError::HttpVersion);
                }
                resource.clone()
            }
            StartLine::Response { .. } => return Err(HandshakeError::HttpMethod),
        };

        let peer_host = message.header(HEADER_HOST).ok_or(HandshakeError::HttpHost)?;
        if !host.is_empty() && !peer_host.eq_ignore_ascii_case(host) {
            return Err(HandshakeError::HttpHost);
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

        let version = message
            .header(HEADER_SEC_WEBSOCKET_VERSION)
            .ok_or(HandshakeError::SecWebSocketVersion)?;
        if version != VERSION_VALUE {
            return Err(HandshakeError::SecWebSocketVersion);
        }

        let sec_key = message
            .header(HEADER_SEC_WEBSOCKET_KEY)
            .ok_or(HandshakeError::SecWebSocketKey)?;
        if sec_key.is_empty() {
            return Err(HandshakeError::SecWebSocketKey);
        }

        if let Some(allowed) = allowed_origin {
            let origin = message.header(HEADER_ORIGIN).ok_or(HandshakeError::Origin)?;
            if !origin.eq_ignore_ascii_case(allowed) {
                return Err(HandshakeError::Origin);
            }
        }

        let offer = extension::parse_offer(message.headers_named(HEADER_SEC_WEBSOCKET_EXTENSIONS))?;
        let deflate = offer.as_ref().and_then(|o| extension::negotiate(o, local));

        Ok(Self {
            resource,
            sec_key: sec_key.to_owned(),
            deflate,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TEMPLATE: &str = "GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    fn deflate_off() -> PermessageDeflate {
        PermessageDeflate::default()
    }

    #[test]
    fn encode_then_validate() {
        let request = ClientRequest {
            host: "server.example.com",
            resource: "/chat",
            origin: Some("http://example.com"),
            sec_key: b"dGhlIHNhbXBsZSBub25jZQ==",
            deflate: &deflate_off(),
        };
        let mut wire = ByteStream::new();
        request.encode(&mut wire);

        let message = HttpMessage::parse(wire.as_slice()).unwrap();
        let accepted = AcceptedRequest::validate(
            &message,
            "server.example.com",
            Some("http://example.com"),
            &deflate_off(),
        )
        .unwrap();
        assert_eq!(accepted.resource, "/chat");
        assert_eq!(accepted.sec_key, "dGhlIHNhbXBsZSBub25jZQ==");
        assert!(accepted.deflate.is_none());
    }

    #[test]
    fn validate_template() {
        let message = HttpMessage::parse(TEMPLATE.as_bytes()).unwrap();
        let accepted =
            AcceptedRequest::validate(&message, "server.example.com", None, &deflate_off())
                .unwrap();
        assert_eq!(accepted.sec_key, "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn host_check_only_when_pinned() {
        let message = HttpMessage::parse(TEMPLATE.as_bytes()).unwrap();
        assert!(AcceptedRequest::validate(&message, "", None, &deflate_off()).is_ok());
        assert!(matches!(
            AcceptedRequest::validate(&message, "other.example.com", None, &deflate_off()),
            Err(HandshakeError::HttpHost)
        ));
    }

    #[test]
    fn rejects_missing_pieces() {
        for (needle, expected) in [
            ("Upgrade: websocket\r\n", HandshakeError::Upgrade),
            ("Connection: Upgrade\r\n", HandshakeError::Connection),
            (
                "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n",
                HandshakeError::SecWebSocketKey,
            ),
            (
                "Sec-WebSocket-Version: 13\r\n",
                HandshakeError::SecWebSocketVersion,
            ),
        ] {
            let broken = TEMPLATE.replace(needle, "");
            let message = HttpMessage::parse(broken.as_bytes()).unwrap();
            let got = AcceptedRequest::validate(&message, "", None, &deflate_off()).unwrap_err();
            assert_eq!(
                std::mem::discriminant(&got),
                std::mem::discriminant(&expected),
                "{}",
                needle
            );
        }
    }

    #[test]
    fn origin_policy() {
        let with_origin = TEMPLATE.replace(
            "Sec-WebSocket-Version: 13\r\n",
            "Sec-WebSocket-Version: 13\r\nOrigin: http://example.com\r\n",
        );
        let message = HttpMessage::parse(with_origin.as_bytes()).unwrap();

        assert!(
            AcceptedRequest::validate(&message, "", Some("http://example.com"), &deflate_off())
                .is_ok()
        );
        assert!(matches!(
            AcceptedRequest::validate(&message, "", Some("http://evil.com"), &deflate_off()),
            Err(HandshakeError::Origin)
        ));

        // origin required but absent
        let message = HttpMessage::parse(TEMPLATE.as_bytes()).unwrap();
        assert!(matches!(
            AcceptedRequest::validate(&message, "", Some("http://example.com"), &deflate_off()),
            Err(HandshakeError::Origin)
        ));
    }

    #[test]
    fn negotiates_deflate_when_both_sides_allow() {
        let with_ext = TEMPLATE.replace(
            "Sec-WebSocket-Version: 13\r\n",
            "Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Extensions: permessage-deflate; client_max_window_bits=11\r\n",
        );
        let message = HttpMessage::parse(with_ext.as_bytes()).unwrap();

        let local = PermessageDeflate {
            enabled: true,
            window_bits: 15,
        };
        let accepted = AcceptedRequest::validate(&message, "", None, &local).unwrap();
        assert_eq!(
            accepted.deflate,
            Some(PermessageDeflate {
                enabled: true,
                window_bits: 11,
            })
        );

        // locally disabled: the offer is ignored, not an error
        let accepted = AcceptedRequest::validate(&message, "", None, &deflate_off()).unwrap();
        assert!(accepted.deflate.is_none());
    }
}
