//! Per-message-deflate negotiation.
//!
//! [RFC-7692 Section 7](https://datatracker.ietf.org/doc/html/rfc7692#section-7)
//!
//! The header lists extensions comma-separated, each with
//! semicolon-separated parameters. Unknown extensions are ignored
//! rather than rejected, per RFC 6455 section 9.1. The engine pins a
//! single window for both directions: the minimum of what the peer
//! offered and what the local side allows, an absent parameter
//! counting as 15.

use crate::deflate::MAX_WINDOW_BITS;
use crate::error::HandshakeError;
use crate::settings::PermessageDeflate;

const TOKEN: &str = "permessage-deflate";
const PARAM_CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";
const PARAM_SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";

/// The peer's permessage-deflate offer, window caps per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeflateOffer {
    pub client_max_window_bits: Option<u8>,
    pub server_max_window_bits: Option<u8>,
}

/// Scan extension header values for a permessage-deflate offer.
///
/// Returns `Ok(None)` when the extension is absent, an error when it
/// is present but malformed.
pub fn parse_offer<'a, I: Iterator<Item = &'a str>>(
    values: I,
) -> Result<Option<DeflateOffer>, HandshakeError> {
    for value in values {
        for ext in value.split(',') {
            let mut params = ext.split(';').map(str::trim);
            match params.next() {
                Some(TOKEN) => {}
                _ => continue,
            }

            let mut offer = DeflateOffer::default();
            for param in params {
                let (name, value) = match param.split_once('=') {
                    Some((n, v)) => (n.trim(), Some(v.trim().trim_matches('"'))),
                    None => (param, None),
                };
                match name {
                    PARAM_CLIENT_MAX_WINDOW_BITS => {
                        offer.client_max_window_bits = parse_window(value)?;
                    }
                    PARAM_SERVER_MAX_WINDOW_BITS => {
                        offer.server_max_window_bits = parse_window(value)?;
                    }
                    // no_context_takeover asks are compatible with the
                    // per-message reset this engine always applies
                    "client_no_context_takeover" | "server_no_context_takeover" => {}
                    _ => return Err(HandshakeError::Extension),
                }
            }
            return Ok(Some(offer));
        }
    }
    Ok(None)
}

// a parameter without a value leaves the peer's cap at the default
fn parse_window(value: Option<&str>) -> Result<Option<u8>, HandshakeError> {
    let value = match value {
        None => return Ok(None),
        Some(v) => v,
    };
    match value.parse::<u8>() {
        Ok(bits) if (9..=15).contains(&bits) => Ok(Some(bits)),
        _ => Err(HandshakeError::Extension),
    }
}

/// Server-side pick: the smallest window everyone tolerates, or
/// `None` when the extension stays off.
pub fn negotiate(offer: &DeflateOffer, local: &PermessageDeflate) -> Option<PermessageDeflate> {
    if !local.enabled {
        return None;
    }
    let peer = offer
        .client_max_window_bits
        .unwrap_or(MAX_WINDOW_BITS)
        .min(offer.server_max_window_bits.unwrap_or(MAX_WINDOW_BITS));
    Some(PermessageDeflate {
        enabled: true,
        window_bits: peer.min(local.window_bits),
    })
}

/// Offer line for the client upgrade request.
pub fn offer_value(local: &PermessageDeflate) -> String {
    format!(
        "{}; {}={}; {}={}",
        TOKEN,
        PARAM_CLIENT_MAX_WINDOW_BITS,
        local.window_bits,
        PARAM_SERVER_MAX_WINDOW_BITS,
        local.window_bits
    )
}

/// Accept line for the server response.
pub fn accept_value(negotiated: &PermessageDeflate) -> String {
    format!(
        "{}; {}={}; {}={}",
        TOKEN,
        PARAM_CLIENT_MAX_WINDOW_BITS,
        negotiated.window_bits,
        PARAM_SERVER_MAX_WINDOW_BITS,
        negotiated.window_bits
    )
}

/// Client-side pin of the server's accept. The server may not grant
/// what was never offered, nor widen the window past the offer.
pub fn parse_accept<'a, I: Iterator<Item = &'a str>>(
    values: I,
    local: &PermessageDeflate,
) -> Result<Option<PermessageDeflate>, HandshakeError> {
    let accepted = match parse_offer(values)? {
        None => return Ok(None),
        Some(a) => a,
    };
    if !local.enabled {
        return Err(HandshakeError::Extension);
    }
    let bits = accepted
        .client_max_window_bits
        .unwrap_or(MAX_WINDOW_BITS)
        .min(accepted.server_max_window_bits.unwrap_or(MAX_WINDOW_BITS));
    if bits > local.window_bits {
        return Err(HandshakeError::Extension);
    }
    Ok(Some(PermessageDeflate {
        enabled: true,
        window_bits: bits,
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    fn local(enabled: bool, window_bits: u8) -> PermessageDeflate {
        PermessageDeflate {
            enabled,
            window_bits,
        }
    }

    #[test]
    fn offer_with_values() {
        let offer = parse_offer(
            ["permessage-deflate; client_max_window_bits=12; server_max_window_bits=10"]
                .into_iter(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(offer.client_max_window_bits, Some(12));
        assert_eq!(offer.server_max_window_bits, Some(10));
    }

    #[test]
    fn offer_bare_parameter_means_default() {
        let offer = parse_offer(["permessage-deflate; client_max_window_bits"].into_iter())
            .unwrap()
            .unwrap();
        assert_eq!(offer.client_max_window_bits, None);
        assert_eq!(negotiate(&offer, &local(true, 15)).unwrap().window_bits, 15);
    }

    #[test]
    fn unknown_extensions_are_skipped() {
        let offer = parse_offer(
            ["x-webkit-frobnicate, permessage-deflate; server_max_window_bits=11"].into_iter(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(offer.server_max_window_bits, Some(11));

        assert_eq!(
            parse_offer(["x-webkit-frobnicate; level=9"].into_iter()).unwrap(),
            None
        );
    }

    #[test]
    fn negotiation_takes_the_minimum() {
        let offer = DeflateOffer {
            client_max_window_bits: Some(12),
            server_max_window_bits: None,
        };
        assert_eq!(negotiate(&offer, &local(true, 15)).unwrap().window_bits, 12);
        assert_eq!(negotiate(&offer, &local(true, 10)).unwrap().window_bits, 10);
        assert_eq!(negotiate(&offer, &local(false, 15)), None);
    }

    #[test]
    fn bad_window_values() {
        for v in [
            "permessage-deflate; client_max_window_bits=8",
            "permessage-deflate; client_max_window_bits=16",
            "permessage-deflate; client_max_window_bits=abc",
            "permessage-deflate; frobnicate=1",
        ] {
            assert!(parse_offer([v].into_iter()).is_err(), "{}", v);
        }
    }

    #[test]
    fn accept_cannot_exceed_the_offer() {
        let granted = parse_accept(
            ["permessage-deflate; client_max_window_bits=11; server_max_window_bits=11"]
                .into_iter(),
            &local(true, 12),
        )
        .unwrap()
        .unwrap();
        assert_eq!(granted.window_bits, 11);

        // server grants deflate although it was never offered
        assert!(parse_accept(["permessage-deflate"].into_iter(), &local(false, 15)).is_err());

        // server widens the window past the offer
        assert!(parse_accept(
            ["permessage-deflate; server_max_window_bits=15"].into_iter(),
            &local(true, 10),
        )
        .is_err());
    }
}
