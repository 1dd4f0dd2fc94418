//! Closure status codes.
//!
//! [RFC-6455 Section 7.4](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4)

use std::fmt::{Display, Formatter};

/// Two-byte status code opening a close frame payload.
///
/// Codes 3000..=4999 are application-defined and pass through
/// unnamed; the named constants cover the protocol-defined table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// 1000, the purpose of the connection has been fulfilled.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// 1001, endpoint going away.
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// 1002, terminating due to a protocol error.
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    /// 1003, received a data type it cannot accept.
    pub const UNSUPPORTED_DATA: CloseCode = CloseCode(1003);
    /// 1005, reserved: no status code was present.
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// 1006, reserved: closed without a close frame exchange.
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    /// 1007, payload inconsistent with the message type.
    pub const INVALID_DATA: CloseCode = CloseCode(1007);
    /// 1008, policy violation.
    pub const POLICY_VIOLATION: CloseCode = CloseCode(1008);
    /// 1009, message too big to process.
    pub const MESSAGE_TOO_BIG: CloseCode = CloseCode(1009);
    /// 1010, client is missing a required extension.
    pub const MISSING_EXTENSION: CloseCode = CloseCode(1010);
    /// 1011, unexpected condition on the server.
    pub const INTERNAL_ERROR: CloseCode = CloseCode(1011);
    /// 1015, reserved: tls handshake failed.
    pub const TLS_HANDSHAKE_FAILED: CloseCode = CloseCode(1015);

    /// Whether the code may travel in a close frame. The reserved
    /// codes (1004..=1006, 1015) and everything below 1000 may not.
    #[inline]
    pub const fn is_valid_on_wire(self) -> bool {
        matches!(self.0, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self { CloseCode(code) }
}

impl Display for CloseCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            CloseCode::NORMAL => "normal",
            CloseCode::GOING_AWAY => "going away",
            CloseCode::PROTOCOL_ERROR => "protocol error",
            CloseCode::UNSUPPORTED_DATA => "unsupported data",
            CloseCode::NO_STATUS => "no status received",
            CloseCode::ABNORMAL => "abnormal",
            CloseCode::INVALID_DATA => "invalid payload data",
            CloseCode::POLICY_VIOLATION => "policy violation",
            CloseCode::MESSAGE_TOO_BIG => "message too big",
            CloseCode::MISSING_EXTENSION => "missing extension",
            CloseCode::INTERNAL_ERROR => "internal error",
            CloseCode::TLS_HANDSHAKE_FAILED => "tls handshake failed",
            CloseCode(_) => "unnamed",
        };
        write!(f, "{} ({})", self.0, name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_validity() {
        for code in [1000, 1001, 1002, 1003, 1007, 1011, 3000, 4999] {
            assert!(CloseCode(code).is_valid_on_wire(), "{}", code);
        }
        for code in [0, 999, 1004, 1005, 1006, 1012, 1015, 2999, 5000] {
            assert!(!CloseCode(code).is_valid_on_wire(), "{}", code);
        }
    }
}
