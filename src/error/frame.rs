use std::fmt::{Display, Formatter};

use crate::frame::CloseCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    IllegalOpCode,

    // a control frame with fin clear or payload over 125 bytes
    IllegalControlFrame,

    // rsv bit set outside a negotiated extension
    IllegalRsv,

    // 64-bit payload length with the high bit set
    IllegalLength,

    // unmasked client frame, or masked server frame
    IllegalMask,

    // text or binary while a fragmented message is in flight
    InterleavedMessage,

    // continuation without a message in flight
    StrayContinuation,

    // reassembled text message is not valid utf-8
    IllegalUtf8,

    // compressed message does not inflate with the pinned window
    IllegalDeflate,

    // message grew past the configured limit
    MessageTooBig,

    // close frame payload of one byte, or an out-of-range close code
    IllegalClosePayload,

    NotEnoughData,
}

impl FrameError {
    /// Closure status the peer is told when this error kills the
    /// connection.
    pub const fn close_code(&self) -> CloseCode {
        use FrameError::*;
        match self {
            IllegalUtf8 | IllegalDeflate => CloseCode::INVALID_DATA,
            MessageTooBig => CloseCode::MESSAGE_TOO_BIG,
            _ => CloseCode::PROTOCOL_ERROR,
        }
    }
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use FrameError::*;
        match self {
            IllegalOpCode => write!(f, "Illegal opcode value"),
            IllegalControlFrame => {
                write!(f, "Fragmented or oversized control frame")
            }
            IllegalRsv => write!(f, "Reserved bit set without negotiation"),
            IllegalLength => write!(f, "Illegal payload length"),
            IllegalMask => write!(f, "Mask flag violates role policy"),
            InterleavedMessage => {
                write!(f, "New message started inside a fragmented message")
            }
            StrayContinuation => {
                write!(f, "Continuation frame without a message in flight")
            }
            IllegalUtf8 => write!(f, "Text payload is not valid utf-8"),
            IllegalDeflate => write!(f, "Compressed message failed to inflate"),
            MessageTooBig => write!(f, "Message exceeds the configured limit"),
            IllegalClosePayload => write!(f, "Illegal close frame payload"),
            NotEnoughData => write!(f, "Not enough data to parse"),
        }
    }
}

// use default impl
impl std::error::Error for FrameError {}
