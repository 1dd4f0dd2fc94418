#![allow(missing_docs)]
//! Errors

mod deflate;
mod frame;
mod handshake;
mod http;
mod stream;

pub use deflate::DeflateError;
pub use frame::FrameError;
pub use handshake::HandshakeError;
pub use http::HttpError;
pub use stream::StreamError;

use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum Error {
    Stream(StreamError),

    Http(HttpError),

    Handshake(HandshakeError),

    Frame(FrameError),

    Deflate(DeflateError),

    Io(std::io::Error),

    /// The endpoint has no connection under the given fd.
    UnknownFd(i32),

    /// The operation is not allowed in the connection's current state.
    NotOpen,

    /// A client frame left unmasked while automatic masking is disabled,
    /// or a server frame carrying a mask key.
    MaskPolicy,

    /// A frame requests an extension that was not negotiated.
    ExtensionNotNegotiated,

    /// The endpoint is configured for TLS but no transport factory
    /// has been installed.
    NoSecureTransport,
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self { Error::Stream(e) }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self { Error::Http(e) }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self { Error::Handshake(e) }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self { Error::Frame(e) }
}

impl From<DeflateError> for Error {
    fn from(e: DeflateError) -> Self { Error::Deflate(e) }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error { Error::Io(e) }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Error::*;
        match self {
            Stream(e) => write!(f, "Stream error: {}", e),
            Http(e) => write!(f, "Http error: {}", e),
            Handshake(e) => write!(f, "Handshake error: {}", e),
            Frame(e) => write!(f, "Frame error: {}", e),
            Deflate(e) => write!(f, "Deflate error: {}", e),
            Io(e) => write!(f, "Io error: {}", e),
            UnknownFd(fd) => write!(f, "Unknown fd: {}", fd),
            NotOpen => write!(f, "Connection is not open"),
            MaskPolicy => write!(f, "Frame mask violates role policy"),
            ExtensionNotNegotiated => {
                write!(f, "Frame requires an extension that was not negotiated")
            }
            NoSecureTransport => {
                write!(f, "Secured mode requires a transport factory")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use Error::*;

        match self {
            Stream(e) => Some(e),
            Http(e) => Some(e),
            Handshake(e) => Some(e),
            Frame(e) => Some(e),
            Deflate(e) => Some(e),
            Io(e) => Some(e),
            _ => None,
        }
    }
}
