use std::fmt::{Display, Formatter};

use crate::error::HttpError;

#[derive(Debug)]
pub enum HandshakeError {
    // http error
    HttpMethod,

    HttpVersion,

    HttpStatusCode,

    HttpHost,

    // websocket error
    Upgrade,

    Connection,

    SecWebSocketKey,

    SecWebSocketAccept,

    SecWebSocketVersion,

    Origin,

    Extension,

    // read
    NotEnoughData,

    Http(HttpError),
}

impl HandshakeError {
    /// Status of the canned response a server answers this failure
    /// with.
    pub const fn http_status(&self) -> u16 {
        use HandshakeError::*;
        match self {
            Origin => 403,
            SecWebSocketVersion => 426,
            _ => 400,
        }
    }
}

impl Display for HandshakeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use HandshakeError::*;
        match self {
            // http error
            HttpMethod => write!(f, "Illegal http method"),

            HttpVersion => write!(f, "Illegal http version"),

            HttpStatusCode => write!(f, "Illegal http status code"),

            HttpHost => write!(f, "Missing or mismatching http host header"),

            // websocket error
            Upgrade => write!(f, "Missing or illegal upgrade header"),

            Connection => write!(f, "Missing or illegal connection header"),

            SecWebSocketKey => {
                write!(f, "Missing sec-websocket-key header")
            }

            SecWebSocketAccept => {
                write!(f, "Missing or illegal sec-websocket-accept header")
            }

            SecWebSocketVersion => {
                write!(f, "Missing or illegal sec-websocket-version")
            }

            Origin => write!(f, "Origin is not allowed"),

            Extension => write!(f, "Illegal sec-websocket-extensions header"),

            // other error
            NotEnoughData => write!(f, "Not enough data to parse"),

            Http(e) => write!(f, "Http error: {}", e),
        }
    }
}

impl From<HttpError> for HandshakeError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::NotEnoughData => HandshakeError::NotEnoughData,
            e => HandshakeError::Http(e),
        }
    }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let HandshakeError::Http(e) = self {
            Some(e)
        } else {
            None
        }
    }
}
