//! Http message parsing for the opening handshake.
//!
//! One message is parsed per connection, then dropped as soon as the
//! connection reaches OPEN. Heavy lifting is delegated to `httparse`;
//! this module materializes the result into an owned record so the
//! inbound stream can be consumed and reused for frame data.

use std::fmt::Write as _;

use crate::error::HttpError;
use crate::stream::ByteStream;

/// End-of-headers marker.
pub const HEADER_END: &[u8] = b"\r\n\r\n";

const MAX_HEADERS: usize = 64;

/// First line of the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: String,
        resource: String,
        version: u8,
    },
    Response {
        version: u8,
        status_code: u16,
        reason: String,
    },
}

/// A parsed request or response with its headers and body.
///
/// Header names keep their wire spelling; lookups compare
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct HttpMessage {
    pub start: StartLine,
    pub headers: Vec<(String, String)>,
    pub body: ByteStream,
}

impl HttpMessage {
    /// Parse a complete message out of `raw`. The caller hands in
    /// everything up to (and past) the blank line; bytes behind the
    /// header block become the body.
    pub fn parse(raw: &[u8]) -> Result<Self, HttpError> {
        if raw.starts_with(b"HTTP/") {
            Self::parse_response(raw)
        } else {
            Self::parse_request(raw)
        }
    }

    fn parse_request(raw: &[u8]) -> Result<Self, HttpError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut request = httparse::Request::new(&mut headers);

        let consumed = match request.parse(raw)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Err(HttpError::NoHttpHeader),
        };

        let method = request.method.ok_or(HttpError::NoHttpFormat)?;
        let resource = request.path.ok_or(HttpError::NoHttpFormat)?;
        let version = request.version.ok_or(HttpError::NoHttpVersion)?;

        Ok(Self {
            start: StartLine::Request {
                method: method.to_owned(),
                resource: resource.to_owned(),
                version,
            },
            headers: own_headers(request.headers),
            body: ByteStream::from(&raw[consumed..]),
        })
    }

    fn parse_response(raw: &[u8]) -> Result<Self, HttpError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        let consumed = match response.parse(raw)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Err(HttpError::NoHttpHeader),
        };

        let version = response.version.ok_or(HttpError::NoHttpVersion)?;
        let status_code = response.code.ok_or(HttpError::NoValidHttpStatusCode)?;
        let reason = response.reason.unwrap_or("");

        Ok(Self {
            start: StartLine::Response {
                version,
                status_code,
                reason: reason.to_owned(),
            },
            headers: own_headers(response.headers),
            body: ByteStream::from(&raw[consumed..]),
        })
    }

    /// Value of the first header matching `name`, compared
    /// case-insensitively, with surrounding whitespace trimmed.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }

    /// Every value carried under `name`, in wire order. Headers like
    /// `Sec-WebSocket-Extensions` may legally repeat.
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }

    /// Whether `name` holds `token` as a comma-separated element,
    /// compared case-insensitively. `Connection: keep-alive, Upgrade`
    /// style headers need this rather than a full-value match.
    pub fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.header(name)
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }
}

fn own_headers(parsed: &[httparse::Header<'_>]) -> Vec<(String, String)> {
    parsed
        .iter()
        .map(|h| {
            (
                h.name.to_owned(),
                String::from_utf8_lossy(h.value).trim().to_owned(),
            )
        })
        .collect()
}

/// Write the minimal canned response the engine answers errors with.
pub fn respond(status_code: u16, output: &mut ByteStream) {
    let mut line = String::with_capacity(64);
    let _ = write!(
        line,
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\n\r\n",
        status_code,
        reason_phrase(status_code)
    );
    output.push_back_slice(line.as_bytes());
}

/// Reason phrases for the statuses the engine emits.
pub const fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        101 => "Switching Protocols",
        400 => "Bad Request",
        403 => "Forbidden",
        426 => "Upgrade Required",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
