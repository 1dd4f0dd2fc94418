//! Websocket handshake.
//!
//! [RFC-6455 Section 4](https://datatracker.ietf.org/doc/html/rfc6455#section-4)

pub mod extension;
pub mod key;
pub mod request;
pub mod response;

pub use key::{derive_accept_key, new_sec_key};
pub use request::{AcceptedRequest, ClientRequest};
pub use response::ServerResponse;

/// 258EAFA5-E914-47DA-95CA-C5AB0DC85B11
pub const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const HEADER_HOST: &str = "Host";
pub const HEADER_UPGRADE: &str = "Upgrade";
pub const HEADER_CONNECTION: &str = "Connection";
pub const HEADER_ORIGIN: &str = "Origin";
pub const HEADER_SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
pub const HEADER_SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
pub const HEADER_SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";
pub const HEADER_SEC_WEBSOCKET_EXTENSIONS: &str = "Sec-WebSocket-Extensions";

pub const UPGRADE_VALUE: &str = "websocket";
pub const CONNECTION_VALUE: &str = "Upgrade";
pub const VERSION_VALUE: &str = "13";
