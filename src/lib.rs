//! Poll-driven websocket endpoint library.
//!
//! [RFC-6455](https://datatracker.ietf.org/doc/html/rfc6455) client
//! and server endpoints over plain or TLS-backed TCP, many
//! connections on one thread. A single readiness loop drives every
//! connection's state machine: the http upgrade handshake, frame
//! parsing and validation, per-message-deflate
//! ([RFC-7692](https://datatracker.ietf.org/doc/html/rfc7692)),
//! keepalive pings and the closing handshake.
//!
//! ```no_run
//! use pollws::endpoint::Endpoint;
//! use pollws::frame::{Frame, OpCode};
//! use pollws::settings::Settings;
//!
//! let mut endpoint = Endpoint::new(Settings {
//!     host: "server.example.com".into(),
//!     poll_timeout: 100,
//!     ..Settings::default()
//! }).unwrap();
//!
//! endpoint.on_frame(|ctl, fd, opcode, payload| {
//!     // echo everything back
//!     let mut frame = Frame::new(opcode);
//!     frame.push(payload);
//!     ctl.emit(fd, frame);
//! });
//!
//! endpoint.bind(None, 9001).unwrap();
//! while endpoint.operate() {}
//! ```

pub mod deflate;
pub mod endian;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod http;
pub mod role;
pub mod settings;
pub mod stream;

pub use endpoint::{Control, Endpoint, ALL_FDS};
pub use error::Error;
pub use frame::{CloseCode, Frame, OpCode};
pub use role::Role;
pub use settings::Settings;
pub use stream::ByteStream;
