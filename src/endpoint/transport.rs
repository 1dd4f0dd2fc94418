//! Byte transport under a connection.
//!
//! The engine reads and writes through this seam only, so a TLS
//! backend can slot in without the state machine noticing. The
//! in-crate implementation is plain TCP; an embedder supplies the
//! secured one through [`TransportFactory`] using the material in
//! [`TlsConfig`](crate::settings::TlsConfig).

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::role::Role;
use crate::settings::TlsConfig;

/// Outcome of a non-blocking read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoEvent {
    /// Bytes moved.
    Data(usize),
    /// The socket is not ready, try again on the next readiness.
    WouldBlock,
    /// The peer shut its half down (reads only).
    Eof,
}

/// Duplex byte stream with an optional security handshake.
pub trait Transport {
    /// Drive the security handshake one step. `Ok(true)` means the
    /// transport is ready for application bytes; plain TCP always is.
    fn handshake(&mut self) -> io::Result<bool>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<IoEvent>;

    fn write(&mut self, buf: &[u8]) -> io::Result<IoEvent>;

    /// Best-effort orderly shutdown of the write half.
    fn close(&mut self);

    fn raw_fd(&self) -> RawFd;
}

/// Builds the transport for a fresh socket. Secured endpoints install
/// one wrapping their TLS backend; `role` tells it which side of the
/// TLS handshake to play.
pub type TransportFactory =
    Box<dyn Fn(TcpStream, &TlsConfig, Role) -> io::Result<Box<dyn Transport>>>;

/// Plain TCP, no security layer.
pub struct PlainTransport {
    tcp: TcpStream,
}

impl PlainTransport {
    pub fn new(tcp: TcpStream) -> Self { Self { tcp } }
}

impl Transport for PlainTransport {
    fn handshake(&mut self) -> io::Result<bool> { Ok(true) }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<IoEvent> {
        match self.tcp.read(buf) {
            Ok(0) => Ok(IoEvent::Eof),
            Ok(n) => Ok(IoEvent::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(IoEvent::WouldBlock),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(IoEvent::WouldBlock),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<IoEvent> {
        match self.tcp.write(buf) {
            Ok(n) => Ok(IoEvent::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(IoEvent::WouldBlock),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(IoEvent::WouldBlock),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        let _ = self.tcp.shutdown(Shutdown::Write);
    }

    fn raw_fd(&self) -> RawFd { self.tcp.as_raw_fd() }
}
