//! Websocket endpoint.
//!
//! Owns the listening sockets, the fd-keyed connection table and the
//! readiness multiplexer. One call to [`Endpoint::operate`] is one
//! pump iteration: wait for readiness, advance the affected
//! connections, run heartbeats, fan the produced events out to the
//! registered callbacks and reap whatever reached CLOSED.
//!
//! The whole endpoint is single-threaded by contract; callbacks run
//! on the thread that calls `operate` and talk back to the engine
//! through the [`Control`] handle they receive.

mod connection;
mod poller;
mod transport;

pub use connection::{ConnEvent, Connection, State};
pub use poller::{Multiplexer, Readiness};
pub use transport::{IoEvent, PlainTransport, Transport, TransportFactory};

use std::collections::HashMap;
use std::io::{self, Write as _};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use log::{debug, info, warn};
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::Error;
use crate::frame::{CloseCode, Frame, OpCode};
use crate::http;
use crate::role::Role;
use crate::settings::{Mode, PermessageDeflate, Settings};
use crate::stream::ByteStream;

/// Passing this to [`Endpoint::close`] sweeps every fd.
pub const ALL_FDS: RawFd = -1;

type OpenCallback = Box<dyn FnMut(&mut Control, RawFd, &str)>;
type CloseCallback = Box<dyn FnMut(&mut Control, RawFd, CloseCode)>;
type FrameCallback = Box<dyn FnMut(&mut Control, RawFd, OpCode, &[u8])>;
type ErrorCallback = Box<dyn FnMut(&mut Control, &str)>;

enum Command {
    Emit(RawFd, Frame),
    Close(RawFd),
}

/// Engine handle passed into callbacks.
///
/// Calls are queued and applied right after the callback batch of
/// the current iteration, preserving order.
pub struct Control {
    queue: Vec<Command>,
}

impl Control {
    /// Queue a frame for the given connection.
    pub fn emit(&mut self, fd: RawFd, frame: Frame) { self.queue.push(Command::Emit(fd, frame)) }

    /// Queue a closing handshake, [`ALL_FDS`] for everything.
    pub fn close(&mut self, fd: RawFd) { self.queue.push(Command::Close(fd)) }
}

/// A websocket endpoint, server or client side.
pub struct Endpoint {
    settings: Settings,
    mux: Multiplexer,
    listeners: HashMap<RawFd, TcpListener>,
    connections: HashMap<RawFd, Connection>,
    transport_factory: Option<TransportFactory>,
    /// Events produced outside `operate` (by `close`), delivered on
    /// the next iteration.
    pending: Vec<(RawFd, ConnEvent)>,
    on_open: Option<OpenCallback>,
    on_close: Option<CloseCallback>,
    on_frame: Option<FrameCallback>,
    on_error: Option<ErrorCallback>,
}

impl Endpoint {
    pub fn new(settings: Settings) -> io::Result<Self> {
        Ok(Self {
            settings,
            mux: Multiplexer::new()?,
            listeners: HashMap::new(),
            connections: HashMap::new(),
            transport_factory: None,
            pending: Vec::new(),
            on_open: None,
            on_close: None,
            on_frame: None,
            on_error: None,
        })
    }

    /// Swap in a new settings record. Connections already running
    /// keep the extension state they negotiated.
    pub fn setup(&mut self, settings: &Settings) { self.settings = settings.clone() }

    #[inline]
    pub fn settings(&self) -> &Settings { &self.settings }

    /// Install the transport builder used in [`Mode::Secured`].
    pub fn set_transport_factory(&mut self, factory: TransportFactory) {
        self.transport_factory = Some(factory);
    }

    // ---- callback registration, one setter per event ----

    pub fn on_open(&mut self, callback: impl FnMut(&mut Control, RawFd, &str) + 'static) {
        self.on_open = Some(Box::new(callback));
    }

    pub fn on_close(&mut self, callback: impl FnMut(&mut Control, RawFd, CloseCode) + 'static) {
        self.on_close = Some(Box::new(callback));
    }

    pub fn on_frame(
        &mut self,
        callback: impl FnMut(&mut Control, RawFd, OpCode, &[u8]) + 'static,
    ) {
        self.on_frame = Some(Box::new(callback));
    }

    pub fn on_error(&mut self, callback: impl FnMut(&mut Control, &str) + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    /// Create a listening socket on `ip:port` (all interfaces when
    /// `ip` is `None`) and return its fd.
    pub fn bind(&mut self, ip: Option<&str>, port: u16) -> Result<RawFd, Error> {
        let listener = TcpListener::bind((ip.unwrap_or("0.0.0.0"), port))?;
        listener.set_nonblocking(true)?;

        let fd = listener.as_raw_fd();
        self.mux.register(fd, true, false)?;
        info!("fd {}: listening on {}", fd, listener.local_addr()?);
        self.listeners.insert(fd, listener);
        Ok(fd)
    }

    /// Resolve `host:port`, start a non-blocking connect and attach
    /// a client connection to the resulting fd.
    pub fn open(&mut self, host: &str, port: u16) -> Result<RawFd, Error> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host did not resolve"))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        match socket.connect(&addr.into()) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        let tcp: TcpStream = socket.into();
        self.apply_read_timeout(&tcp);
        let transport = self.make_transport(tcp, Role::Client)?;
        let fd = transport.raw_fd();

        let peer = format!("{}:{}", host, port);
        debug!("fd {}: connecting to {}", fd, peer);
        let conn = Connection::connecting(transport, peer, "/".into(), Instant::now());
        self.mux.register(fd, true, true)?;
        self.connections.insert(fd, conn);
        Ok(fd)
    }

    /// Queue `frame` on the connection's outbound stream. The bytes
    /// leave with the next writable readiness.
    pub fn emit(&mut self, fd: RawFd, frame: &Frame) -> Result<(), Error> {
        let conn = self
            .connections
            .get_mut(&fd)
            .ok_or(Error::UnknownFd(fd))?;
        conn.emit(frame, &self.settings)
    }

    /// Extension state a connection pinned during its handshake.
    pub fn negotiated_deflate(&self, fd: RawFd) -> Option<&PermessageDeflate> {
        self.connections.get(&fd).and_then(|c| c.negotiated_deflate())
    }

    /// Initiate the closing handshake on `fd`, or on every fd
    /// (listeners included) with [`ALL_FDS`].
    pub fn close(&mut self, fd: RawFd) {
        if fd == ALL_FDS {
            for (fd, _listener) in self.listeners.drain() {
                let _ = self.mux.unregister(fd);
                info!("fd {}: listener closed", fd);
            }
            let fds: Vec<RawFd> = self.connections.keys().copied().collect();
            for fd in fds {
                self.close_one(fd);
            }
            return;
        }

        if let Some(listener) = self.listeners.remove(&fd) {
            let _ = self.mux.unregister(fd);
            drop(listener);
            return;
        }
        self.close_one(fd);
    }

    fn close_one(&mut self, fd: RawFd) {
        if let Some(conn) = self.connections.get_mut(&fd) {
            let mut events = Vec::new();
            conn.close(CloseCode::NORMAL, &mut events);
            self.pending.extend(events.into_iter().map(|e| (fd, e)));
        }
    }

    /// One pump iteration. Returns `true` while any fd is alive.
    pub fn operate(&mut self) -> bool {
        let mut batch: Vec<(RawFd, ConnEvent)> = std::mem::take(&mut self.pending);

        self.rearm_all();

        let ready = match self.mux.wait(self.settings.poll_timeout) {
            Ok(ready) => ready,
            Err(e) => {
                warn!("readiness wait failed: {}", e);
                batch.push((ALL_FDS, ConnEvent::Error(format!("poll failed: {}", e))));
                Vec::new()
            }
        };

        let now = Instant::now();
        for readiness in ready {
            if self.listeners.contains_key(&readiness.fd) {
                self.accept_pending(readiness.fd, now, &mut batch);
                continue;
            }
            if let Some(conn) = self.connections.get_mut(&readiness.fd) {
                let mut events = Vec::new();
                if readiness.readable {
                    conn.handle_readable(&self.settings, now, &mut events);
                }
                if readiness.writable {
                    conn.handle_writable(&self.settings, &mut events);
                }
                batch.extend(events.into_iter().map(|e| (readiness.fd, e)));
            }
        }

        for (fd, conn) in self.connections.iter_mut() {
            let mut events = Vec::new();
            conn.tick(&self.settings, now, &mut events);
            batch.extend(events.into_iter().map(|e| (*fd, e)));
        }

        let commands = self.dispatch(batch);
        self.run_commands(commands);
        self.reap_closed();

        !self.listeners.is_empty() || !self.connections.is_empty()
    }

    // ---- internals ----

    fn make_transport(&self, tcp: TcpStream, role: Role) -> Result<Box<dyn Transport>, Error> {
        match self.settings.mode {
            Mode::Unsecured => Ok(Box::new(PlainTransport::new(tcp))),
            Mode::Secured => match &self.transport_factory {
                Some(factory) => Ok(factory(tcp, &self.settings.tls, role)?),
                None => Err(Error::NoSecureTransport),
            },
        }
    }

    // bounds transport-internal blocking reads (a TLS handshake
    // step); the engine's own reads never block
    fn apply_read_timeout(&self, tcp: &TcpStream) {
        if self.settings.read_timeout > 0 {
            let timeout = std::time::Duration::from_millis(self.settings.read_timeout as u64);
            let _ = tcp.set_read_timeout(Some(timeout));
        }
    }

    fn rearm_all(&mut self) {
        for fd in self.listeners.keys() {
            let _ = self.mux.rearm(*fd, true, false);
        }
        for (fd, conn) in self.connections.iter() {
            let _ = self.mux.rearm(*fd, true, conn.wants_write());
        }
    }

    fn accept_pending(&mut self, listener_fd: RawFd, now: Instant, batch: &mut Vec<(RawFd, ConnEvent)>) {
        loop {
            let accepted = match self.listeners.get(&listener_fd) {
                Some(listener) => listener.accept(),
                None => return,
            };
            let (tcp, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("fd {}: accept failed: {}", listener_fd, e);
                    batch.push((listener_fd, ConnEvent::Error(format!("accept failed: {}", e))));
                    return;
                }
            };

            if self.settings.fd_limit > 0 && self.connections.len() >= self.settings.fd_limit {
                debug!("fd limit {} hit, refusing {}", self.settings.fd_limit, peer);
                refuse_with_503(tcp);
                continue;
            }

            if tcp.set_nonblocking(true).is_err() {
                continue;
            }
            self.apply_read_timeout(&tcp);
            let transport = match self.make_transport(tcp, Role::Server) {
                Ok(t) => t,
                Err(e) => {
                    batch.push((listener_fd, ConnEvent::Error(format!("accept failed: {}", e))));
                    continue;
                }
            };

            let fd = transport.raw_fd();
            if self.mux.register(fd, true, false).is_err() {
                continue;
            }
            debug!("fd {}: accepted from {}", fd, peer);
            let conn = Connection::accepted(transport, peer.to_string(), now);
            self.connections.insert(fd, conn);
        }
    }

    /// Fan events out to the user callbacks. A panicking callback
    /// never unwinds through the engine: it surfaces as `on_error`
    /// plus a 1011 closure of the offending connection.
    fn dispatch(&mut self, batch: Vec<(RawFd, ConnEvent)>) -> Vec<Command> {
        let mut ctl = Control { queue: Vec::new() };
        let mut panicked: Vec<RawFd> = Vec::new();

        for (fd, event) in batch {
            let escaped = match event {
                ConnEvent::Open(addr) => match self.on_open.as_mut() {
                    Some(cb) => {
                        catch_unwind(AssertUnwindSafe(|| cb(&mut ctl, fd, &addr))).is_err()
                    }
                    None => false,
                },
                ConnEvent::Message(opcode, payload) => match self.on_frame.as_mut() {
                    Some(cb) => {
                        catch_unwind(AssertUnwindSafe(|| cb(&mut ctl, fd, opcode, &payload)))
                            .is_err()
                    }
                    None => false,
                },
                ConnEvent::Closed(code) => match self.on_close.as_mut() {
                    Some(cb) => catch_unwind(AssertUnwindSafe(|| cb(&mut ctl, fd, code))).is_err(),
                    None => false,
                },
                ConnEvent::Error(message) => match self.on_error.as_mut() {
                    Some(cb) => catch_unwind(AssertUnwindSafe(|| cb(&mut ctl, &message))).is_err(),
                    None => false,
                },
            };
            if escaped {
                warn!("fd {}: callback panicked", fd);
                panicked.push(fd);
            }
        }

        for fd in panicked {
            self.pending
                .push((fd, ConnEvent::Error(format!("fd {}: callback panicked", fd))));
            if let Some(conn) = self.connections.get_mut(&fd) {
                let mut events = Vec::new();
                conn.close(CloseCode::INTERNAL_ERROR, &mut events);
                self.pending.extend(events.into_iter().map(|e| (fd, e)));
            }
        }

        ctl.queue
    }

    fn run_commands(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Emit(fd, frame) => {
                    if let Err(e) = self.emit(fd, &frame) {
                        self.pending
                            .push((fd, ConnEvent::Error(format!("fd {}: emit failed: {}", fd, e))));
                    }
                }
                Command::Close(fd) => self.close(fd),
            }
        }
    }

    fn reap_closed(&mut self) {
        let dead: Vec<RawFd> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.state() == State::Closed)
            .map(|(fd, _)| *fd)
            .collect();
        for fd in dead {
            let _ = self.mux.unregister(fd);
            self.connections.remove(&fd);
            debug!("fd {}: removed from the connection table", fd);
        }
    }
}

// over-limit accepts get a canned 503 before the fd goes away
fn refuse_with_503(mut tcp: TcpStream) {
    let mut canned = ByteStream::new();
    http::respond(503, &mut canned);
    let _ = tcp.write_all(canned.as_slice());
}
