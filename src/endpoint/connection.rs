//! Per-connection protocol state machine.
//!
//! Owns the two byte streams of a connection and walks it from the
//! opening handshake through OPEN, heartbeat and the closing
//! handshake. The dispatcher feeds it readiness; it answers with a
//! batch of [`ConnEvent`]s for callback fan-out. All parsing state
//! lives here so a half-received frame or header block survives
//! between readiness wakeups.

use std::time::{Duration, Instant};

use log::{debug, trace};

use super::transport::{IoEvent, Transport};
use crate::deflate;
use crate::error::{Error, FrameError};
use crate::frame::{new_mask_key, CloseCode, Frame, FrameHead, OpCode, MAX_CONTROL_PAYLOAD};
use crate::handshake::{
    derive_accept_key, new_sec_key, AcceptedRequest, ClientRequest, ServerResponse,
};
use crate::http::{self, HttpMessage, HEADER_END};
use crate::role::Role;
use crate::settings::{PermessageDeflate, Settings};
use crate::stream::{validate_utf8, ByteStream, NPOS};

const READ_CHUNK: usize = 16 * 1024;

/// Keepalive probe payload.
const PING_PAYLOAD: &[u8] = b"ping";

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Client only: waiting for the tcp/tls layer to come up.
    Connecting,
    /// Client only: upgrade request queued, draining it out.
    HandshakeSend,
    /// Waiting for the peer's half of the http handshake.
    HandshakeWait,
    Open,
    /// Close frame sent or received, draining and waiting out the
    /// echo.
    Closing,
    Closed,
}

/// What a readiness pass produced, in wire order.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnEvent {
    /// Handshake complete, the peer address is attached.
    Open(String),
    /// A reassembled, decompressed text or binary message.
    Message(OpCode, Vec<u8>),
    /// The connection reached CLOSED with this status.
    Closed(CloseCode),
    /// A human-readable failure description.
    Error(String),
}

pub struct Connection {
    transport: Box<dyn Transport>,
    role: Role,
    peer: String,
    resource: String,
    state: State,

    input: ByteStream,
    output: ByteStream,

    /// Pinned at handshake time, `None` while deflate is off.
    deflate: Option<PermessageDeflate>,
    /// Client only: the accept value the server must echo.
    expected_accept: Option<[u8; 28]>,

    // current message assembly
    assembly: ByteStream,
    assembly_opcode: Option<OpCode>,
    assembly_compressed: bool,

    // heartbeat
    last_rx: Instant,
    ping_sent: Option<Instant>,

    close_sent: bool,
    close_code: Option<CloseCode>,
    /// Protocol errors poison the input stream; parsing stops for
    /// good and the connection only drains.
    poisoned: bool,
}

impl Connection {
    /// A server-accepted connection, handshake awaited.
    pub fn accepted(transport: Box<dyn Transport>, peer: String, now: Instant) -> Self {
        Self::new(transport, Role::Server, peer, String::new(), State::HandshakeWait, now)
    }

    /// A client connection with the connect still in flight.
    pub fn connecting(
        transport: Box<dyn Transport>,
        peer: String,
        resource: String,
        now: Instant,
    ) -> Self {
        Self::new(transport, Role::Client, peer, resource, State::Connecting, now)
    }

    fn new(
        transport: Box<dyn Transport>,
        role: Role,
        peer: String,
        resource: String,
        state: State,
        now: Instant,
    ) -> Self {
        Self {
            transport,
            role,
            peer,
            resource,
            state,
            input: ByteStream::new(),
            output: ByteStream::new(),
            deflate: None,
            expected_accept: None,
            assembly: ByteStream::new(),
            assembly_opcode: None,
            assembly_compressed: false,
            last_rx: now,
            ping_sent: None,
            close_sent: false,
            close_code: None,
            poisoned: false,
        }
    }

    #[inline]
    pub fn fd(&self) -> i32 { self.transport.raw_fd() }

    #[inline]
    pub fn state(&self) -> State { self.state }

    #[inline]
    pub fn peer(&self) -> &str { &self.peer }

    /// The extension state pinned by the handshake.
    #[inline]
    pub fn negotiated_deflate(&self) -> Option<&PermessageDeflate> { self.deflate.as_ref() }

    /// Whether the dispatcher should watch this fd for writability.
    pub fn wants_write(&self) -> bool {
        matches!(self.state, State::Connecting) || self.output.available()
    }

    /// Readable readiness: pull bytes into the inbound stream and
    /// advance the state machine over them.
    pub fn handle_readable(
        &mut self,
        settings: &Settings,
        now: Instant,
        events: &mut Vec<ConnEvent>,
    ) {
        if self.state == State::Closed {
            return;
        }

        let mut saw_eof = false;
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.transport.read(&mut buf) {
                Ok(IoEvent::Data(n)) => {
                    self.input.push_back_slice(&buf[..n]);
                    self.last_rx = now;
                }
                Ok(IoEvent::WouldBlock) => break,
                Ok(IoEvent::Eof) => {
                    saw_eof = true;
                    break;
                }
                Err(e) => {
                    events.push(ConnEvent::Error(format!(
                        "fd {}: read failed: {}",
                        self.fd(),
                        e
                    )));
                    self.finish_closed(CloseCode::ABNORMAL, events);
                    return;
                }
            }
        }

        self.advance(settings, events);

        if saw_eof && self.state != State::Closed {
            trace!("fd {}: eof from peer in {:?}", self.fd(), self.state);
            match self.state {
                State::Closing => {
                    let code = self.close_code.unwrap_or(CloseCode::NORMAL);
                    self.finish_closed(code, events);
                }
                State::Open => {
                    self.finish_closed(CloseCode::ABNORMAL, events);
                }
                _ => {
                    events.push(ConnEvent::Error(format!(
                        "fd {}: connection lost during handshake",
                        self.fd()
                    )));
                    self.finish_closed(CloseCode::ABNORMAL, events);
                }
            }
        }
    }

    /// Writable readiness: finish the connect if one is in flight,
    /// then drain the outbound stream.
    pub fn handle_writable(&mut self, settings: &Settings, events: &mut Vec<ConnEvent>) {
        if self.state == State::Closed {
            return;
        }

        if self.state == State::Connecting {
            match self.transport.handshake() {
                Ok(true) => {
                    debug!("fd {}: transport up, sending upgrade request", self.fd());
                    self.send_upgrade_request(settings);
                    self.state = State::HandshakeSend;
                }
                Ok(false) => return,
                Err(e) => {
                    events.push(ConnEvent::Error(format!(
                        "fd {}: transport handshake failed: {}",
                        self.fd(),
                        e
                    )));
                    self.finish_closed(CloseCode::TLS_HANDSHAKE_FAILED, events);
                    return;
                }
            }
        }

        self.flush_output(events);
    }

    fn flush_output(&mut self, events: &mut Vec<ConnEvent>) {
        while self.output.available() {
            let chunk = self.output.as_slice();
            match self.transport.write(chunk) {
                Ok(IoEvent::Data(n)) => {
                    let _ = self.output.pop(n);
                }
                Ok(IoEvent::WouldBlock) | Ok(IoEvent::Eof) => return,
                Err(e) => {
                    events.push(ConnEvent::Error(format!(
                        "fd {}: write failed: {}",
                        self.fd(),
                        e
                    )));
                    self.finish_closed(CloseCode::ABNORMAL, events);
                    return;
                }
            }
        }

        match self.state {
            State::HandshakeSend => self.state = State::HandshakeWait,
            State::Closing => {
                let code = self.close_code.unwrap_or(CloseCode::NORMAL);
                self.finish_closed(code, events);
            }
            _ => {}
        }
    }

    /// Heartbeat and liveness, driven once per dispatcher iteration.
    pub fn tick(&mut self, settings: &Settings, now: Instant, events: &mut Vec<ConnEvent>) {
        if self.state != State::Open || settings.ping_interval == 0 {
            return;
        }

        if let Some(sent) = self.ping_sent {
            if now.duration_since(sent) > Duration::from_millis(settings.ping_timeout) {
                debug!("fd {}: no pong within {}ms", self.fd(), settings.ping_timeout);
                events.push(ConnEvent::Error(format!(
                    "fd {}: peer failed to answer ping",
                    self.fd()
                )));
                self.finish_closed(CloseCode::ABNORMAL, events);
            }
            return;
        }

        if now.duration_since(self.last_rx) > Duration::from_millis(settings.ping_interval) {
            trace!("fd {}: sending keepalive ping", self.fd());
            let mut ping = Frame::new(OpCode::Ping);
            ping.push(PING_PAYLOAD);
            self.queue_frame(ping);
            self.ping_sent = Some(now);
        }
    }

    /// Queue a user frame for transmission, enforcing role masking
    /// and extension policy.
    pub fn emit(&mut self, frame: &Frame, settings: &Settings) -> Result<(), Error> {
        if self.state != State::Open {
            return Err(Error::NotOpen);
        }
        if frame.rsv().rsv1 && self.deflate.is_none() {
            return Err(Error::ExtensionNotNegotiated);
        }
        if frame.opcode().is_control()
            && (!frame.fin() || frame.payload_len() > MAX_CONTROL_PAYLOAD)
        {
            return Err(Error::Frame(FrameError::IllegalControlFrame));
        }

        let mut frame = frame.clone();
        match self.role {
            Role::Client => {
                if frame.mask_key().is_none() {
                    if !settings.auto_mask_frame {
                        return Err(Error::MaskPolicy);
                    }
                    frame.set_mask(new_mask_key());
                }
            }
            Role::Server => {
                if frame.mask_key().is_some() {
                    return Err(Error::MaskPolicy);
                }
            }
        }

        frame.encode(&mut self.output);
        Ok(())
    }

    /// Initiate the closing handshake, or cut a connection that
    /// never reached OPEN.
    pub fn close(&mut self, code: CloseCode, events: &mut Vec<ConnEvent>) {
        match self.state {
            State::Open => {
                self.send_close(code);
                self.state = State::Closing;
            }
            State::Closing | State::Closed => {}
            _ => {
                debug!("fd {}: closed before the handshake finished", self.fd());
                self.finish_closed(CloseCode::ABNORMAL, events);
            }
        }
    }

    /// Drop the connection without ceremony (endpoint shutdown on a
    /// connection that cannot drain anymore).
    pub fn abort(&mut self, events: &mut Vec<ConnEvent>) {
        self.finish_closed(CloseCode::ABNORMAL, events);
    }

    // ---- internals ----

    fn send_upgrade_request(&mut self, settings: &Settings) {
        let sec_key = new_sec_key();
        self.expected_accept = Some(derive_accept_key(&sec_key));

        let request = ClientRequest {
            host: &settings.host,
            resource: if self.resource.is_empty() {
                "/"
            } else {
                &self.resource
            },
            origin: settings.allowed_origin.as_deref(),
            sec_key: &sec_key,
            deflate: &settings.extensions.permessage_deflate,
        };
        request.encode(&mut self.output);
    }

    fn advance(&mut self, settings: &Settings, events: &mut Vec<ConnEvent>) {
        if self.poisoned {
            self.input.flush();
            return;
        }

        if self.state == State::HandshakeWait {
            self.advance_handshake(settings, events);
        }

        if matches!(self.state, State::Open | State::Closing) {
            self.advance_frames(settings, events);
        }
    }

    fn advance_handshake(&mut self, settings: &Settings, events: &mut Vec<ConnEvent>) {
        let header_end = self.input.index_of_slice(HEADER_END, 0, NPOS);
        if header_end == NPOS {
            return;
        }
        let raw = self
            .input
            .take_front(header_end + HEADER_END.len())
            .unwrap_or_default();

        let message = match HttpMessage::parse(&raw) {
            Ok(m) => m,
            Err(e) => {
                self.fail_handshake(format!("malformed http: {}", e), 400, events);
                return;
            }
        };

        match self.role {
            Role::Server => {
                let accepted = AcceptedRequest::validate(
                    &message,
                    &settings.host,
                    settings.allowed_origin.as_deref(),
                    &settings.extensions.permessage_deflate,
                );
                match accepted {
                    Ok(accepted) => {
                        self.deflate = accepted.deflate;
                        let response = ServerResponse {
                            sec_accept: &derive_accept_key(accepted.sec_key.as_bytes()),
                            deflate: self.deflate.as_ref(),
                        };
                        response.encode(&mut self.output);
                        self.open(events);
                    }
                    Err(e) => {
                        self.fail_handshake(e.to_string(), e.http_status(), events);
                    }
                }
            }
            Role::Client => {
                let expected = self.expected_accept.unwrap_or([0; 28]);
                let local = &settings.extensions.permessage_deflate;
                match ServerResponse::validate(&message, &expected, local) {
                    Ok(pinned) => {
                        self.deflate = pinned;
                        self.open(events);
                    }
                    Err(e) => {
                        events.push(ConnEvent::Error(format!(
                            "fd {}: handshake rejected: {}",
                            self.fd(),
                            e
                        )));
                        self.finish_closed(CloseCode::PROTOCOL_ERROR, events);
                    }
                }
            }
        }
    }

    fn fail_handshake(&mut self, reason: String, status: u16, events: &mut Vec<ConnEvent>) {
        debug!("fd {}: handshake failed: {}", self.fd(), reason);
        events.push(ConnEvent::Error(format!("fd {}: {}", self.fd(), reason)));
        if self.role == Role::Server {
            http::respond(status, &mut self.output);
            // best effort, the fd goes away right after
            self.flush_output(events);
        }
        self.finish_closed(CloseCode::PROTOCOL_ERROR, events);
    }

    fn open(&mut self, events: &mut Vec<ConnEvent>) {
        debug!("fd {}: open, peer {}", self.fd(), self.peer);
        self.state = State::Open;
        events.push(ConnEvent::Open(self.peer.clone()));
    }

    fn advance_frames(&mut self, settings: &Settings, events: &mut Vec<ConnEvent>) {
        while !self.poisoned && self.state != State::Closed {
            // peek the head first so an oversized announcement dies
            // before its payload is awaited
            match FrameHead::decode(self.input.as_slice()) {
                Err(FrameError::NotEnoughData) => return,
                Err(e) => {
                    self.protocol_error(e, events);
                    return;
                }
                Ok((head, _)) => {
                    if head.opcode.is_control() {
                        if head.length.to_num() > MAX_CONTROL_PAYLOAD as u64 {
                            self.protocol_error(FrameError::IllegalControlFrame, events);
                            return;
                        }
                    } else {
                        let incoming = head.length.to_num();
                        let assembled = self.assembly.len() as u64;
                        if assembled + incoming > settings.message_limit as u64 {
                            self.protocol_error(FrameError::MessageTooBig, events);
                            return;
                        }
                    }
                }
            }

            let frame = match Frame::decode(&mut self.input) {
                Err(FrameError::NotEnoughData) => return,
                Err(e) => {
                    self.protocol_error(e, events);
                    return;
                }
                Ok(f) => f,
            };

            if let Err(e) = self.process_frame(frame, settings, events) {
                self.protocol_error(e, events);
                return;
            }
        }
    }

    fn process_frame(
        &mut self,
        frame: Frame,
        settings: &Settings,
        events: &mut Vec<ConnEvent>,
    ) -> Result<(), FrameError> {
        // masking is a hard role rule in both directions
        let masked = frame.mask_key().is_some();
        if self.role.expects_masked_input() != masked {
            return Err(FrameError::IllegalMask);
        }

        let rsv = frame.rsv();
        if rsv.rsv2 || rsv.rsv3 {
            return Err(FrameError::IllegalRsv);
        }
        if rsv.rsv1 {
            // legal only on the first data frame of a message, and
            // only once deflate is pinned
            let first_data = frame.opcode().is_data() && self.assembly_opcode.is_none();
            if self.deflate.is_none() || !first_data {
                return Err(FrameError::IllegalRsv);
            }
        }

        if frame.opcode().is_control() {
            return self.process_control(frame, events);
        }

        if self.state == State::Closing {
            // no data accepted during the closing handshake
            trace!("fd {}: data frame dropped while closing", self.fd());
            return Ok(());
        }

        self.process_data(frame, settings, events)
    }

    fn process_control(
        &mut self,
        frame: Frame,
        events: &mut Vec<ConnEvent>,
    ) -> Result<(), FrameError> {
        if !frame.fin() || frame.payload_len() > MAX_CONTROL_PAYLOAD {
            return Err(FrameError::IllegalControlFrame);
        }

        match frame.opcode() {
            OpCode::Ping => {
                trace!("fd {}: ping, answering pong", self.fd());
                if self.state == State::Open {
                    let mut pong = Frame::new(OpCode::Pong);
                    pong.push(&frame.payload().to_vec());
                    self.queue_frame(pong);
                }
            }
            OpCode::Pong => {
                trace!("fd {}: pong", self.fd());
                self.ping_sent = None;
            }
            OpCode::Close => {
                let (code, _reason) = frame.parse_close_payload()?;
                debug!("fd {}: close frame, status {}", self.fd(), code);
                if !self.close_sent {
                    // echo the status back, completing the handshake
                    self.send_close(code);
                    self.state = State::Closing;
                } else {
                    // the echo of our own close arrived
                    let ours = self.close_code.unwrap_or(code);
                    self.close_code = Some(ours);
                    if !self.output.available() {
                        self.finish_closed(ours, events);
                    }
                }
            }
            _ => unreachable!("data opcode in control path"),
        }
        Ok(())
    }

    fn process_data(
        &mut self,
        mut frame: Frame,
        settings: &Settings,
        events: &mut Vec<ConnEvent>,
    ) -> Result<(), FrameError> {
        match frame.opcode() {
            OpCode::Continue => {
                if self.assembly_opcode.is_none() {
                    return Err(FrameError::StrayContinuation);
                }
            }
            _ => {
                if self.assembly_opcode.is_some() {
                    return Err(FrameError::InterleavedMessage);
                }
                self.assembly_opcode = Some(frame.opcode());
                self.assembly_compressed = frame.rsv().rsv1;
            }
        }

        // the head check already bounded this against message_limit
        let mut payload = frame.take_payload();
        let n = payload.len();
        let _ = payload.move_to(&mut self.assembly, n, 0);

        if !frame.fin() {
            return Ok(());
        }

        let opcode = self.assembly_opcode.take().unwrap_or(OpCode::Binary);
        let compressed = self.assembly_compressed;
        self.assembly_compressed = false;

        let mut payload = std::mem::take(&mut self.assembly).to_vec();

        if compressed {
            // the window was pinned together with the rsv1 check
            let window_bits = self.deflate.map(|d| d.window_bits).unwrap_or(15);
            payload.extend_from_slice(&deflate::TRAILER);
            let mut unpacked = ByteStream::new();
            if deflate::inflate(&payload, &mut unpacked, window_bits).is_err() {
                return Err(FrameError::IllegalDeflate);
            }
            if unpacked.len() > settings.message_limit {
                return Err(FrameError::MessageTooBig);
            }
            payload = unpacked.to_vec();
        }

        if opcode == OpCode::Text && !validate_utf8(payload.iter().copied()) {
            return Err(FrameError::IllegalUtf8);
        }

        trace!(
            "fd {}: message complete, {:?}, {} bytes",
            self.fd(),
            opcode,
            payload.len()
        );
        events.push(ConnEvent::Message(opcode, payload));
        Ok(())
    }

    fn protocol_error(&mut self, error: FrameError, events: &mut Vec<ConnEvent>) {
        let code = error.close_code();
        debug!("fd {}: protocol error: {}, closing {}", self.fd(), error, code);
        events.push(ConnEvent::Error(format!("fd {}: {}", self.fd(), error)));

        // the stream cannot be resynchronized past a framing error
        self.poisoned = true;
        self.input.flush();

        if !self.close_sent {
            self.send_close(code);
        }
        self.close_code = Some(code);
        self.state = State::Closing;
    }

    fn send_close(&mut self, code: CloseCode) {
        let on_wire = if code.is_valid_on_wire() {
            code
        } else {
            CloseCode::NORMAL
        };
        self.queue_frame(Frame::close(on_wire, b""));
        self.close_sent = true;
        self.close_code = Some(code);
    }

    // internal frames follow the role masking rule unconditionally
    fn queue_frame(&mut self, mut frame: Frame) {
        if self.role.masks_outbound() && frame.mask_key().is_none() {
            frame.set_mask(new_mask_key());
        }
        frame.encode(&mut self.output);
    }

    fn finish_closed(&mut self, code: CloseCode, events: &mut Vec<ConnEvent>) {
        if self.state == State::Closed {
            return;
        }
        debug!("fd {}: closed, status {}", self.fd(), code);
        self.state = State::Closed;
        self.transport.close();
        events.push(ConnEvent::Closed(code));
    }
}
