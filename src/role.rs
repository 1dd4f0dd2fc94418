//! Websocket client or server.

/// Which side of the handshake a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    /// Clients mask every outbound payload.
    #[inline]
    pub const fn masks_outbound(self) -> bool { matches!(self, Role::Client) }

    /// Servers require every inbound payload to be masked.
    #[inline]
    pub const fn expects_masked_input(self) -> bool { matches!(self, Role::Server) }
}
