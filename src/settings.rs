//! Endpoint configuration.

use crate::role::Role;

/// Transport security selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Unsecured,
    Secured,
}

/// Material handed to the TLS collaborator when [`Mode::Secured`].
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Seed for the backend's random generator.
    pub seed: Option<String>,
    /// CA certificate, PEM.
    pub ca_cert: Option<String>,
    /// Own certificate chain, PEM.
    pub own_cert: Option<String>,
    /// Private key matching `own_cert`, PEM.
    pub private_key: Option<String>,
}

/// Per-message-deflate knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermessageDeflate {
    pub enabled: bool,
    /// Sliding window, 9..=15.
    pub window_bits: u8,
}

impl Default for PermessageDeflate {
    fn default() -> Self {
        Self {
            enabled: false,
            window_bits: 15,
        }
    }
}

/// Configurable websocket extensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extensions {
    pub permessage_deflate: PermessageDeflate,
}

/// Everything an endpoint needs to know before `bind` or `open`.
///
/// `Default` mirrors the library's historical defaults: a plain
/// server endpoint, sixty-second keepalives with a thirty-second pong
/// deadline, four-MiB messages and automatic client-side masking.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Handshake direction.
    pub endpoint: Role,

    pub mode: Mode,

    /// Milliseconds a socket read may stall before the transport
    /// gives up, zero for no bound.
    pub read_timeout: u32,
    /// Milliseconds one readiness wait may block, zero for no bound.
    pub poll_timeout: u32,

    pub tls: TlsConfig,

    /// Cap on concurrently managed connections, zero for unbounded.
    pub fd_limit: usize,

    /// Host header for outbound handshakes, authoritative host check
    /// for inbound ones. Empty disables the inbound check.
    pub host: String,
    /// When set, inbound handshakes must carry this exact origin.
    pub allowed_origin: Option<String>,

    /// Milliseconds of peer silence before a ping goes out.
    pub ping_interval: u64,
    /// Milliseconds to wait for the pong before declaring the peer
    /// dead.
    pub ping_timeout: u64,

    /// Upper bound on a reassembled message, bytes.
    pub message_limit: usize,

    /// Generate a random mask key for client frames that carry none.
    pub auto_mask_frame: bool,

    pub extensions: Extensions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: Role::Server,
            mode: Mode::Unsecured,
            read_timeout: 0,
            poll_timeout: 0,
            tls: TlsConfig::default(),
            fd_limit: 0,
            host: String::new(),
            allowed_origin: None,
            ping_interval: 60 * 1000,
            ping_timeout: 30 * 1000,
            message_limit: 4 * 1024 * 1024,
            auto_mask_frame: true,
            extensions: Extensions::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_historical_table() {
        let s = Settings::default();
        assert_eq!(s.endpoint, Role::Server);
        assert_eq!(s.mode, Mode::Unsecured);
        assert_eq!(s.ping_interval, 60_000);
        assert_eq!(s.ping_timeout, 30_000);
        assert_eq!(s.message_limit, 4 * 1024 * 1024);
        assert!(s.auto_mask_frame);
        assert!(!s.extensions.permessage_deflate.enabled);
        assert_eq!(s.extensions.permessage_deflate.window_bits, 15);
    }
}
