// Shared transport tuning for SSH sessions and SNMP exchanges.
//
// Both transports block the calling thread, so every bound here is
// enforced inside the transport itself as well as by the caller's
// outer timeout.

use std::time::Duration;

/// Default SSH management port.
pub const SSH_PORT: u16 = 22;

/// Default SNMP agent port.
pub const SNMP_PORT: u16 = 161;

/// Shared transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP connect + SSH handshake bound.
    pub connect_timeout: Duration,
    /// Per-read bound applied to the libssh2 session.
    pub io_timeout: Duration,
    /// Per-attempt bound for one SNMP request/response.
    pub snmp_timeout: Duration,
    /// Attempts per SNMP request before giving up.
    pub snmp_retries: u32,
    /// Upper bound on varbinds collected by one walk.
    pub snmp_max_repetitions: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            snmp_timeout: Duration::from_secs(2),
            snmp_retries: 3,
            snmp_max_repetitions: 512,
        }
    }
}

impl TransportConfig {
    /// libssh2 takes its blocking timeout in milliseconds as `u32`.
    pub(crate) fn io_timeout_ms(&self) -> u32 {
        u32::try_from(self.io_timeout.as_millis()).unwrap_or(u32::MAX)
    }
}

/// Clamp a duration to whole milliseconds for error reporting.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
