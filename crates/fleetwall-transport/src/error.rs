use thiserror::Error;

/// Top-level error type for the `fleetwall-transport` crate.
///
/// Covers every failure mode of the two device transports: SSH sessions
/// and stateless SNMP exchanges. `fleetwall-core` maps these into
/// connectivity and execution errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// TCP connect to the device failed (refused, unreachable, DNS).
    #[error("Cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Host name did not resolve to any socket address.
    #[error("Cannot resolve host '{host}'")]
    Resolve { host: String },

    /// SSH authentication was rejected.
    #[error("Authentication failed for user '{user}': {message}")]
    Authentication { user: String, message: String },

    // ── Session ─────────────────────────────────────────────────────
    /// Low-level libssh2 failure on an established session.
    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// Read or write failure on the session channel or UDP socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation did not complete within its bound.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The session was closed by a previous teardown.
    #[error("Session already closed")]
    SessionClosed,

    // ── SNMP ────────────────────────────────────────────────────────
    /// Malformed OID text or an arc that cannot be encoded.
    #[error("Invalid OID '{0}'")]
    InvalidOid(String),

    /// A response datagram could not be decoded.
    #[error("SNMP decode error: {0}")]
    Decode(String),

    /// The agent answered with a non-zero error-status.
    #[error("SNMP agent returned error-status {status} at index {index}")]
    SnmpStatus { status: i64, index: i64 },

    /// No response from the agent after every retry.
    #[error("No SNMP response from {addr} after {attempts} attempts")]
    NoResponse { addr: String, attempts: u32 },
}

impl Error {
    /// Returns `true` if the fault happened below the command layer, so the
    /// session that produced it can no longer be trusted.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            Self::InvalidOid(_) | Self::SnmpStatus { .. } | Self::Decode(_)
        )
    }

    /// Returns `true` for connect and authentication failures.
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Resolve { .. } | Self::Authentication { .. }
        )
    }

    /// Returns `true` if this error is a timeout, whichever layer raised it.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::NoResponse { .. } => true,
            Self::Io(e) | Self::Connect { source: e, .. } => is_io_timeout(e),
            Self::Ssh(e) => is_ssh_timeout(e),
            _ => false,
        }
    }
}

/// libssh2 reports a blocking-mode timeout as `LIBSSH2_ERROR_TIMEOUT`.
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

pub(crate) fn is_ssh_timeout(err: &ssh2::Error) -> bool {
    matches!(err.code(), ssh2::ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT))
}

pub(crate) fn is_io_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}
