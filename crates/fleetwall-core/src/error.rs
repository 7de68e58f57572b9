// ── Core error types ──
//
// User-facing errors from fleetwall-core. Consumers never see libssh2
// codes or BER decode failures directly: `CoreError::transport` folds
// transport-layer errors into connectivity and execution variants.
//
// Parse failures are not errors at this level. Decoders skip and count
// bad lines, and "nothing matched" is a successful `Outcome`.

use strum::Display;
use thiserror::Error;

/// Which part of a remote call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ExecutionKind {
    /// The call did not finish within its timeout class.
    Timeout,
    /// The session or socket broke mid-call.
    Transport,
    /// The device ran the command and reported a failure.
    RemoteCommand,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connectivity ─────────────────────────────────────────────────
    #[error("Cannot reach device {device}: {reason}")]
    Connectivity { device: String, reason: String },

    #[error("Authentication failed on {device}: {message}")]
    AuthenticationFailed { device: String, message: String },

    // ── Execution ────────────────────────────────────────────────────
    #[error("Command on {device} failed ({kind}): {message}")]
    Execution {
        device: String,
        kind: ExecutionKind,
        message: String,
    },

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Device {device} does not support {operation}")]
    Unsupported { device: String, operation: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(device: &str, operation: &str) -> Self {
        Self::Unsupported {
            device: device.to_owned(),
            operation: operation.to_owned(),
        }
    }

    /// Whether the session that produced this error must be evicted.
    ///
    /// Timeouts count: partial CLI state after an abandoned command is
    /// unknown. Remote command failures leave the session usable.
    pub fn should_evict(&self) -> bool {
        match self {
            Self::Connectivity { .. } | Self::AuthenticationFailed { .. } => true,
            Self::Execution { kind, .. } => {
                matches!(kind, ExecutionKind::Timeout | ExecutionKind::Transport)
            }
            _ => false,
        }
    }

    /// Whether the error is in the connectivity class (unreachable or
    /// rejected credentials).
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. } | Self::AuthenticationFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl CoreError {
    /// Translate a transport error raised while talking to `device`.
    pub fn transport(device: &str, err: fleetwall_transport::Error) -> Self {
        use fleetwall_transport::Error as T;

        let device = device.to_owned();
        match err {
            T::Authentication { user, message } => Self::AuthenticationFailed {
                device,
                message: format!("user '{user}': {message}"),
            },
            ref e if e.is_connect() => Self::Connectivity {
                device,
                reason: e.to_string(),
            },
            ref e if e.is_timeout() => Self::Execution {
                device,
                kind: ExecutionKind::Timeout,
                message: e.to_string(),
            },
            ref e @ (T::SnmpStatus { .. } | T::Decode(_) | T::InvalidOid(_)) => Self::Execution {
                device,
                kind: ExecutionKind::RemoteCommand,
                message: e.to_string(),
            },
            e => Self::Execution {
                device,
                kind: ExecutionKind::Transport,
                message: e.to_string(),
            },
        }
    }

    /// Translate a worker-pool failure around a call to `device`.
    pub(crate) fn worker(device: &str, err: crate::worker::WorkerError) -> Self {
        use crate::worker::WorkerError as W;

        match err {
            W::TimedOut(after) => Self::Execution {
                device: device.to_owned(),
                kind: ExecutionKind::Timeout,
                message: format!("no reply within {after:?}"),
            },
            W::Panicked(msg) => Self::Execution {
                device: device.to_owned(),
                kind: ExecutionKind::Transport,
                message: msg,
            },
            W::Closed => Self::Internal("worker pool is closed".into()),
        }
    }

    /// Session creation failures always surface as connectivity errors.
    pub(crate) fn connect_failed(device: &str, err: fleetwall_transport::Error) -> Self {
        match Self::transport(device, err) {
            auth @ Self::AuthenticationFailed { .. } => auth,
            other => Self::Connectivity {
                device: device.to_owned(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_evict_but_remote_failures_do_not() {
        let timeout = CoreError::Execution {
            device: "r1".into(),
            kind: ExecutionKind::Timeout,
            message: "slow".into(),
        };
        let remote = CoreError::Execution {
            device: "r1".into(),
            kind: ExecutionKind::RemoteCommand,
            message: "bad".into(),
        };
        assert!(timeout.should_evict());
        assert!(!remote.should_evict());
        assert!(!CoreError::validation("x").should_evict());
    }

    #[test]
    fn connect_failure_maps_to_connectivity() {
        let err = fleetwall_transport::Error::Connect {
            addr: "10.0.0.1:22".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        let mapped = CoreError::connect_failed("r1", err);
        assert!(mapped.is_connectivity());
        assert!(mapped.should_evict());
    }

    #[test]
    fn auth_failure_keeps_its_variant() {
        let err = fleetwall_transport::Error::Authentication {
            user: "admin".into(),
            message: "denied".into(),
        };
        assert!(matches!(
            CoreError::connect_failed("r1", err),
            CoreError::AuthenticationFailed { .. }
        ));
    }

    #[test]
    fn snmp_status_is_a_remote_failure() {
        let err = fleetwall_transport::Error::SnmpStatus { status: 2, index: 1 };
        assert!(matches!(
            CoreError::transport("sw1", err),
            CoreError::Execution {
                kind: ExecutionKind::RemoteCommand,
                ..
            }
        ));
    }
}
