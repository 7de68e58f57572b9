//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fleetwall_config::ConfigError;
use fleetwall_core::{CoreError, ExecutionKind};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach {device}: {reason}")]
    #[diagnostic(
        code(fleetwall::connection_failed),
        help(
            "Check that the device is up and its management port is reachable.\n\
             Try: fleetwall devices probe {device}"
        )
    )]
    ConnectionFailed { device: String, reason: String },

    #[error("Timed out talking to {device}: {message}")]
    #[diagnostic(
        code(fleetwall::timeout),
        help("Raise the matching [timeouts] value in the config, or check the device load.")
    )]
    Timeout { device: String, message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed on {device}: {message}")]
    #[diagnostic(
        code(fleetwall::auth_failed),
        help(
            "Verify the username and password for this device.\n\
             Run: fleetwall config set-password <device-id>"
        )
    )]
    AuthFailed { device: String, message: String },

    #[error("No {secret} configured for device '{device}'")]
    #[diagnostic(
        code(fleetwall::no_credentials),
        help(
            "Store one with: fleetwall config set-password {device}\n\
             Or set {secret}_env / {secret} on the device in the config file."
        )
    )]
    NoCredentials { device: String, secret: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(fleetwall::not_found),
        help("Run: fleetwall {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Execution ────────────────────────────────────────────────────

    #[error("Command on {device} failed ({kind}): {message}")]
    #[diagnostic(code(fleetwall::command_failed))]
    CommandFailed {
        device: String,
        kind: String,
        message: String,
    },

    #[error("{message}")]
    #[diagnostic(code(fleetwall::operation_failed))]
    OperationFailed { message: String },

    #[error("{device} does not support {operation}")]
    #[diagnostic(
        code(fleetwall::unsupported),
        help("Run: fleetwall devices show {device} to see what this device supports")
    )]
    Unsupported { device: String, operation: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetwall::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file not found or lists no devices")]
    #[diagnostic(
        code(fleetwall::no_config),
        help(
            "Add a device with: fleetwall config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(fleetwall::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(fleetwall::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Internal / IO ────────────────────────────────────────────────

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(fleetwall::render))]
    Render(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(fleetwall::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Connectivity { device, reason } => Self::ConnectionFailed { device, reason },

            CoreError::AuthenticationFailed { device, message } => {
                Self::AuthFailed { device, message }
            }

            CoreError::Execution {
                device,
                kind: ExecutionKind::Timeout,
                message,
            } => Self::Timeout { device, message },

            CoreError::Execution {
                device,
                kind,
                message,
            } => Self::CommandFailed {
                device,
                kind: kind.to_string(),
                message,
            },

            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::DeviceNotFound { identifier } => Self::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "devices list".into(),
            },

            CoreError::Unsupported { device, operation } => Self::Unsupported { device, operation },

            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { device, secret } => Self::NoCredentials {
                device,
                secret: secret.to_string(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(Box::new(other)),
        }
    }
}
