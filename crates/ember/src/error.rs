//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ember_config::ConfigError;
use ember_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the stove")]
    #[diagnostic(
        code(ember::connection_failed),
        help(
            "Check that the stove is powered on and reachable on the local network.\n\
             Try: ember status --host <address> -v"
        )
    )]
    ConnectionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(ember::timeout),
        help("Increase timeout with --timeout or check the stove's WLAN module.")
    )]
    Timeout { seconds: u64 },

    #[error("Stove answered with HTTP {status}: {body}")]
    #[diagnostic(code(ember::device_error))]
    DeviceError { status: u16, body: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("The stove rejected the write (HTTP {status})")]
    #[diagnostic(
        code(ember::auth_failed),
        help(
            "Verify the PIN printed on the stove's type plate.\n\
             Run: ember config set-pin"
        )
    )]
    AuthFailed { status: u16 },

    #[error("No device PIN configured")]
    #[diagnostic(
        code(ember::no_pin),
        help(
            "Pass --pin, set EMBER_PIN, or store it with: ember config set-pin\n\
             The PIN is printed on the stove's type plate."
        )
    )]
    NoPin,

    #[error("The stove has not issued a nonce yet")]
    #[diagnostic(
        code(ember::no_nonce),
        help("Writes need at least one successful status poll. Check connectivity first.")
    )]
    NoNonce,

    // ── Device support ───────────────────────────────────────────────

    #[error("Stove firmware hw {hw} / sw {sw} is not in the supported list")]
    #[diagnostic(
        code(ember::unsupported_device),
        help(
            "If you are sure this combination works, allow it with:\n\
             ember config set supported.{hw}_{sw} true\n\
             and please open an issue so it can be added upstream."
        )
    )]
    UnsupportedDevice { hw: String, sw: String },

    #[error("The adapter has stopped polling")]
    #[diagnostic(code(ember::terminated), help("Check the log for the reason, then restart."))]
    Terminated,

    // ── Host ─────────────────────────────────────────────────────────

    #[error("State store failed on '{id}': {message}")]
    #[diagnostic(code(ember::host))]
    Host { id: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ember::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("No stove address configured")]
    #[diagnostic(
        code(ember::no_config),
        help(
            "Pass --host <address>, set EMBER_HOST, or create a config with:\n\
             ember config init --host <address>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(ember::config))]
    Config(Box<figment::Error>),

    #[error("Keyring error: {0}")]
    #[diagnostic(
        code(ember::keyring),
        help("Use `ember config init --plaintext` on systems without a keyring.")
    )]
    Keyring(String),

    #[error("Failed to write config: {0}")]
    #[diagnostic(code(ember::config_write))]
    ConfigWrite(String),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(ember::json))]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::DeviceError { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoPin | Self::NoNonce => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            Self::UnsupportedDevice { .. } | Self::Terminated => exit_code::UNSUPPORTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<ember_api::Error> for CliError {
    fn from(err: ember_api::Error) -> Self {
        match err {
            ember_api::Error::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            ember_api::Error::UnexpectedStatus { status, .. } if matches!(status, 401 | 403) => {
                CliError::AuthFailed { status }
            }
            ember_api::Error::UnexpectedStatus { status, body } => {
                CliError::DeviceError { status, body }
            }
            ember_api::Error::InvalidUrl(e) => CliError::Validation {
                field: "host".into(),
                reason: e.to_string(),
            },
            other => CliError::ConnectionFailed {
                source: Box::new(other),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Device(e) => e.into(),
            CoreError::NonceUnavailable => CliError::NoNonce,
            CoreError::UnsupportedDevice { hw, sw } => CliError::UnsupportedDevice { hw, sw },
            CoreError::Host { id, message } => CliError::Host { id, message },
            CoreError::Validation { message } => CliError::Validation {
                field: "command".into(),
                reason: message,
            },
            CoreError::Terminated => CliError::Terminated,
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoPin => CliError::NoPin,
            ConfigError::NoHost => CliError::NoConfig {
                path: ember_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Keyring(e) => CliError::Keyring(e.to_string()),
            ConfigError::Serialization(e) => CliError::ConfigWrite(e.to_string()),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
