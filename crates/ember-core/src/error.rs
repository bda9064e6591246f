// ── Core error types ──
//
// Adapter-level errors. Consumers never match on reqwest errors or
// HTTP status codes directly: the `From<ember_api::Error>` impl folds
// transport failures into `Device`, keeping the original for display.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device errors ────────────────────────────────────────────────
    #[error("Device request failed: {0}")]
    Device(#[from] ember_api::Error),

    #[error("No nonce available -- the stove has not answered a status poll yet")]
    NonceUnavailable,

    #[error("Unsupported hardware/software combination: hw {hw}, sw {sw}")]
    UnsupportedDevice { hw: String, sw: String },

    // ── Host errors ──────────────────────────────────────────────────
    #[error("Host state store failed on '{id}': {message}")]
    Host { id: String, message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Adapter terminated -- polling has stopped permanently")]
    Terminated,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Returns `true` for failures that the next poll cycle may recover from.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Device(e) => e.is_transient(),
            Self::NonceUnavailable => true,
            _ => false,
        }
    }

    /// Returns `true` if this error must stop the adapter for good.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Host { .. } | Self::UnsupportedDevice { .. } | Self::Terminated
        )
    }
}
