use thiserror::Error;

/// Top-level error type for the `ember-api` crate.
///
/// Covers every failure mode of talking to the stove: transport,
/// unexpected HTTP status, and malformed status documents.
/// `ember-core` maps these into adapter-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── Device API ──────────────────────────────────────────────────
    /// The stove answered with something other than HTTP 200.
    #[error("Unexpected HTTP {status} from device: {body}")]
    UnexpectedStatus { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying on the
    /// next poll cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::UnexpectedStatus { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the device rejected the session secret.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { status: 401 | 403, .. })
    }

    /// Map a reqwest error, folding timeouts into [`Error::Timeout`].
    pub(crate) fn from_send(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::Transport(err)
        }
    }
}

/// First 200 characters of a response body, for error messages.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_are_transient() {
        let err = Error::UnexpectedStatus {
            status: 500,
            body: String::new(),
        };
        assert!(err.is_transient());
        assert!(!err.is_auth_rejected());
    }

    #[test]
    fn forbidden_is_auth_rejection() {
        let err = Error::UnexpectedStatus {
            status: 403,
            body: "bad pin".into(),
        };
        assert!(err.is_auth_rejected());
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let body = "é".repeat(300);
        assert_eq!(preview(&body).chars().count(), 200);
    }

    #[test]
    fn deserialization_is_not_transient() {
        let err = Error::Deserialization {
            message: "expected object".into(),
            body: "[]".into(),
        };
        assert!(!err.is_transient());
    }
}
