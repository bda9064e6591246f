// ── Runtime adapter configuration ──
//
// Describes *how* to talk to one stove. Carries the PIN and tuning
// knobs but never touches disk: `ember-config` (or a test) builds an
// `AdapterConfig` and hands it in.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Configuration for one stove connection.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Stove base URL (e.g., `http://192.168.1.50`).
    pub url: Url,
    /// Device PIN as printed on the stove's type plate.
    pub pin: SecretString,
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Consecutive failed polls before `info.connection` drops to false.
    pub error_threshold: u32,
    /// Known hardware/software combinations, keyed `"<hw>_<sw>"`.
    /// Only entries set to `true` count as supported.
    pub supported: HashMap<String, bool>,
}

impl AdapterConfig {
    /// Config with defaults for everything but address and PIN.
    pub fn new(url: Url, pin: SecretString) -> Self {
        Self {
            url,
            pin,
            poll_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            error_threshold: 3,
            supported: HashMap::new(),
        }
    }

    /// Whether `hw`/`sw` appears in the allow-list as supported.
    pub fn is_supported(&self, hw: &str, sw: &str) -> bool {
        self.supported
            .get(&format!("{hw}_{sw}"))
            .copied()
            .unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval.is_zero() {
            return Err(CoreError::Config {
                message: "poll interval must be at least one second".into(),
            });
        }
        if !matches!(self.url.scheme(), "http" | "https") {
            return Err(CoreError::Config {
                message: format!("unsupported URL scheme '{}'", self.url.scheme()),
            });
        }
        if self.url.host_str().is_none() {
            return Err(CoreError::Config {
                message: format!("URL '{}' has no host", self.url),
            });
        }
        Ok(())
    }
}
