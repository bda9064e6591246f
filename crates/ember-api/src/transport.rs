// Transport configuration for building the stove's reqwest::Client.
//
// The stove speaks plain HTTP on the local network and answers slowly
// while it is busy, so the only knobs are the request timeout and the
// user agent the vendor app identifies itself with.

use std::time::Duration;

/// User agent sent by the vendor's iOS app. The firmware does not check it,
/// but matching the app keeps our traffic indistinguishable from it.
pub const APP_USER_AGENT: &str = "ios";

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            user_agent: APP_USER_AGENT.to_owned(),
        }
    }
}

impl TransportConfig {
    /// Config with a custom request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| crate::error::Error::ClientBuild(e.to_string()))
    }
}
