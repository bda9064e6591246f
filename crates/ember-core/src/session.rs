// ── Per-connection session state ──
//
// Everything mutable about one stove connection lives here: the nonce
// and the HSPIN derived from it, cached firmware versions, and the
// counters behind the health points. The adapter owns exactly one
// `SessionState` behind a mutex.

use std::time::Duration;

use ember_api::{PinHash, derive_session_secret};
use secrecy::SecretString;
use strum::AsRefStr;
use tokio::time::Instant;
use tracing::debug;

/// A nonce older than this must be refreshed before the next write.
pub const NONCE_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Health points published to the host under `info.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum HealthPoint {
    #[strum(serialize = "info.connection")]
    Connection,
    #[strum(serialize = "info.missing_state")]
    MissingState,
    #[strum(serialize = "info.terminated")]
    Terminated,
}

/// User-visible health of the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Health {
    /// The stove answered recently enough.
    pub connected: bool,
    /// At least one state point had no host object. Sticky.
    pub missing_state: bool,
    /// Polling has stopped for good. Terminal.
    pub terminated: bool,
}

impl HealthPoint {
    pub const ALL: [Self; 3] = [Self::Connection, Self::MissingState, Self::Terminated];

    fn slot(self) -> usize {
        match self {
            Self::Connection => 0,
            Self::MissingState => 1,
            Self::Terminated => 2,
        }
    }
}

impl Health {
    pub fn get(&self, point: HealthPoint) -> bool {
        match point {
            HealthPoint::Connection => self.connected,
            HealthPoint::MissingState => self.missing_state,
            HealthPoint::Terminated => self.terminated,
        }
    }
}

/// Secret-free view of the session, for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub nonce: Option<String>,
    pub nonce_age: Option<Duration>,
    pub hw_version: Option<String>,
    pub sw_version: Option<String>,
    pub consecutive_errors: u32,
    pub health: Health,
}

pub struct SessionState {
    pin_hash: PinHash,
    nonce: Option<String>,
    nonce_updated_at: Option<Instant>,
    session_secret: Option<SecretString>,
    hw_version: Option<String>,
    sw_version: Option<String>,
    consecutive_errors: u32,
    error_threshold: u32,
    ever_connected: bool,
    missing_state: bool,
    terminated: bool,
    last_cycle_start: Option<Instant>,
    /// Last value written per health point; `None` until first publish.
    published: [Option<bool>; 3],
}

impl SessionState {
    pub fn new(pin: &SecretString, error_threshold: u32) -> Self {
        Self {
            pin_hash: PinHash::from_pin(pin),
            nonce: None,
            nonce_updated_at: None,
            session_secret: None,
            hw_version: None,
            sw_version: None,
            consecutive_errors: 0,
            error_threshold: error_threshold.max(1),
            ever_connected: false,
            missing_state: false,
            terminated: false,
            last_cycle_start: None,
            published: [None; 3],
        }
    }

    // ── Nonce ────────────────────────────────────────────────────────

    /// Record a nonce seen in a status document.
    ///
    /// Only a *different* nonce resets the timestamp and rotates the
    /// session secret. Returns `true` when it did.
    pub fn observe_nonce(&mut self, nonce: &str, now: Instant) -> bool {
        if self.nonce.as_deref() == Some(nonce) {
            return false;
        }
        debug!("nonce rotated");
        self.session_secret = Some(derive_session_secret(nonce, &self.pin_hash));
        self.nonce = Some(nonce.to_owned());
        self.nonce_updated_at = Some(now);
        true
    }

    /// Stale when unset or strictly older than [`NONCE_EXPIRY`].
    pub fn is_nonce_stale(&self, now: Instant) -> bool {
        match self.nonce_updated_at {
            Some(at) if self.nonce.is_some() => now.saturating_duration_since(at) > NONCE_EXPIRY,
            _ => true,
        }
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    /// HSPIN for the current nonce.
    pub fn session_secret(&self) -> Option<&SecretString> {
        self.session_secret.as_ref()
    }

    // ── Firmware versions ────────────────────────────────────────────

    pub fn set_hw_version(&mut self, version: String) {
        self.hw_version = Some(version);
    }

    pub fn set_sw_version(&mut self, version: String) {
        self.sw_version = Some(version);
    }

    /// Both versions, once known.
    pub fn versions(&self) -> Option<(&str, &str)> {
        Some((self.hw_version.as_deref()?, self.sw_version.as_deref()?))
    }

    // ── Health ───────────────────────────────────────────────────────

    pub fn record_cycle_start(&mut self, at: Instant) {
        self.last_cycle_start = Some(at);
    }

    /// When the most recent poll cycle began, from any trigger.
    pub fn last_cycle_start(&self) -> Option<Instant> {
        self.last_cycle_start
    }

    pub fn record_poll_success(&mut self) {
        self.consecutive_errors = 0;
        self.ever_connected = true;
    }

    /// Returns the new consecutive-error count.
    pub fn record_poll_failure(&mut self) -> u32 {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.consecutive_errors
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn mark_missing_state(&mut self) {
        self.missing_state = true;
    }

    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn health(&self) -> Health {
        Health {
            connected: self.ever_connected && self.consecutive_errors < self.error_threshold,
            missing_state: self.missing_state,
            terminated: self.terminated,
        }
    }

    /// Health points whose value differs from what was last published.
    /// Marks the returned values as published.
    pub fn take_health_changes(&mut self) -> Vec<(HealthPoint, bool)> {
        let health = self.health();
        let mut changes = Vec::new();
        for point in HealthPoint::ALL {
            let value = health.get(point);
            let slot = &mut self.published[point.slot()];
            if *slot != Some(value) {
                *slot = Some(value);
                changes.push((point, value));
            }
        }
        changes
    }

    /// Forget what was published, e.g. after a failed host write.
    pub fn reset_published(&mut self, point: HealthPoint) {
        self.published[point.slot()] = None;
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            nonce: self.nonce.clone(),
            nonce_age: self
                .nonce_updated_at
                .map(|at| now.saturating_duration_since(at)),
            hw_version: self.hw_version.clone(),
            sw_version: self.sw_version.clone(),
            consecutive_errors: self.consecutive_errors,
            health: self.health(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn session() -> SessionState {
        SessionState::new(&SecretString::from("1234".to_owned()), 3)
    }

    #[tokio::test(start_paused = true)]
    async fn unset_nonce_is_stale() {
        let s = session();
        assert!(s.is_nonce_stale(Instant::now()));
        assert!(s.session_secret().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn nonce_expires_strictly_after_one_hour() {
        let mut s = session();
        s.observe_nonce("abc", Instant::now());

        tokio::time::advance(NONCE_EXPIRY).await;
        assert!(!s.is_nonce_stale(Instant::now()));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(s.is_nonce_stale(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn same_nonce_does_not_reset_timestamp() {
        let mut s = session();
        assert!(s.observe_nonce("abc", Instant::now()));

        tokio::time::advance(Duration::from_secs(3000)).await;
        assert!(!s.observe_nonce("abc", Instant::now()));

        tokio::time::advance(Duration::from_secs(700)).await;
        assert!(s.is_nonce_stale(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn secret_rotates_with_nonce() {
        let mut s = session();
        s.observe_nonce("n1", Instant::now());
        let first = s.session_secret().unwrap().expose_secret().to_owned();

        s.observe_nonce("n2", Instant::now());
        let second = s.session_secret().unwrap().expose_secret().to_owned();

        assert_ne!(first, second);
        assert_eq!(s.nonce(), Some("n2"));
    }

    #[tokio::test(start_paused = true)]
    async fn last_cycle_start_tracks_the_latest_cycle() {
        let mut s = session();
        assert!(s.last_cycle_start().is_none());

        let first = Instant::now();
        s.record_cycle_start(first);
        tokio::time::advance(Duration::from_secs(5)).await;
        let second = Instant::now();
        s.record_cycle_start(second);

        assert_eq!(s.last_cycle_start(), Some(second));
        assert_eq!(second - first, Duration::from_secs(5));
    }

    #[test]
    fn connection_follows_error_threshold() {
        let mut s = session();
        assert!(!s.health().connected);

        s.record_poll_success();
        assert!(s.health().connected);

        s.record_poll_failure();
        s.record_poll_failure();
        assert!(s.health().connected);

        assert_eq!(s.record_poll_failure(), 3);
        assert!(!s.health().connected);

        s.record_poll_success();
        assert!(s.health().connected);
    }

    #[test]
    fn health_changes_only_report_differences() {
        let mut s = session();
        assert_eq!(s.take_health_changes().len(), 3);
        assert!(s.take_health_changes().is_empty());

        s.mark_missing_state();
        assert_eq!(
            s.take_health_changes(),
            vec![(HealthPoint::MissingState, true)]
        );
        assert!(s.take_health_changes().is_empty());
    }

    #[test]
    fn health_point_ids() {
        assert_eq!(HealthPoint::Connection.as_ref(), "info.connection");
        assert_eq!(HealthPoint::MissingState.as_ref(), "info.missing_state");
        assert_eq!(HealthPoint::Terminated.as_ref(), "info.terminated");
    }

    #[test]
    fn versions_need_both_halves() {
        let mut s = session();
        s.set_hw_version("5".into());
        assert!(s.versions().is_none());
        s.set_sw_version("1.42".into());
        assert_eq!(s.versions(), Some(("5", "1.42")));
    }
}
