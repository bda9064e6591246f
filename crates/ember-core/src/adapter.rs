// ── Adapter ──
//
// Lifecycle of one stove connection: periodic status polls, nonce
// freshness, command dispatch from host writes, and health publication.
// Everything mutable sits in a `SessionState` behind a mutex; the poll
// cycle itself is serialized by a second mutex so that a command's nonce
// refresh and the timer never run two cycles at once.

use std::sync::Arc;

use ember_api::status::truthy;
use ember_api::{DeviceClient, StatusDocument, TransportConfig};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{CommandPoint, DeviceCommand};
use crate::config::AdapterConfig;
use crate::error::CoreError;
use crate::host::{Host, StateChange};
use crate::session::{Health, SessionSnapshot, SessionState};
use crate::sync::{ECO_EDITABLE_ID, ROOT, SyncOutcome, discover_objects, host_error, sync_state};

/// One stove, mirrored into one host.
///
/// Cheaply cloneable via `Arc<AdapterInner>`. Construct with
/// [`new`](Self::new), then either drive it with [`run`](Self::run) or
/// call [`poll_cycle`](Self::poll_cycle) / [`dispatch`](Self::dispatch)
/// directly.
pub struct Adapter<H: Host> {
    inner: Arc<AdapterInner<H>>,
}

impl<H: Host> Clone for Adapter<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AdapterInner<H: Host> {
    config: AdapterConfig,
    client: DeviceClient,
    host: Arc<H>,
    session: Mutex<SessionState>,
    /// Held for the duration of a poll cycle.
    cycle: Mutex<()>,
    health: watch::Sender<Health>,
}

impl<H: Host> Adapter<H> {
    /// Validate `config` and build the HTTP client. Does not touch the
    /// network.
    pub fn new(config: AdapterConfig, host: Arc<H>) -> Result<Self, CoreError> {
        config.validate()?;
        let transport = TransportConfig::default().with_timeout(config.timeout);
        let client = DeviceClient::new(config.url.clone(), &transport)?;
        Ok(Self::with_client(config, host, client))
    }

    /// Build an adapter around an existing client.
    pub fn with_client(config: AdapterConfig, host: Arc<H>, client: DeviceClient) -> Self {
        let session = SessionState::new(&config.pin, config.error_threshold);
        let (health, _) = watch::channel(Health::default());
        Self {
            inner: Arc::new(AdapterInner {
                config,
                client,
                host,
                session: Mutex::new(session),
                cycle: Mutex::new(()),
                health,
            }),
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &Arc<H> {
        &self.inner.host
    }

    // ── Poll cycle ───────────────────────────────────────────────────

    /// Fetch the status document and mirror it into the host.
    ///
    /// Health points are published after every cycle, successful or not.
    /// Host failures and unsupported firmware terminate the adapter.
    pub async fn poll_cycle(&self) -> Result<SyncOutcome, CoreError> {
        let _cycle = self.inner.cycle.lock().await;
        self.poll_cycle_locked().await
    }

    async fn poll_cycle_locked(&self) -> Result<SyncOutcome, CoreError> {
        if self.is_terminated().await {
            return Err(CoreError::Terminated);
        }

        self.inner.session.lock().await.record_cycle_start(Instant::now());
        let result = self.fetch_and_sync().await;
        if let Err(e) = &result {
            if e.is_fatal() {
                error!(error = %e, "stopping adapter permanently");
                self.inner.session.lock().await.terminate();
            }
        }

        self.publish_health().await;
        result
    }

    async fn fetch_and_sync(&self) -> Result<SyncOutcome, CoreError> {
        let doc = self.fetch().await?;
        let outcome = sync_state(self.inner.host.as_ref(), &doc, "").await?;
        self.apply_outcome(&outcome).await?;
        Ok(outcome)
    }

    /// Poll the stove, counting the result towards `info.connection`.
    async fn fetch(&self) -> Result<StatusDocument, CoreError> {
        match self.inner.client.poll_status().await {
            Ok(doc) => {
                self.observe_response(&doc).await;
                Ok(doc)
            }
            Err(e) => {
                let errors = self.inner.session.lock().await.record_poll_failure();
                warn!(error = %e, consecutive_errors = errors, "status poll failed");
                Err(e.into())
            }
        }
    }

    /// Nonce fast-path: the session secret is usable before the full
    /// sync has walked the document.
    async fn observe_response(&self, doc: &StatusDocument) {
        let mut session = self.inner.session.lock().await;
        session.record_poll_success();
        if let Some(nonce) = doc.nonce() {
            session.observe_nonce(&nonce, Instant::now());
        }
    }

    async fn apply_outcome(&self, outcome: &SyncOutcome) -> Result<(), CoreError> {
        let mut session = self.inner.session.lock().await;

        if let Some(nonce) = &outcome.nonce {
            session.observe_nonce(nonce, Instant::now());
        }
        if let Some(hw) = &outcome.hw_version {
            session.set_hw_version(hw.clone());
        }
        if let Some(sw) = &outcome.sw_version {
            session.set_sw_version(sw.clone());
        }
        if !outcome.missing.is_empty() {
            session.mark_missing_state();
        }

        if let Some((hw, sw)) = session.versions() {
            if !self.inner.config.is_supported(hw, sw) {
                error!(
                    hw_version = hw,
                    sw_version = sw,
                    "hardware/software combination has not been tested with this adapter; \
                     please open an issue with both versions so it can be added"
                );
                return Err(CoreError::UnsupportedDevice {
                    hw: hw.to_owned(),
                    sw: sw.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Write changed health points to the host and the watch channel.
    async fn publish_health(&self) {
        let (changes, health) = {
            let mut session = self.inner.session.lock().await;
            (session.take_health_changes(), session.health())
        };

        for (point, value) in changes {
            let id = point.as_ref();
            if let Err(e) = self.inner.host.set_state(id, Value::Bool(value), true).await {
                warn!(id, error = %e, "failed to publish health point");
                self.inner.session.lock().await.reset_published(point);
            }
        }

        self.inner.health.send_replace(health);
    }

    // ── Provisioning ─────────────────────────────────────────────────

    /// Create a host object for every point the stove reports that the
    /// host does not know yet, plus the command points.
    ///
    /// For hosts that are not provisioned out of band. Polls through the
    /// session, so a failure counts towards `info.connection` and health
    /// is published either way. A host failure terminates the adapter.
    /// Existing objects are left untouched.
    pub async fn provision_objects(&self) -> Result<usize, CoreError> {
        let _cycle = self.inner.cycle.lock().await;
        if self.is_terminated().await {
            return Err(CoreError::Terminated);
        }

        let result = self.create_missing_objects().await;
        if let Err(e) = &result {
            if e.is_fatal() {
                error!(error = %e, "stopping adapter permanently");
                self.inner.session.lock().await.terminate();
            }
        }
        self.publish_health().await;
        let created = result?;
        info!(created, "provisioned state objects");
        Ok(created)
    }

    async fn create_missing_objects(&self) -> Result<usize, CoreError> {
        let doc = self.fetch().await?;
        let host = self.inner.host.as_ref();
        let mut created = 0;
        for (id, meta) in discover_objects(&doc) {
            if host.get_object(&id).await.map_err(host_error(&id))?.is_none() {
                host.set_object(&id, meta).await.map_err(host_error(&id))?;
                created += 1;
            }
        }
        Ok(created)
    }

    // ── Nonce freshness ──────────────────────────────────────────────

    /// Make sure a usable session secret exists, polling if the nonce is
    /// unset or expired.
    ///
    /// Concurrent callers share one refresh: whoever waited for the cycle
    /// lock re-checks freshness before polling again.
    pub async fn ensure_fresh(&self) -> Result<(), CoreError> {
        if !self.nonce_is_stale().await {
            return Ok(());
        }

        let _cycle = self.inner.cycle.lock().await;
        if !self.nonce_is_stale().await {
            debug!("nonce refreshed by a concurrent cycle");
            return Ok(());
        }

        debug!("nonce stale, polling for a new one");
        if let Err(e) = self.poll_cycle_locked().await {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(error = %e, "nonce refresh failed");
        }

        let session = self.inner.session.lock().await;
        if session.session_secret().is_none() {
            return Err(CoreError::NonceUnavailable);
        }
        if session.is_nonce_stale(Instant::now()) {
            warn!("nonce could not be refreshed, sending with the expired one");
        }
        Ok(())
    }

    async fn nonce_is_stale(&self) -> bool {
        self.inner.session.lock().await.is_nonce_stale(Instant::now())
    }

    async fn session_secret(&self) -> Result<SecretString, CoreError> {
        self.inner
            .session
            .lock()
            .await
            .session_secret()
            .cloned()
            .ok_or(CoreError::NonceUnavailable)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send a command to the stove.
    ///
    /// On success the command point is acknowledged with the requested
    /// value. Every command that reaches the network is followed by an
    /// immediate poll cycle, whatever the outcome.
    pub async fn dispatch(&self, command: DeviceCommand) -> Result<(), CoreError> {
        let point = command.point();
        let id = point.as_ref();

        if self.is_terminated().await {
            return Err(CoreError::Terminated);
        }

        if point == CommandPoint::EcoMode && !self.eco_editable().await? {
            return Err(CoreError::Validation {
                message: "eco mode is not editable in the stove's current state".into(),
            });
        }

        self.ensure_fresh().await?;
        let secret = self.session_secret().await?;

        info!(id, value = %command.requested(), "sending command");
        let outcome = match self.inner.client.send_command(command.body(), &secret).await {
            Ok(()) => self.acknowledge(&command).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = self.poll_cycle().await {
            debug!(error = %e, "post-command poll failed");
        }
        outcome
    }

    async fn acknowledge(&self, command: &DeviceCommand) -> Result<(), CoreError> {
        let point = command.point();
        let id = point.as_ref();
        self.inner
            .host
            .set_state(id, command.requested().clone(), true)
            .await
            .map_err(|e| CoreError::Host {
                id: id.to_owned(),
                message: e.to_string(),
            })?;
        debug!(id, "command acknowledged");
        Ok(())
    }

    /// The last `device.meta.eco_editable` value the host holds. Absent
    /// means not editable.
    async fn eco_editable(&self) -> Result<bool, CoreError> {
        let state = self
            .inner
            .host
            .get_state(ECO_EDITABLE_ID)
            .await
            .map_err(|e| CoreError::Host {
                id: ECO_EDITABLE_ID.to_owned(),
                message: e.to_string(),
            })?;
        Ok(state.and_then(|s| truthy(&s.val)).unwrap_or(false))
    }

    /// React to a host write. Acknowledged writes and non-command points
    /// are ignored; invalid values are dropped with a warning.
    pub async fn handle_state_change(&self, change: StateChange) {
        let command = match DeviceCommand::from_state_change(&change) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                warn!(id = %change.id, error = %e, "dropping invalid command");
                return;
            }
        };
        if let Err(e) = self.dispatch(command).await {
            warn!(id = %change.id, error = %e, "command not applied");
        }
    }

    // ── Run loop ─────────────────────────────────────────────────────

    /// Poll on the configured interval and relay host writes until
    /// `cancel` fires.
    ///
    /// The first poll happens immediately. Once terminated the timer is
    /// disarmed but the loop keeps draining host writes (dropping them)
    /// until cancelled.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), CoreError> {
        let pattern = format!("{ROOT}.*");
        let mut changes = self
            .inner
            .host
            .subscribe_states(&pattern)
            .await
            .map_err(|e| CoreError::Host {
                id: pattern.clone(),
                message: e.to_string(),
            })?;

        let interval = self.inner.config.poll_interval;
        info!(url = %self.inner.config.url, ?interval, "adapter started");

        let mut deadline = Instant::now();
        loop {
            let armed = !self.is_terminated().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep_until(deadline), if armed => {
                    deadline = Instant::now() + interval;
                    if let Err(e) = self.poll_cycle().await {
                        debug!(error = %e, "poll cycle failed");
                    }
                }
                change = changes.recv() => {
                    let Some(change) = change else {
                        warn!("host subscription closed");
                        break;
                    };
                    self.handle_state_change(change).await;
                    // A command-triggered cycle restarts the interval.
                    if let Some(at) = self.inner.session.lock().await.last_cycle_start() {
                        deadline = deadline.max(at + interval);
                    }
                }
            }
        }

        info!("adapter stopped");
        Ok(())
    }

    // ── State observation ────────────────────────────────────────────

    /// Subscribe to health changes.
    pub fn health(&self) -> watch::Receiver<Health> {
        self.inner.health.subscribe()
    }

    pub async fn is_terminated(&self) -> bool {
        self.inner.session.lock().await.is_terminated()
    }

    pub async fn session_snapshot(&self) -> SessionSnapshot {
        self.inner.session.lock().await.snapshot(Instant::now())
    }
}
