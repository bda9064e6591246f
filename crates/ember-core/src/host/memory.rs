// ── In-process host ──
//
// `DashMap`-backed implementation of [`Host`] for the `ember` binary and
// for tests. Objects are seeded explicitly (the adapter never creates
// them). Every successful `set_state` is recorded in a write log and
// fanned out to matching subscribers.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use super::{Host, HostError, ObjectMeta, State, StateChange, pattern_matches};

/// One `set_state` call, as recorded in the write log.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub id: String,
    pub val: Value,
    pub ack: bool,
}

#[derive(Default)]
pub struct MemoryHost {
    states: DashMap<String, State>,
    objects: DashMap<String, ObjectMeta>,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<StateChange>)>>,
    writes: Mutex<Vec<RecordedWrite>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) an object. Stands in for the platform's own
    /// object provisioning.
    pub fn insert_object(&self, id: impl Into<String>, meta: ObjectMeta) {
        self.objects.insert(id.into(), meta);
    }

    pub fn object(&self, id: &str) -> Option<ObjectMeta> {
        self.objects.get(id).map(|r| r.value().clone())
    }

    pub fn state(&self, id: &str) -> Option<State> {
        self.states.get(id).map(|r| r.value().clone())
    }

    /// Current value of a state, ignoring the ack flag.
    pub fn value(&self, id: &str) -> Option<Value> {
        self.states.get(id).map(|r| r.value().val.clone())
    }

    /// All states, sorted by id.
    pub fn states(&self) -> Vec<(String, State)> {
        let mut all: Vec<_> = self
            .states
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// A user write (`ack = false`), as a UI or script would issue it.
    pub fn user_write(&self, id: &str, val: Value) {
        self.store(id, val, false);
    }

    /// Everything written through `set_state` so far.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().expect("write log lock poisoned").clone()
    }

    /// Writes to one id.
    pub fn writes_to(&self, id: &str) -> Vec<RecordedWrite> {
        self.writes()
            .into_iter()
            .filter(|w| w.id == id)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().expect("write log lock poisoned").clear();
    }

    /// Make every subsequent read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), HostError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("reads disabled".into()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), HostError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    fn store(&self, id: &str, val: Value, ack: bool) {
        let state = State { val, ack };
        self.states.insert(id.to_owned(), state.clone());

        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        // Dropped receivers are pruned on the way.
        subscribers.retain(|(pattern, tx)| {
            if !pattern_matches(pattern, id) {
                return !tx.is_closed();
            }
            tx.send(StateChange {
                id: id.to_owned(),
                state: state.clone(),
            })
            .is_ok()
        });
    }
}

#[async_trait]
impl Host for MemoryHost {
    async fn get_state(&self, id: &str) -> Result<Option<State>, HostError> {
        self.check_reads()?;
        Ok(self.state(id))
    }

    async fn set_state(&self, id: &str, val: Value, ack: bool) -> Result<(), HostError> {
        self.check_writes()?;
        trace!(id, %val, ack, "set_state");
        self.writes
            .lock()
            .expect("write log lock poisoned")
            .push(RecordedWrite {
                id: id.to_owned(),
                val: val.clone(),
                ack,
            });
        self.store(id, val, ack);
        Ok(())
    }

    async fn get_object(&self, id: &str) -> Result<Option<ObjectMeta>, HostError> {
        self.check_reads()?;
        Ok(self.object(id))
    }

    async fn set_object(&self, id: &str, meta: ObjectMeta) -> Result<(), HostError> {
        self.check_writes()?;
        self.objects.insert(id.to_owned(), meta);
        Ok(())
    }

    async fn subscribe_states(
        &self,
        pattern: &str,
    ) -> Result<mpsc::UnboundedReceiver<StateChange>, HostError> {
        if pattern.is_empty() || pattern.trim_end_matches('*').contains('*') {
            return Err(HostError::InvalidPattern(pattern.to_owned()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push((pattern.to_owned(), tx));
        Ok(rx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::ValueType;
    use serde_json::json;

    #[tokio::test]
    async fn objects_are_not_created_by_state_writes() {
        let host = MemoryHost::new();
        host.set_state("device.prg", json!(true), true).await.unwrap();

        assert!(host.get_object("device.prg").await.unwrap().is_none());
        assert_eq!(host.value("device.prg"), Some(json!(true)));
    }

    #[tokio::test]
    async fn subscriptions_see_matching_writes_only() {
        let host = MemoryHost::new();
        let mut rx = host.subscribe_states("device.*").await.unwrap();

        host.set_state("info.connection", json!(true), true).await.unwrap();
        host.user_write("device.sp_temp", json!(22));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.id, "device.sp_temp");
        assert!(!change.state.ack);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejects_inner_wildcards() {
        let host = MemoryHost::new();
        assert!(matches!(
            host.subscribe_states("device.*.x").await,
            Err(HostError::InvalidPattern(_))
        ));
    }

    #[tokio::test]
    async fn failure_injection() {
        let host = MemoryHost::new();
        host.insert_object("device.prg", ObjectMeta::writable("prg", ValueType::Boolean));

        host.set_fail_writes(true);
        assert!(host.set_state("device.prg", json!(true), true).await.is_err());
        assert!(host.writes().is_empty());

        host.set_fail_reads(true);
        assert!(host.get_object("device.prg").await.is_err());
    }
}
