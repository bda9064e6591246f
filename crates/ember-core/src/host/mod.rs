// ── Host state-store collaborator ──
//
// The adapter never owns the state it mirrors. A host platform keeps
// named state values (with an acknowledgement flag) and per-object
// metadata, and notifies subscribers about foreign writes. This trait is
// the whole surface the adapter needs from it.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryHost;

/// A stored state value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub val: Value,
    /// `true` when the value was confirmed by the device (written by the
    /// adapter); `false` for pending writes from users.
    pub ack: bool,
}

/// Data type of a state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    String,
    Array,
    #[default]
    Mixed,
}

impl ValueType {
    /// Best guess for a freshly discovered value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Null | Value::Object(_) => Self::Mixed,
        }
    }
}

/// Metadata of a host object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub read: bool,
    pub write: bool,
}

impl ObjectMeta {
    /// Read-only object of the given type.
    pub fn read_only(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            read: true,
            write: false,
        }
    }

    /// Readable and writable object of the given type.
    pub fn writable(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            write: true,
            ..Self::read_only(name, value_type)
        }
    }
}

/// A write observed by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub id: String,
    pub state: State,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid subscription pattern '{0}'")]
    InvalidPattern(String),
}

/// The host platform's state store.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    async fn get_state(&self, id: &str) -> Result<Option<State>, HostError>;

    async fn set_state(&self, id: &str, val: Value, ack: bool) -> Result<(), HostError>;

    async fn get_object(&self, id: &str) -> Result<Option<ObjectMeta>, HostError>;

    async fn set_object(&self, id: &str, meta: ObjectMeta) -> Result<(), HostError>;

    /// Subscribe to writes on ids matching `pattern` (`*` matches any
    /// suffix). Every write is delivered, acknowledged or not.
    async fn subscribe_states(
        &self,
        pattern: &str,
    ) -> Result<mpsc::UnboundedReceiver<StateChange>, HostError>;
}

/// Glob match supporting a single trailing `*`, or an exact id.
pub fn pattern_matches(pattern: &str, id: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => id.starts_with(prefix),
        None => pattern == id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patterns() {
        assert!(pattern_matches("device.*", "device.prg"));
        assert!(pattern_matches("device.*", "device.meta.nonce"));
        assert!(!pattern_matches("device.*", "info.connection"));
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("device.prg", "device.prg"));
        assert!(!pattern_matches("device.prg", "device.prg2"));
    }

    #[test]
    fn value_type_of_json() {
        assert_eq!(ValueType::of(&json!(true)), ValueType::Boolean);
        assert_eq!(ValueType::of(&json!(21.5)), ValueType::Number);
        assert_eq!(ValueType::of(&json!("x")), ValueType::String);
        assert_eq!(ValueType::of(&json!(null)), ValueType::Mixed);
        assert_eq!(ValueType::Number.to_string(), "number");
    }
}
