//! Session handling, state synchronization and the poll loop between
//! `ember-api` and a host state store.
//!
//! - **[`Adapter`]**: central facade for one stove. [`run()`](Adapter::run)
//!   polls on a fixed interval and relays host writes as device commands;
//!   [`provision_objects()`](Adapter::provision_objects) creates host
//!   objects for hosts that are not provisioned out of band.
//!
//! - **[`SessionState`]**: nonce, derived HSPIN, firmware versions and the
//!   counters behind the `info.*` health points. One per adapter.
//!
//! - **[`sync_state`]**: walks a status document and publishes every
//!   changed leaf as a `device.<path>` state point. [`flatten`] is the
//!   pure walk.
//!
//! - **[`Host`]**: the narrow async interface to the platform that owns the
//!   state objects. [`MemoryHost`] implements it in-process.
//!
//! - **[`DeviceCommand`]**: validated writes to `device.prg`,
//!   `device.sp_temp` and `device.eco_mode`.

pub mod adapter;
pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod session;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use adapter::Adapter;
pub use command::{CommandPoint, DeviceCommand};
pub use config::AdapterConfig;
pub use error::CoreError;
pub use host::{Host, HostError, MemoryHost, ObjectMeta, State, StateChange, ValueType};
pub use session::{Health, HealthPoint, NONCE_EXPIRY, SessionSnapshot, SessionState};
pub use sync::{Leaf, SyncOutcome, discover_objects, flatten, sync_state};
