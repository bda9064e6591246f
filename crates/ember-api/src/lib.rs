// ember-api: Async Rust client for the Haas+Sohn stove HTTP API

pub mod auth;
pub mod client;
pub mod error;
pub mod status;
pub mod transport;

pub use auth::{PinHash, derive_hash, derive_session_secret};
pub use client::{CommandBody, DeviceClient, STATUS_PATH, command_headers};
pub use error::Error;
pub use status::StatusDocument;
pub use transport::TransportConfig;
