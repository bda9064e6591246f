//! Configuration for the `ember` binary.
//!
//! TOML file, `EMBER_` environment overrides, PIN resolution (env +
//! keyring + plaintext), and translation to `ember_core::AdapterConfig`.
//! The CLI adds the `--pin` flag step on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use ember_core::AdapterConfig;

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "ember";
/// Keyring entry holding the device PIN.
pub const KEYRING_PIN_USER: &str = "pin";
/// Environment variable consulted for the PIN when `pin_env` is unset.
pub const DEFAULT_PIN_ENV: &str = "EMBER_PIN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no device PIN configured")]
    NoPin,

    #[error("no device address configured")]
    NoHost,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceSettings,

    /// Tested hardware/software combinations, keyed `"<hw>_<sw>"`.
    #[serde(default)]
    pub supported: HashMap<String, bool>,
}

/// Connection settings for the stove.
#[derive(Debug, Deserialize, Serialize)]
pub struct DeviceSettings {
    /// Stove address: a bare host (`192.168.1.50`) or a full URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// PIN (plaintext; prefer the keyring or an env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,

    /// Environment variable holding the PIN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_env: Option<String>,

    /// Seconds between status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Consecutive failed polls before the connection counts as lost.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            host: None,
            pin: None,
            pin_env: None,
            poll_interval: default_poll_interval(),
            timeout: default_timeout(),
            error_threshold: default_error_threshold(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}
fn default_timeout() -> u64 {
    5
}
fn default_error_threshold() -> u32 {
    3
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ember", "ember").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ember");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from `path` + environment. A missing file yields
/// the defaults.
///
/// Environment variables use `__` for nesting:
/// `EMBER_DEVICE__HOST=192.168.1.50`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("EMBER_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent
/// directories as needed.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── PIN resolution (without CLI flags) ──────────────────────────────

/// Resolve the PIN from the credential chain (no CLI flag step).
pub fn resolve_pin(device: &DeviceSettings) -> Result<SecretString, ConfigError> {
    // 1. Env var named by pin_env
    let env_name = device.pin_env.as_deref().unwrap_or(DEFAULT_PIN_ENV);
    if let Ok(val) = std::env::var(env_name) {
        if !val.is_empty() {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_PIN_USER) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pin) = device.pin {
        return Ok(SecretString::from(pin.clone()));
    }

    Err(ConfigError::NoPin)
}

/// Store the PIN in the system keyring.
pub fn store_pin(pin: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_PIN_USER)?;
    entry.set_password(pin)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Parse a stove address. Bare hosts get `http://`.
pub fn parse_device_url(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::NoHost);
    }
    let candidate = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("http://{raw}")
    };
    Url::parse(&candidate).map_err(|e| ConfigError::Validation {
        field: "device.host".into(),
        reason: format!("'{raw}' is not a valid address: {e}"),
    })
}

/// Build an `AdapterConfig` from the file settings and a resolved PIN.
pub fn to_adapter_config(cfg: &Config, pin: SecretString) -> Result<AdapterConfig, ConfigError> {
    let host = cfg.device.host.as_deref().ok_or(ConfigError::NoHost)?;
    let url = parse_device_url(host)?;

    let mut adapter = AdapterConfig::new(url, pin);
    adapter.poll_interval = Duration::from_secs(cfg.device.poll_interval);
    adapter.timeout = Duration::from_secs(cfg.device.timeout);
    adapter.error_threshold = cfg.device.error_threshold;
    adapter.supported = cfg.supported.clone();

    adapter.validate().map_err(|e| ConfigError::Validation {
        field: "device".into(),
        reason: e.to_string(),
    })?;
    Ok(adapter)
}
