//! CLI configuration: thin wrapper around `ember_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--host,
//! --pin, --timeout, --config).

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use ember_core::AdapterConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use ember_config::{Config, load_config_from, save_config_to};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Config file in effect: `--config` / `EMBER_CONFIG`, else the platform path.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(ember_config::config_path)
}

/// Load the active config with flag overrides applied.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = load_config_from(&active_path(global))?;
    if let Some(ref host) = global.host {
        cfg.device.host = Some(host.clone());
    }
    if let Some(timeout) = global.timeout {
        cfg.device.timeout = timeout;
    }
    Ok(cfg)
}

/// Resolve the PIN: flag first, then the shared chain.
pub fn resolve_pin(global: &GlobalOpts, cfg: &Config) -> Result<SecretString, CliError> {
    if let Some(ref pin) = global.pin {
        return Ok(SecretString::from(pin.clone()));
    }
    Ok(ember_config::resolve_pin(&cfg.device)?)
}

/// Build the runtime adapter config, optionally overriding the interval.
pub fn adapter_config(
    global: &GlobalOpts,
    cfg: &Config,
    interval: Option<u64>,
) -> Result<AdapterConfig, CliError> {
    let pin = resolve_pin(global, cfg)?;
    let mut adapter = ember_config::to_adapter_config(cfg, pin)?;
    if let Some(secs) = interval {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "interval".into(),
                reason: "must be at least one second".into(),
            });
        }
        adapter.poll_interval = Duration::from_secs(secs);
    }
    Ok(adapter)
}
