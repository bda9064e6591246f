//! Config subcommand handlers.

use serde_json::Value;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn prompt_pin() -> Result<String, CliError> {
    let pin = rpassword::prompt_password("Device PIN: ").map_err(prompt_err)?;
    let pin = pin.trim().to_owned();
    if pin.is_empty() {
        return Err(CliError::Validation {
            field: "pin".into(),
            reason: "PIN cannot be empty".into(),
        });
    }
    Ok(pin)
}

fn parse_num<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, CliError> {
    value.trim().parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("expected a number, got '{value}'"),
    })
}

/// Config as JSON with the plaintext PIN masked.
fn redacted(cfg: &Config) -> Result<Value, CliError> {
    let mut value = serde_json::to_value(cfg)?;
    if let Some(pin) = value.pointer_mut("/device/pin") {
        *pin = Value::String("****".into());
    }
    Ok(value)
}

/// Apply `key = value` to the config.
fn apply_setting(cfg: &mut Config, key: &str, value: &str) -> Result<(), CliError> {
    if let Some(version) = key.strip_prefix("supported.") {
        let enabled = crate::commands::parse_switch(key, value)?;
        cfg.supported.insert(version.to_owned(), enabled);
        return Ok(());
    }

    match key {
        "host" | "device.host" => {
            ember_config::parse_device_url(value)?;
            cfg.device.host = Some(value.trim().to_owned());
        }
        "pin_env" | "pin-env" => cfg.device.pin_env = Some(value.to_owned()),
        "poll_interval" | "poll-interval" => {
            let secs: u64 = parse_num(key, value)?;
            if secs == 0 {
                return Err(CliError::Validation {
                    field: key.into(),
                    reason: "must be at least one second".into(),
                });
            }
            cfg.device.poll_interval = secs;
        }
        "timeout" => cfg.device.timeout = parse_num(key, value)?,
        "error_threshold" | "error-threshold" => cfg.device.error_threshold = parse_num(key, value)?,
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: host, pin_env, poll_interval, \
                     timeout, error_threshold, supported.<hw>_<sw>"
                ),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::active_path(global);

    match args.command {
        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init { plaintext } => {
            let host = global.host.clone().ok_or_else(|| CliError::Validation {
                field: "host".into(),
                reason: "pass the stove address with --host".into(),
            })?;
            ember_config::parse_device_url(&host)?;

            let pin = prompt_pin()?;
            let mut cfg = Config::default();
            cfg.device.host = Some(host);
            if plaintext {
                cfg.device.pin = Some(pin);
            } else {
                ember_config::store_pin(&pin)?;
                eprintln!("   ✓ PIN stored in system keyring");
            }

            config::save_config_to(&cfg, &path)?;
            eprintln!("✓ Configuration written to {}", path.display());
            eprintln!("\n  Test it: ember status");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config_from(&path)?;
            let shown = redacted(&cfg)?;
            let out = output::render_single(&global.output, &shown, |v| {
                toml::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_from(&path)?;
            apply_setting(&mut cfg, &key, &value)?;
            config::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("✓ Set {key}");
            }
            Ok(())
        }

        // ── SetPin ──────────────────────────────────────────────────
        ConfigCommand::SetPin => {
            let pin = prompt_pin()?;
            ember_config::store_pin(&pin)?;
            eprintln!("✓ PIN stored in system keyring");
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}
