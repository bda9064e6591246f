//! `ember set`: one authenticated write, then exit.

use std::sync::Arc;

use ember_core::{Adapter, DeviceCommand, MemoryHost};
use tracing::debug;

use crate::cli::{GlobalOpts, SetArgs, SetTarget};
use crate::commands::parse_switch;
use crate::config;
use crate::error::CliError;

pub async fn handle(args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let command = build_command(args.target, &args.value)?;

    let cfg = config::load(global)?;
    let adapter_config = config::adapter_config(global, &cfg, None)?;

    let adapter = Adapter::new(adapter_config, Arc::new(MemoryHost::new()))?;
    adapter.provision_objects().await?;
    // Version check and eco flag come from a full cycle.
    adapter.poll_cycle().await?;

    let id = command.point().as_ref().to_owned();
    debug!(id = %id, "dispatching one-shot command");
    adapter.dispatch(command).await?;

    if !global.quiet {
        eprintln!("✓ Set {id} to {}", args.value);
    }
    Ok(())
}

fn build_command(target: SetTarget, raw: &str) -> Result<DeviceCommand, CliError> {
    match target {
        SetTarget::Program => Ok(DeviceCommand::program(parse_switch("prg", raw)?)),
        SetTarget::Eco => Ok(DeviceCommand::eco_mode(parse_switch("eco_mode", raw)?)),
        SetTarget::Temperature => {
            let celsius: f64 = raw.trim().parse().map_err(|_| CliError::Validation {
                field: "sp_temp".into(),
                reason: format!("expected a temperature in °C, got '{raw}'"),
            })?;
            Ok(DeviceCommand::target_temperature(celsius)?)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ember_api::CommandBody;

    #[test]
    fn builds_typed_commands() {
        let cmd = build_command(SetTarget::Temperature, "21.5").unwrap();
        assert_eq!(cmd.body(), &CommandBody::TargetTemperature(21.5));

        let cmd = build_command(SetTarget::Eco, "off").unwrap();
        assert_eq!(cmd.body(), &CommandBody::EcoMode(false));

        assert!(build_command(SetTarget::Temperature, "warm").is_err());
        assert!(build_command(SetTarget::Program, "2").is_err());
    }
}
