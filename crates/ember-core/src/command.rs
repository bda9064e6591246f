// ── Command API ──
//
// The stove accepts exactly three writes. A `DeviceCommand` pairs the
// typed wire body with the host point it came from and the raw value
// the user asked for (which is what gets acknowledged on success).

use ember_api::CommandBody;
use serde_json::Value;
use strum::{AsRefStr, EnumIter, EnumString};

use crate::error::CoreError;
use crate::host::StateChange;

/// Host points that accept writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter, EnumString)]
pub enum CommandPoint {
    #[strum(serialize = "device.prg")]
    Program,
    #[strum(serialize = "device.sp_temp")]
    TargetTemperature,
    #[strum(serialize = "device.eco_mode")]
    EcoMode,
}

/// A validated write, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCommand {
    point: CommandPoint,
    body: CommandBody,
    requested: Value,
}

impl DeviceCommand {
    pub fn program(on: bool) -> Self {
        Self {
            point: CommandPoint::Program,
            body: CommandBody::Program(on),
            requested: Value::Bool(on),
        }
    }

    pub fn target_temperature(celsius: f64) -> Result<Self, CoreError> {
        let requested = serde_json::Number::from_f64(celsius)
            .map(Value::Number)
            .ok_or_else(|| CoreError::Validation {
                message: format!("target temperature must be finite, got {celsius}"),
            })?;
        Ok(Self {
            point: CommandPoint::TargetTemperature,
            body: CommandBody::TargetTemperature(celsius),
            requested,
        })
    }

    pub fn eco_mode(on: bool) -> Self {
        Self {
            point: CommandPoint::EcoMode,
            body: CommandBody::EcoMode(on),
            requested: Value::Bool(on),
        }
    }

    /// Build a command from a raw host value written to `point`.
    pub fn from_value(point: CommandPoint, value: &Value) -> Result<Self, CoreError> {
        let mut cmd = match point {
            CommandPoint::Program => Self::program(switch_value(point, value)?),
            CommandPoint::TargetTemperature => Self::target_temperature(number_value(point, value)?)?,
            CommandPoint::EcoMode => Self::eco_mode(switch_value(point, value)?),
        };
        cmd.requested = value.clone();
        Ok(cmd)
    }

    /// Translate a host notification into a command.
    ///
    /// Returns `Ok(None)` for acknowledged writes (our own publications)
    /// and for ids that are not command points.
    pub fn from_state_change(change: &StateChange) -> Result<Option<Self>, CoreError> {
        if change.state.ack {
            return Ok(None);
        }
        let Ok(point) = change.id.parse::<CommandPoint>() else {
            return Ok(None);
        };
        Self::from_value(point, &change.state.val).map(Some)
    }

    pub fn point(&self) -> CommandPoint {
        self.point
    }

    pub fn body(&self) -> &CommandBody {
        &self.body
    }

    /// Value to acknowledge once the stove accepted the write.
    pub fn requested(&self) -> &Value {
        &self.requested
    }
}

fn switch_value(point: CommandPoint, value: &Value) -> Result<bool, CoreError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        other => Err(CoreError::Validation {
            message: format!("{} expects a boolean, got {other}", point.as_ref()),
        }),
    }
}

fn number_value(point: CommandPoint, value: &Value) -> Result<f64, CoreError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CoreError::Validation {
        message: format!("{} expects a number, got {value}", point.as_ref()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::State;
    use serde_json::json;

    fn change(id: &str, val: Value, ack: bool) -> StateChange {
        StateChange {
            id: id.into(),
            state: State { val, ack },
        }
    }

    #[test]
    fn acknowledged_writes_are_ignored() {
        let c = change("device.prg", json!(true), true);
        assert!(DeviceCommand::from_state_change(&c).unwrap().is_none());
    }

    #[test]
    fn unknown_points_are_ignored() {
        let c = change("device.is_temp", json!(20), false);
        assert!(DeviceCommand::from_state_change(&c).unwrap().is_none());
    }

    #[test]
    fn program_accepts_bool_and_binary_numbers() {
        let cmd = DeviceCommand::from_state_change(&change("device.prg", json!(1), false))
            .unwrap()
            .unwrap();
        assert_eq!(cmd.body(), &CommandBody::Program(true));
        assert_eq!(cmd.requested(), &json!(1));

        let err = DeviceCommand::from_value(CommandPoint::Program, &json!(2)).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn temperature_accepts_numeric_strings() {
        let cmd = DeviceCommand::from_value(CommandPoint::TargetTemperature, &json!("21.5")).unwrap();
        assert_eq!(cmd.body(), &CommandBody::TargetTemperature(21.5));

        assert!(DeviceCommand::from_value(CommandPoint::TargetTemperature, &json!(true)).is_err());
        assert!(DeviceCommand::target_temperature(f64::NAN).is_err());
    }

    #[test]
    fn point_ids_round_trip() {
        assert_eq!(CommandPoint::EcoMode.as_ref(), "device.eco_mode");
        assert_eq!("device.sp_temp".parse::<CommandPoint>().unwrap(), CommandPoint::TargetTemperature);
    }
}
