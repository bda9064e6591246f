//! Command handlers.

pub mod config_cmd;
pub mod run;
pub mod set;
pub mod status;

use crate::error::CliError;

/// Parse an on/off style switch value.
pub fn parse_switch(field: &str, raw: &str) -> Result<bool, CliError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        other => Err(CliError::Validation {
            field: field.into(),
            reason: format!("expected on/off, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn switches() {
        assert!(parse_switch("prg", "ON").unwrap());
        assert!(!parse_switch("prg", "0").unwrap());
        assert!(parse_switch("prg", "maybe").is_err());
    }
}
