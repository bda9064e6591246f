// Status document returned by `GET /status.cgi`
//
// The body is a nested JSON object whose shape varies between firmware
// releases, so it stays an untyped `serde_json::Map`. Only the `meta`
// block has fields the client itself depends on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, preview};

/// A full status snapshot as reported by the stove.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusDocument(Map<String, Value>);

impl StatusDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Parse a response body. Anything but a JSON object is rejected.
    pub fn from_body(body: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(body)),
            body: body.to_owned(),
        })?;

        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::Deserialization {
                message: format!("expected a JSON object, got {}", kind_of(&other)),
                body: body.to_owned(),
            }),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    fn meta(&self, key: &str) -> Option<&Value> {
        self.0.get("meta")?.as_object()?.get(key)
    }

    /// Current nonce, normalized to a string (some firmwares send a number).
    pub fn nonce(&self) -> Option<String> {
        self.meta("nonce").and_then(scalar_to_string)
    }

    pub fn hw_version(&self) -> Option<String> {
        self.meta("hw_version").and_then(scalar_to_string)
    }

    pub fn sw_version(&self) -> Option<String> {
        self.meta("sw_version").and_then(scalar_to_string)
    }

    /// Whether the firmware currently allows toggling eco mode.
    pub fn eco_editable(&self) -> Option<bool> {
        self.meta("eco_editable").and_then(truthy)
    }
}

impl From<Map<String, Value>> for StatusDocument {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// String form of a scalar; `None` for null, arrays and objects.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Truthiness of a scalar flag. Numbers are true when non-zero.
pub fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        },
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
