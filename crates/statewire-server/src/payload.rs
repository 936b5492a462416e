//! The JSON document an instrumented app sends in each frame.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ServerError};

/// One state transition reported by an instrumented app.
///
/// Wire shape: `{ "state": <any>, "action": <string>, "imageData": <base64> }`.
/// Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSnapshot {
    /// Application state after the action.
    pub state: Value,
    /// Description of the action that produced the state.
    pub action: String,
    /// Base64-encoded screenshot taken after the action.
    #[serde(rename = "imageData")]
    pub image_data: String,
}

impl DebugSnapshot {
    /// Build a snapshot, base64-encoding `image`.
    pub fn new(action: impl Into<String>, state: Value, image: &[u8]) -> Self {
        Self {
            state,
            action: action.into(),
            image_data: STANDARD.encode(image),
        }
    }

    /// Interpret an already-parsed JSON document.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = &value else {
            return Err(ServerError::InvalidSnapshot(format!(
                "expected an object, got {}",
                kind_of(&value)
            )));
        };
        for key in ["state", "action", "imageData"] {
            if !map.contains_key(key) {
                return Err(ServerError::InvalidSnapshot(format!("missing key `{key}`")));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a frame payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(payload)?)
    }

    /// Serialize to a frame payload.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode the screenshot bytes.
    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(self.image_data.as_bytes())?)
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
