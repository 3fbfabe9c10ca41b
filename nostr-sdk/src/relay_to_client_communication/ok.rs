use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::Error;

/// Result of an `EVENT` submission (NIP-20).
///
/// `["OK", <event_id>, <true|false>, <message>]`
///
/// When `accepted` is false the message starts with a machine-readable
/// prefix such as `invalid:`, `payment-required:` or `error:`.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommOk {
  pub event_id: String,
  pub accepted: bool,
  pub message: String,
}

impl RelayToClientCommOk {
  pub fn new_ok(event_id: String, accepted: bool, message: String) -> Self {
    Self {
      event_id,
      accepted,
      message,
    }
  }

  pub fn as_value(&self) -> Value {
    json!(["OK", self.event_id, self.accepted, self.message])
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() != 4 || v[0] != "OK" {
      return Err(Error::InvalidData);
    }

    let event_id = serde_json::from_value(v[1].clone())?;
    let accepted = v[2].as_bool().ok_or(Error::InvalidData)?;
    let message = serde_json::from_value(v[3].clone())?;
    Ok(Self::new_ok(event_id, accepted, message))
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }
}

impl Serialize for RelayToClientCommOk {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for RelayToClientCommOk {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let json_value: Value = Value::deserialize(deserializer)?;
    RelayToClientCommOk::from_value(json_value).map_err(serde::de::Error::custom)
  }
}
