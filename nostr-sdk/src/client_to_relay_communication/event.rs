use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::event::Event;

use super::Error;

/// `["EVENT", <event JSON>]`, used by clients to publish events.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommEvent {
  pub event: Event,
}

impl ClientToRelayCommEvent {
  pub fn new_event(event: Event) -> Self {
    Self { event }
  }

  /// Get event communication as JSON string
  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  /// Deserialize [`ClientToRelayCommEvent`] from JSON string
  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    let msg: &str = &msg.into();

    if msg.is_empty() {
      return Err(Error::InvalidData);
    }

    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    json!(["EVENT", self.event])
  }

  /// Deserialize from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    // ["EVENT", <event JSON>]
    if v.len() != 2 || v[0] != "EVENT" {
      return Err(Error::InvalidData);
    }

    let event: Event = serde_json::from_value(v[1].clone())?;
    Ok(Self::new_event(event))
  }
}

impl Serialize for ClientToRelayCommEvent {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for ClientToRelayCommEvent {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let json_value: Value = Value::deserialize(deserializer)?;
    ClientToRelayCommEvent::from_value(json_value).map_err(serde::de::Error::custom)
  }
}
