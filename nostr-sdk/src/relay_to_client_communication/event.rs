use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::event::Event;

use super::Error;

/// `["EVENT", <subscription_id>, <event JSON>]`, an event delivered to a subscription.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommEvent {
  pub subscription_id: String,
  pub event: Event,
}

impl RelayToClientCommEvent {
  /// Create new [`RelayToClientCommEvent`] message
  pub fn new_event(subscription_id: String, event: Event) -> Self {
    Self {
      subscription_id,
      event,
    }
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    json!(["EVENT", self.subscription_id, self.event])
  }

  /// Deserialize from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() != 3 || v[0] != "EVENT" {
      return Err(Error::InvalidData);
    }

    let subscription_id = serde_json::from_value(v[1].clone())?;
    let event: Event = serde_json::from_value(v[2].clone())?;
    Ok(Self::new_event(subscription_id, event))
  }

  /// Get [`RelayToClientCommEvent`] as JSON string
  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  /// Get [`RelayToClientCommEvent`] from JSON string
  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    let value: Value = serde_json::from_str(&msg.into())?;
    Self::from_value(value)
  }
}

impl Serialize for RelayToClientCommEvent {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for RelayToClientCommEvent {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let json_value: Value = Value::deserialize(deserializer)?;
    RelayToClientCommEvent::from_value(json_value).map_err(serde::de::Error::custom)
  }
}
