use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::Error;

/// Used to indicate the End Of Stored Events (EOSE)
/// and the beginning of events newly received in
/// real-time.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommEose {
  pub subscription_id: String,
}

impl RelayToClientCommEose {
  // Create new `EOSE` message
  pub fn new_eose(subscription_id: String) -> Self {
    Self { subscription_id }
  }

  pub fn as_value(&self) -> Value {
    json!(["EOSE", self.subscription_id])
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    // ["EOSE", <subscription_id>]
    if v.len() != 2 || v[0] != "EOSE" {
      return Err(Error::InvalidData);
    }

    let subscription_id = serde_json::from_value(v[1].clone())?;
    Ok(Self::new_eose(subscription_id))
  }

  /// Get [`RelayToClientCommEose`] as JSON string
  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }
}

impl Serialize for RelayToClientCommEose {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for RelayToClientCommEose {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let json_value: Value = Value::deserialize(deserializer)?;
    RelayToClientCommEose::from_value(json_value).map_err(serde::de::Error::custom)
  }
}
