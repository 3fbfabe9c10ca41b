use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::{subscription_id_from_value, Error};

/// `["CLOSE", <subscription_id>]`
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommClose {
  pub subscription_id: String,
}

impl ClientToRelayCommClose {
  pub fn new_close(subscription_id: String) -> Self {
    Self { subscription_id }
  }

  pub fn as_value(&self) -> Value {
    json!(["CLOSE", self.subscription_id])
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() != 2 || v[0] != "CLOSE" {
      return Err(Error::InvalidData);
    }

    Ok(Self::new_close(subscription_id_from_value(&v[1])?))
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    let value: Value = serde_json::from_str(&msg.into())?;
    Self::from_value(value)
  }
}

impl Serialize for ClientToRelayCommClose {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for ClientToRelayCommClose {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let json_value: Value = Value::deserialize(deserializer)?;
    ClientToRelayCommClose::from_value(json_value).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn test_close_as_json() {
    let close = ClientToRelayCommClose::new_close(String::from("mock_subscription_id"));
    assert_eq!(close.as_json(), r#"["CLOSE","mock_subscription_id"]"#);
  }

  #[test]
  fn test_close_from_json() {
    let result = ClientToRelayCommClose::from_json(r#"["CLOSE","mock_subscription_id"]"#).unwrap();
    assert_eq!(result.subscription_id, "mock_subscription_id");

    assert!(ClientToRelayCommClose::from_json(r#"["CLOSE",""]"#).is_err());
    assert!(ClientToRelayCommClose::from_json(r#"["",""]"#).is_err());
    assert!(ClientToRelayCommClose::from_json(r#"["CLOSE"]"#).is_err());
    assert!(ClientToRelayCommClose::from_json("[]").is_err());
  }
}
