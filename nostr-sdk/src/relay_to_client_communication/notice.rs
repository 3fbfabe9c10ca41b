use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::Error;

/// Used to send human-readable error messages
/// or other things (like price quotes) to clients.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommNotice {
  pub message: String, // NIP01 defines no rules for this message
}

impl RelayToClientCommNotice {
  /// Create new `NOTICE` message
  pub fn new_notice(message: String) -> Self {
    Self { message }
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    json!(["NOTICE", self.message])
  }

  /// Deserialize from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    // ["NOTICE", <message>]
    if v.len() != 2 || v[0] != "NOTICE" {
      return Err(Error::InvalidData);
    }

    let message = serde_json::from_value(v[1].clone())?;
    Ok(Self::new_notice(message))
  }

  /// Get [`RelayToClientCommNotice`] as JSON string
  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }
}

impl Serialize for RelayToClientCommNotice {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for RelayToClientCommNotice {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let json_value: Value = Value::deserialize(deserializer)?;
    RelayToClientCommNotice::from_value(json_value).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn test_notice_serializes_without_the_struct_key_names() {
    let notice = RelayToClientCommNotice::new_notice(String::from("mock_message"));
    assert_eq!(notice.as_json(), r#"["NOTICE","mock_message"]"#);
  }
}
