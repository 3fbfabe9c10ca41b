use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::filter::Filter;

use super::{subscription_id_from_value, Error};

/// `["REQ", <subscription_id>, <filter JSON>, <filter JSON>, ...]`
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommRequest {
  pub subscription_id: String,
  pub filters: Vec<Filter>,
}

impl ClientToRelayCommRequest {
  pub fn new_request(subscription_id: String, filters: Vec<Filter>) -> Self {
    Self {
      subscription_id,
      filters,
    }
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    let mut values = vec![
      Value::from("REQ"),
      Value::from(self.subscription_id.clone()),
    ];
    values.extend(self.filters.iter().map(Filter::as_value));
    Value::Array(values)
  }

  /// Deserialize from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() < 3 || v[0] != "REQ" {
      return Err(Error::InvalidData);
    }

    let subscription_id = subscription_id_from_value(&v[1])?;
    let filters = v[2..]
      .iter()
      .map(|filter| Filter::from_value(filter.clone()))
      .collect::<Result<Vec<Filter>, _>>()?;

    Ok(Self::new_request(subscription_id, filters))
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

impl Serialize for ClientToRelayCommRequest {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for ClientToRelayCommRequest {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let json_value: Value = Value::deserialize(deserializer)?;
    ClientToRelayCommRequest::from_value(json_value).map_err(serde::de::Error::custom)
  }
}
