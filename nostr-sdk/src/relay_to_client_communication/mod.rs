/// The `relay -> client` communications.
///
///  - `["EVENT", subscription_id, event_JSON]`: events requested by the client.
///  - `["OK", event_id, true|false, message]`: result of an `EVENT` submission.
///  - `["EOSE", subscription_id]`: end of stored events, live events follow.
///  - `["NOTICE", message]`: human-readable information.
///
use serde_json::Value;

// internal modules
pub mod eose;
pub mod event;
pub mod notice;
pub mod ok;

use self::{
  eose::RelayToClientCommEose, event::RelayToClientCommEvent, notice::RelayToClientCommNotice,
  ok::RelayToClientCommOk,
};

/// [`RelayToClientCommunication`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("Invalid data")]
  InvalidData,
}

/// Any message a relay can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
  Event(RelayToClientCommEvent),
  Ok(RelayToClientCommOk),
  Eose(RelayToClientCommEose),
  Notice(RelayToClientCommNotice),
}

impl RelayMessage {
  pub fn from_json(msg: &str) -> Result<Self, Error> {
    let value: Value = serde_json::from_str(msg)?;
    let code = value
      .as_array()
      .and_then(|v| v.first())
      .and_then(Value::as_str)
      .map(str::to_string)
      .ok_or(Error::InvalidData)?;

    match code.as_str() {
      "EVENT" => RelayToClientCommEvent::from_value(value).map(Self::Event),
      "OK" => RelayToClientCommOk::from_value(value).map(Self::Ok),
      "EOSE" => RelayToClientCommEose::from_value(value).map(Self::Eose),
      "NOTICE" => RelayToClientCommNotice::from_value(value).map(Self::Notice),
      _ => Err(Error::InvalidData),
    }
  }

  pub fn as_json(&self) -> String {
    match self {
      Self::Event(event) => event.as_json(),
      Self::Ok(ok) => ok.as_json(),
      Self::Eose(eose) => eose.as_json(),
      Self::Notice(notice) => notice.as_json(),
    }
  }
}

impl From<RelayToClientCommEvent> for RelayMessage {
  fn from(value: RelayToClientCommEvent) -> Self {
    Self::Event(value)
  }
}

impl From<RelayToClientCommOk> for RelayMessage {
  fn from(value: RelayToClientCommOk) -> Self {
    Self::Ok(value)
  }
}

impl From<RelayToClientCommEose> for RelayMessage {
  fn from(value: RelayToClientCommEose) -> Self {
    Self::Eose(value)
  }
}

impl From<RelayToClientCommNotice> for RelayMessage {
  fn from(value: RelayToClientCommNotice) -> Self {
    Self::Notice(value)
  }
}
