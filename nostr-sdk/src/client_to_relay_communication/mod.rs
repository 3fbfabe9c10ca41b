/// The three types of `client -> relay` communications.
///
///  - `["EVENT", event_JSON]`: used to publish events
///
///  - `["REQ", subscription_id, filter_JSON, ...]`: used to request events and subscribe to new updates.
///       A REQ message may contain multiple filters. In this case, events that match any of the filters are to be returned,
///       i.e., multiple filters are to be interpreted as `||` conditions.
///
///  - `["CLOSE", subscription_id]`: used to stop previous subscriptions.
///
use serde_json::Value;

// Internal `client_to_relay_communication` modules
pub mod close;
pub mod event;
pub mod request;

use self::{close::ClientToRelayCommClose, event::ClientToRelayCommEvent, request::ClientToRelayCommRequest};

/// Longest subscription id a relay has to accept.
pub const MAX_SUBSCRIPTION_ID_LEN: usize = 64;

/// [`ClientToRelayCommunication`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("invalid filter: {0}")]
  Filter(#[from] crate::filter::Error),
  #[error("unknown message type `{0}`")]
  UnknownCommand(String),
  #[error("Invalid data")]
  InvalidData,
}

/// Any message a client can send, dispatched on its first element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
  Event(ClientToRelayCommEvent),
  Request(ClientToRelayCommRequest),
  Close(ClientToRelayCommClose),
}

impl ClientMessage {
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let code = msg
      .as_array()
      .and_then(|v| v.first())
      .and_then(Value::as_str)
      .map(str::to_string)
      .ok_or(Error::InvalidData)?;

    match code.as_str() {
      "EVENT" => ClientToRelayCommEvent::from_value(msg).map(Self::Event),
      "REQ" => ClientToRelayCommRequest::from_value(msg).map(Self::Request),
      "CLOSE" => ClientToRelayCommClose::from_value(msg).map(Self::Close),
      other => Err(Error::UnknownCommand(other.to_string())),
    }
  }

  pub fn from_json(msg: &str) -> Result<Self, Error> {
    if msg.is_empty() {
      return Err(Error::InvalidData);
    }

    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }
}

pub(crate) fn subscription_id_from_value(value: &Value) -> Result<String, Error> {
  match value.as_str() {
    Some(id) if !id.is_empty() && id.len() <= MAX_SUBSCRIPTION_ID_LEN => Ok(id.to_string()),
    _ => Err(Error::InvalidData),
  }
}
