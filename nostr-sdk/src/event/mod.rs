use std::str::FromStr;

use secp256k1::{schnorr, Secp256k1};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Event Modules
pub mod id;
pub mod kind;
pub mod tag;

use self::id::EventId;
use self::kind::EventKind;
use self::tag::{Tag, TagKind};
use crate::schnorr::SchnorrError;

pub type PubKey = String;
pub type Timestamp = u64;

/// [`Event`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("Invalid data")]
  InvalidData,
}

///
/// Event is the only object that exists in the Nostr protocol.
///
/// Example:
///   ```json
///   {
///     "id": "00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae",
///     "pubkey": "614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6",
///     "created_at": 1684589418,
///     "kind": 1,
///     "tags": [],
///     "content": "potato",
///     "sig": "bf073c935f71de50ec72bdb79f75b0bf32f9049305c3b22f97c06422c6f2edc86e0d7e07d7d7222678b238b1daee071be5f6fa653c611971395ec0d1c6407caf"
///   }
///   ```
///
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Event {
  /// 32-bytes SHA256 of the serialized event data
  pub id: String,
  /// 32-bytes hex-encoded x-only public key of the event creator
  pub pubkey: PubKey,
  /// Unix timestamp in seconds
  pub created_at: Timestamp,
  /// Kind of event
  pub kind: EventKind,
  /// Ordered list of tags, each one an ordered list of strings.
  pub tags: Vec<Tag>,
  /// Arbitrary string. Meaning depends on the kind of the event.
  pub content: String,
  /// 64-bytes hex Schnorr signature of the id field
  pub sig: String,
}

impl Event {
  pub fn new_without_signature(
    pubkey: PubKey,
    created_at: Timestamp,
    kind: EventKind,
    tags: Vec<Tag>,
    content: String,
  ) -> Self {
    let id = EventId::new(&pubkey, created_at, kind, &tags, &content);
    Self {
      id: id.0,
      pubkey,
      created_at,
      kind,
      tags,
      content,
      ..Default::default()
    }
  }

  pub fn sign_event(&mut self, seckey: Vec<u8>) -> Result<(), SchnorrError> {
    let secp = Secp256k1::new();
    let signed = crate::schnorr::sign_schnorr(&secp, self.id.clone(), seckey)?;
    self.sig = signed.to_string();
    Ok(())
  }

  /// Recomputes the canonical hash and compares it with the stated id.
  pub fn check_event_id(&self) -> bool {
    EventId::new(
      &self.pubkey,
      self.created_at,
      self.kind,
      &self.tags,
      &self.content,
    )
    .0 == self.id
  }

  pub fn check_event_signature(&self) -> bool {
    let secp = Secp256k1::new();
    let sig = match schnorr::Signature::from_str(&self.sig) {
      Ok(signature) => signature,
      Err(_) => return false,
    };

    crate::schnorr::verify_schnorr(&secp, self.id.clone(), sig, self.pubkey.clone())
      .unwrap_or(false)
  }

  /// Both the id and the signature are valid.
  pub fn verify(&self) -> bool {
    self.check_event_id() && self.check_event_signature()
  }

  /// Size of the content in bytes, which is what priced kinds are charged for.
  pub fn content_size(&self) -> u64 {
    self.content.len() as u64
  }

  /// Value of the first tag with the given kind.
  pub fn tag_value(&self, kind: TagKind) -> Option<&str> {
    self
      .tags
      .iter()
      .find(|tag| tag.kind().as_ref() == Some(&kind))
      .and_then(|tag| tag.value())
  }

  /// Deserializes from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    serde_json::from_value(msg).map_err(Error::Json)
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    json!(self)
  }

  /// Deserialize [`Event`] from JSON string
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

  /// Get [`Event`] in JSON string, keeping the field order of the struct
  pub fn as_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_default()
  }
}
