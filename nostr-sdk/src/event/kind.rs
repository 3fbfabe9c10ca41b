use serde::de::{Deserialize, Deserializer, Error, Visitor};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Defines the type of the event.
/// The relay only gives special treatment to the kinds it was configured
/// to charge for; every other kind is relayed for free.
/// `Text` is the default.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
  /// Stringified JSON profile of the author.
  Metadata,
  /// Short plaintext note.
  #[default]
  Text,
  /// URL of a relay the author recommends.
  RecommendRelay,
  /// Follow list.
  Contacts,
  /// Request to delete events referenced by `e` tags.
  EventDeletion,
  /// Reaction to another event.
  Reaction,
  /// NIP-22 comment on another event.
  Comment,
  /// NIP-23 long-form content (articles, papers).
  LongFormContent,
  /// Any kind without a dedicated variant.
  Custom(u64),
}

impl EventKind {
  pub fn as_u64(&self) -> u64 {
    (*self).into()
  }
}

impl FromStr for EventKind {
  type Err = ParseIntError;
  fn from_str(event_kind: &str) -> Result<Self, Self::Err> {
    let event_kind: u64 = event_kind.parse()?;
    Ok(Self::from(event_kind))
  }
}

impl From<u64> for EventKind {
  fn from(u: u64) -> Self {
    match u {
      0 => Self::Metadata,
      1 => Self::Text,
      2 => Self::RecommendRelay,
      3 => Self::Contacts,
      5 => Self::EventDeletion,
      7 => Self::Reaction,
      1111 => Self::Comment,
      30023 => Self::LongFormContent,
      x => Self::Custom(x),
    }
  }
}

impl From<EventKind> for u64 {
  fn from(e: EventKind) -> u64 {
    match e {
      EventKind::Metadata => 0,
      EventKind::Text => 1,
      EventKind::RecommendRelay => 2,
      EventKind::Contacts => 3,
      EventKind::EventDeletion => 5,
      EventKind::Reaction => 7,
      EventKind::Comment => 1111,
      EventKind::LongFormContent => 30023,
      EventKind::Custom(u) => u,
    }
  }
}

impl Serialize for EventKind {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_u64(self.as_u64())
  }
}

struct EventKindVisitor;

impl Visitor<'_> for EventKindVisitor {
  type Value = EventKind;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "an unsigned integer of at most 64 bits")
  }

  fn visit_u64<E>(self, v: u64) -> Result<EventKind, E>
  where
    E: Error,
  {
    Ok(EventKind::from(v))
  }

  fn visit_i64<E>(self, v: i64) -> Result<EventKind, E>
  where
    E: Error,
  {
    u64::try_from(v)
      .map(EventKind::from)
      .map_err(|_| E::custom(format!("negative event kind: {v}")))
  }
}

impl<'de> Deserialize<'de> for EventKind {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    deserializer.deserialize_u64(EventKindVisitor)
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.as_u64())
  }
}
