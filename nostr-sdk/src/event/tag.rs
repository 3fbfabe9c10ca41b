use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known tag names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
  /// `["p", <pubkey>, <relay-url>]`: someone involved in the event.
  PubKey,
  /// `["e", <event-id>, <relay-url>, <marker>]`: an event this one refers to.
  Event,
  /// `["payment", <payment-hash>]`: the invoice settling a priced submission.
  Payment,
  /// `["title", <text>]`: title of long-form content.
  Title,
  Custom(String),
}

impl fmt::Display for TagKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::PubKey => write!(f, "p"),
      Self::Event => write!(f, "e"),
      Self::Payment => write!(f, "payment"),
      Self::Title => write!(f, "title"),
      Self::Custom(tag) => write!(f, "{tag}"),
    }
  }
}

impl From<&str> for TagKind {
  fn from(s: &str) -> Self {
    match s {
      "p" => Self::PubKey,
      "e" => Self::Event,
      "payment" => Self::Payment,
      "title" => Self::Title,
      tag => Self::Custom(tag.to_string()),
    }
  }
}

/// A tag is an ordered list of strings whose first element names it.
/// The relay never reinterprets the list: it is hashed and relayed exactly
/// as the author wrote it.
///
///   ```json
///   ["e", "688787d8ff144c502c7f5cffaafe2cc588d86079f9de88304c26b0cb99ce91c6", "wss://relay.damus.io", "root"]
///   ["payment", "9f1c0e0a6c1a7d3e2b6f8a1c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f70"]
///   ```
///
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
  pub fn new<S>(kind: TagKind, values: Vec<S>) -> Self
  where
    S: Into<String>,
  {
    let mut tag = vec![kind.to_string()];
    tag.extend(values.into_iter().map(|v| v.into()));
    Self(tag)
  }

  pub fn name(&self) -> Option<&str> {
    self.0.first().map(String::as_str)
  }

  pub fn kind(&self) -> Option<TagKind> {
    self.name().map(TagKind::from)
  }

  /// First value after the name, the one filters match on.
  pub fn value(&self) -> Option<&str> {
    self.0.get(1).map(String::as_str)
  }

  pub fn as_vec(&self) -> Vec<String> {
    self.0.clone()
  }
}

impl<S> From<Vec<S>> for Tag
where
  S: Into<String>,
{
  fn from(tag: Vec<S>) -> Self {
    Self(tag.into_iter().map(|v| v.into()).collect())
  }
}
