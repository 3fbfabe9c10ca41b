use bitcoin_hashes::{sha256, Hash};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{kind::EventKind, tag::Tag, PubKey, Timestamp};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EventId(pub String);

impl EventId {
  ///
  /// 32-bytes lowercase hex-encoded sha256 of the canonical serialization
  ///
  /// `[0, <pubkey>, <created_at>, <kind>, <tags>, <content>]`
  ///
  /// written as compact JSON.
  ///
  /// <https://github.com/nostr-protocol/nips/blob/master/01.md>
  ///
  pub fn new(
    pubkey: &PubKey,
    created_at: Timestamp,
    kind: EventKind,
    tags: &[Tag],
    content: &str,
  ) -> Self {
    let data = canonical_serialization(pubkey, created_at, kind, tags, content);
    let hash = sha256::Hash::hash(data.as_bytes());
    Self(hash.to_string())
  }
}

pub(crate) fn canonical_serialization(
  pubkey: &PubKey,
  created_at: Timestamp,
  kind: EventKind,
  tags: &[Tag],
  content: &str,
) -> String {
  json!([0, pubkey, created_at, kind, tags, content]).to_string()
}

#[cfg(test)]
mod tests {
  use crate::event::tag::TagKind;

  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn creates_id_from_the_canonical_array() {
    let pubkey: PubKey = String::from("mockpubkey");
    let tags = vec![Tag::new(TagKind::Event, vec!["event_im_replying_to", "", "reply"])];

    let event_id = EventId::new(&pubkey, 161500343030, EventKind::Text, &tags, "mock \"content\"\n");

    let expected = r#"[0,"mockpubkey",161500343030,1,[["e","event_im_replying_to","","reply"]],"mock \"content\"\n"]"#;
    assert_eq!(
      canonical_serialization(&pubkey, 161500343030, EventKind::Text, &tags, "mock \"content\"\n"),
      expected
    );
    assert_eq!(event_id, EventId(sha256::Hash::hash(expected.as_bytes()).to_string()));
  }

  #[test]
  fn matches_a_known_event_id() {
    let pubkey: PubKey =
      String::from("614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6");

    let event_id = EventId::new(&pubkey, 1684589418, EventKind::Text, &[], "potato");

    assert_eq!(
      event_id.0,
      "00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae"
    );
  }
}
