use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::event::{kind::EventKind, Event, PubKey, Timestamp};

/// [`Filter`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("invalid value for filter field `{0}`")]
  InvalidField(String),
  #[error("Invalid data")]
  InvalidData,
}

///
/// Filters are data structures that clients send to relays to request data
/// from other clients.
/// The attributes of a Filter work as `&&` (all the conditions set must hold
/// for the event in order to pass the filter).
/// P.S.: a "REQ" communication from the client can have multiple filters. In this case, all filters will be
/// used as `||` operator: anything that matches any of the filters will be sent.
///
/// - ids: a list of event ids or prefixes
/// - authors: a list of publickeys or prefixes, the pubkey of an event must be one of these
/// - kinds: a list of kind numbers
/// - `#<tag>`: a list of values, the event must carry a `<tag>` whose first value is one of these
/// - since: a timestamp. Events must be at least this new to pass
/// - until: a timestamp. Events must be at most this old to pass
/// - limit: maximum number of events to be returned in the initial query (ignored afterwards)
///
/// Empty lists are treated as if the field was absent.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Filter {
  pub ids: Option<Vec<String>>,
  pub authors: Option<Vec<PubKey>>,
  pub kinds: Option<Vec<EventKind>>,
  /// Tag constraints keyed by tag name (without the `#`).
  pub tags: BTreeMap<String, Vec<String>>,
  pub since: Option<Timestamp>,
  pub until: Option<Timestamp>,
  pub limit: Option<u64>,
}

/// One named predicate of a [`Filter`].
///
/// A filter is evaluated as the ordered list returned by
/// [`Filter::constraints`]; every constraint must accept the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint<'a> {
  Ids(&'a [String]),
  Authors(&'a [PubKey]),
  Kinds(&'a [EventKind]),
  Since(Timestamp),
  Until(Timestamp),
  Tag { name: &'a str, values: &'a [String] },
}

impl Constraint<'_> {
  pub fn name(&self) -> &str {
    match self {
      Self::Ids(_) => "ids",
      Self::Authors(_) => "authors",
      Self::Kinds(_) => "kinds",
      Self::Since(_) => "since",
      Self::Until(_) => "until",
      Self::Tag { name, .. } => name,
    }
  }

  pub fn accepts(&self, event: &Event) -> bool {
    match *self {
      Self::Ids(ids) => ids.iter().any(|id| event.id.starts_with(id.as_str())),
      Self::Authors(authors) => authors
        .iter()
        .any(|author| event.pubkey.starts_with(author.as_str())),
      Self::Kinds(kinds) => kinds.contains(&event.kind),
      Self::Since(since) => event.created_at >= since,
      Self::Until(until) => event.created_at <= until,
      Self::Tag { name, values } => event.tags.iter().any(|tag| {
        tag.name() == Some(name)
          && tag
            .value()
            .map_or(false, |value| values.iter().any(|v| v == value))
      }),
    }
  }
}

impl Filter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_ids(&mut self, ids: Vec<String>) -> &mut Self {
    self.ids = Some(ids);
    self
  }

  pub fn add_authors(&mut self, authors: Vec<PubKey>) -> &mut Self {
    self.authors = Some(authors);
    self
  }

  pub fn add_kinds(&mut self, kinds: Vec<u64>) -> &mut Self {
    self.kinds = Some(kinds.into_iter().map(EventKind::from).collect());
    self
  }

  pub fn add_tag(&mut self, name: &str, values: Vec<String>) -> &mut Self {
    self
      .tags
      .insert(name.trim_start_matches('#').to_string(), values);
    self
  }

  pub fn add_since(&mut self, since: Timestamp) -> &mut Self {
    self.since = Some(since);
    self
  }

  pub fn add_until(&mut self, until: Timestamp) -> &mut Self {
    self.until = Some(until);
    self
  }

  pub fn add_limit(&mut self, limit: u64) -> &mut Self {
    self.limit = Some(limit);
    self
  }

  /// The populated constraints of this filter, in evaluation order.
  pub fn constraints(&self) -> Vec<Constraint<'_>> {
    let mut constraints = vec![];

    if let Some(ids) = self.ids.as_deref().filter(|ids| !ids.is_empty()) {
      constraints.push(Constraint::Ids(ids));
    }
    if let Some(authors) = self.authors.as_deref().filter(|a| !a.is_empty()) {
      constraints.push(Constraint::Authors(authors));
    }
    if let Some(kinds) = self.kinds.as_deref().filter(|k| !k.is_empty()) {
      constraints.push(Constraint::Kinds(kinds));
    }
    if let Some(since) = self.since {
      constraints.push(Constraint::Since(since));
    }
    if let Some(until) = self.until {
      constraints.push(Constraint::Until(until));
    }
    for (name, values) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
      constraints.push(Constraint::Tag {
        name: name.as_str(),
        values: values.as_slice(),
      });
    }

    constraints
  }

  pub fn matches(&self, event: &Event) -> bool {
    self
      .constraints()
      .iter()
      .all(|constraint| constraint.accepts(event))
  }

  /// Serialize as [`Value`], writing tag constraints as `#<name>` keys.
  pub fn as_value(&self) -> Value {
    let mut map = Map::new();
    if let Some(ids) = &self.ids {
      map.insert("ids".to_string(), Value::from(ids.clone()));
    }
    if let Some(authors) = &self.authors {
      map.insert("authors".to_string(), Value::from(authors.clone()));
    }
    if let Some(kinds) = &self.kinds {
      let kinds: Vec<u64> = kinds.iter().map(EventKind::as_u64).collect();
      map.insert("kinds".to_string(), Value::from(kinds));
    }
    for (name, values) in &self.tags {
      map.insert(format!("#{name}"), Value::from(values.clone()));
    }
    if let Some(since) = self.since {
      map.insert("since".to_string(), Value::from(since));
    }
    if let Some(until) = self.until {
      map.insert("until".to_string(), Value::from(until));
    }
    if let Some(limit) = self.limit {
      map.insert("limit".to_string(), Value::from(limit));
    }
    Value::Object(map)
  }

  /// Deserialize from [`Value`].
  ///
  /// Known fields with the wrong type make the whole filter invalid;
  /// unknown fields are ignored and `null` counts as absent.
  pub fn from_value(value: Value) -> Result<Self, Error> {
    let map = match value {
      Value::Object(map) => map,
      _ => return Err(Error::InvalidData),
    };

    let mut filter = Self::new();
    for (key, value) in map {
      if value.is_null() {
        continue;
      }
      match key.as_str() {
        "ids" => filter.ids = Some(string_list(&key, value)?),
        "authors" => filter.authors = Some(string_list(&key, value)?),
        "kinds" => {
          filter.kinds =
            Some(serde_json::from_value(value).map_err(|_| Error::InvalidField(key.clone()))?)
        }
        "since" => filter.since = Some(unsigned(&key, &value)?),
        "until" => filter.until = Some(unsigned(&key, &value)?),
        "limit" => filter.limit = Some(unsigned(&key, &value)?),
        tag if tag.len() > 1 && tag.starts_with('#') => {
          let values = string_list(&key, value)?;
          filter.tags.insert(tag[1..].to_string(), values);
        }
        _ => {}
      }
    }

    Ok(filter)
  }

  pub fn as_str(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_string(data: String) -> Result<Self, Error> {
    let value: Value = serde_json::from_str(&data)?;
    Self::from_value(value)
  }
}

/// `true` if the event passes at least one of the filters.
pub fn matches_any(filters: &[Filter], event: &Event) -> bool {
  filters.iter().any(|filter| filter.matches(event))
}

fn string_list(key: &str, value: Value) -> Result<Vec<String>, Error> {
  serde_json::from_value(value).map_err(|_| Error::InvalidField(key.to_string()))
}

fn unsigned(key: &str, value: &Value) -> Result<u64, Error> {
  value
    .as_u64()
    .ok_or_else(|| Error::InvalidField(key.to_string()))
}

impl Serialize for Filter {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for Filter {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let value: Value = Value::deserialize(deserializer)?;
    Filter::from_value(value).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::tag::{Tag, TagKind};

  #[cfg(test)]
  use pretty_assertions::assert_eq;
  use serde_json::json;

  fn event(kind: u64, pubkey: &str, created_at: Timestamp) -> Event {
    Event {
      id: String::from("00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae"),
      pubkey: pubkey.to_string(),
      created_at,
      kind: EventKind::from(kind),
      tags: vec![Tag::new(TagKind::Event, vec!["44b17a5a", "wss://relay.damus.io"])],
      ..Default::default()
    }
  }

  #[test]
  fn empty_filter_matches_everything() {
    let filter = Filter::new();
    assert!(filter.constraints().is_empty());
    assert!(filter.matches(&event(1, "a", 0)));
    assert!(filter.matches(&event(30023, "b", u64::MAX)));
  }

  #[test]
  fn kinds_constraint_ignores_author_and_time() {
    let mut filter = Filter::new();
    filter.add_kinds(vec![1]);

    assert!(filter.matches(&event(1, "alice", 10)));
    assert!(filter.matches(&event(1, "bob", 99999)));
    assert_eq!(filter.matches(&event(2, "alice", 10)), false);
    assert_eq!(filter.matches(&event(1111, "bob", 99999)), false);
  }

  #[test]
  fn since_and_until_are_inclusive() {
    let mut filter = Filter::new();
    filter.add_since(10).add_until(20);

    assert!(filter.matches(&event(1, "a", 10)));
    assert!(filter.matches(&event(1, "a", 20)));
    assert_eq!(filter.matches(&event(1, "a", 9)), false);
    assert_eq!(filter.matches(&event(1, "a", 21)), false);
  }

  #[test]
  fn ids_and_authors_accept_prefixes() {
    let mut filter = Filter::new();
    filter
      .add_ids(vec![String::from("00960b")])
      .add_authors(vec![String::from("614a")]);

    assert!(filter.matches(&event(1, "614a695b", 1)));
    assert_eq!(filter.matches(&event(1, "02c7e1b1", 1)), false);
  }

  #[test]
  fn tag_constraint_matches_the_first_value() {
    let mut filter = Filter::new();
    filter.add_tag("#e", vec![String::from("44b17a5a")]);
    assert!(filter.matches(&event(1, "a", 1)));

    let mut filter = Filter::new();
    filter.add_tag("e", vec![String::from("wss://relay.damus.io")]);
    assert_eq!(filter.matches(&event(1, "a", 1)), false);

    let mut filter = Filter::new();
    filter.add_tag("p", vec![String::from("44b17a5a")]);
    assert_eq!(filter.matches(&event(1, "a", 1)), false);
  }

  #[test]
  fn constraints_are_ordered_and_named() {
    let mut filter = Filter::new();
    filter
      .add_tag("t", vec![String::from("physics")])
      .add_until(5)
      .add_kinds(vec![30023])
      .add_authors(vec![])
      .add_ids(vec![String::from("ab")]);

    let constraints = filter.constraints();
    let names: Vec<&str> = constraints.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["ids", "kinds", "until", "t"]);
  }

  #[test]
  fn matches_any_is_an_or_across_filters() {
    let mut by_kind = Filter::new();
    by_kind.add_kinds(vec![30023]);
    let mut by_author = Filter::new();
    by_author.add_authors(vec![String::from("alice")]);
    let filters = vec![by_kind, by_author];

    assert!(matches_any(&filters, &event(30023, "bob", 1)));
    assert!(matches_any(&filters, &event(1, "alice", 1)));
    assert_eq!(matches_any(&filters, &event(1, "bob", 1)), false);
    assert_eq!(matches_any(&[], &event(1, "bob", 1)), false);
  }

  #[test]
  fn from_string() {
    let filter = json!({
      "#e": ["44b17a5acd66694cbdf5aea08968453658446368d978a15e61e599b8404d82c4"],
      "#p": ["potato"],
      "kinds": [1, 6, 7, 9735],
      "since": null,
      "limit": 10,
      "search": "ignored"
    })
    .to_string();

    let result = Filter::from_string(filter).unwrap();

    let mut expected = Filter::new();
    expected
      .add_tag(
        "e",
        vec![String::from("44b17a5acd66694cbdf5aea08968453658446368d978a15e61e599b8404d82c4")],
      )
      .add_tag("p", vec![String::from("potato")])
      .add_kinds(vec![1, 6, 7, 9735])
      .add_limit(10);
    assert_eq!(result, expected);
  }

  #[test]
  fn empty_lists_do_not_constrain() {
    let result = Filter::from_string(json!({"ids": [], "kinds": []}).to_string()).unwrap();

    assert_eq!(result.ids, Some(vec![]));
    assert!(result.constraints().is_empty());
    assert!(result.matches(&event(1, "a", 1)));
    assert!(result.matches(&event(30023, "b", 2)));
  }

  #[test]
  fn malformed_fields_are_rejected() {
    assert!(Filter::from_string(json!({"kinds": "1"}).to_string()).is_err());
    assert!(Filter::from_string(json!({"since": -1}).to_string()).is_err());
    assert!(Filter::from_string(json!({"#e": [1, 2]}).to_string()).is_err());
    assert!(Filter::from_string(json!(["kinds"]).to_string()).is_err());
  }

  #[test]
  fn as_str_writes_tags_with_a_hash() {
    let mut filter = Filter::new();
    filter.add_tag("e", vec![String::from("abc")]).add_kinds(vec![1]);

    let value: Value = serde_json::from_str(&filter.as_str()).unwrap();

    assert_eq!(value, json!({"#e": ["abc"], "kinds": [1]}));
    assert_eq!(serde_json::from_value::<Filter>(value).unwrap(), filter);
  }
}
