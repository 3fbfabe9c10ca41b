pub mod database;

use std::collections::HashSet;

use async_trait::async_trait;
use nostr_sdk::{event::Event, filter::Filter};

use crate::error::RelayError;

pub use self::database::RedbStore;

/// Durable store of admitted events.
#[async_trait]
pub trait EventStore: Send + Sync {
  /// Inserts `event` unless an event with the same id is stored.
  /// Returns whether it was inserted.
  async fn save(&self, event: &Event) -> Result<bool, RelayError>;

  async fn contains(&self, event_id: &str) -> Result<bool, RelayError>;

  /// Stored events matching any of `filters`, newest first.
  ///
  /// Each filter contributes at most its own `limit` events, and the whole
  /// result holds at most `limit` events.
  async fn query(&self, filters: &[Filter], limit: usize) -> Result<Vec<Event>, RelayError>;
}

/// The query semantics of [`EventStore::query`] over an in-memory list.
pub fn select_events(events: &[Event], filters: &[Filter], limit: usize) -> Vec<Event> {
  let mut seen: HashSet<&str> = HashSet::new();
  let mut selected: Vec<&Event> = vec![];

  for filter in filters {
    let mut matching: Vec<&Event> = events.iter().filter(|event| filter.matches(event)).collect();
    sort_newest_first(&mut matching);

    let filter_limit = filter
      .limit
      .map_or(limit, |filter_limit| (filter_limit as usize).min(limit));

    for event in matching.into_iter().take(filter_limit) {
      if seen.insert(event.id.as_str()) {
        selected.push(event);
      }
    }
  }

  sort_newest_first(&mut selected);
  selected.truncate(limit);
  selected.into_iter().cloned().collect()
}

fn sort_newest_first(events: &mut [&Event]) {
  events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
