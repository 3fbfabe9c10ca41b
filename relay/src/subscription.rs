use std::{
  collections::{HashMap, HashSet},
  sync::{Mutex, MutexGuard, PoisonError},
};

use log::debug;
use nostr_sdk::{
  event::Event,
  filter::{matches_any, Filter},
  relay_to_client_communication::event::RelayToClientCommEvent,
};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

pub type Tx = tokio::sync::mpsc::UnboundedSender<Message>;
pub type ConnectionId = Uuid;

/// Queues a text frame for one client.
/// Returns false if the client's connection is already gone.
pub fn send_message_to_client(tx: &Tx, content: String) -> bool {
  debug!("{content}");
  match tx.send(Message::Text(content)) {
    Ok(()) => true,
    Err(err) => {
      debug!("Dropping message for a closed connection: {err}");
      false
    }
  }
}

#[derive(Debug)]
struct Subscription {
  filters: Vec<Filter>,
  /// While stored events are replayed, matching broadcasts wait here.
  replay_buffer: Option<Vec<Event>>,
}

#[derive(Debug)]
struct ClientConnection {
  tx: Tx,
  subscriptions: HashMap<String, Subscription>,
}

/// Every open connection and its subscriptions.
///
/// One mutex guards the whole map and is held for the full duration of each
/// operation, so a broadcast never observes a half-registered subscription.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
  connections: Mutex<HashMap<ConnectionId, ClientConnection>>,
}

impl SubscriptionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, ClientConnection>> {
    self.connections.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn connect(&self, connection: ConnectionId, tx: Tx) {
    self.lock().insert(
      connection,
      ClientConnection {
        tx,
        subscriptions: HashMap::new(),
      },
    );
  }

  /// Adds or replaces the subscription `name` of `connection`.
  ///
  /// The subscription starts out replaying: broadcasts matching it are held
  /// back until [`SubscriptionRegistry::finish_replay`].
  /// Returns false if the connection is unknown.
  pub fn register(&self, connection: ConnectionId, name: &str, filters: Vec<Filter>) -> bool {
    let mut connections = self.lock();
    match connections.get_mut(&connection) {
      Some(client) => {
        let replaced = client
          .subscriptions
          .insert(
            name.to_string(),
            Subscription {
              filters,
              replay_buffer: Some(vec![]),
            },
          )
          .is_some();
        debug!("Subscription {name} of {connection} registered (replaced: {replaced})");
        true
      }
      None => false,
    }
  }

  /// Switches the subscription to live delivery, first sending the events
  /// buffered during replay that are not in `replayed`.
  /// Returns how many buffered events were sent.
  pub fn finish_replay(
    &self,
    connection: ConnectionId,
    name: &str,
    replayed: &HashSet<String>,
  ) -> usize {
    let mut connections = self.lock();
    let client = match connections.get_mut(&connection) {
      Some(client) => client,
      None => return 0,
    };
    let buffered = match client
      .subscriptions
      .get_mut(name)
      .and_then(|subscription| subscription.replay_buffer.take())
    {
      Some(buffered) => buffered,
      None => return 0,
    };

    let mut sent = 0;
    for event in buffered {
      if replayed.contains(&event.id) {
        continue;
      }
      let message = RelayToClientCommEvent::new_event(name.to_string(), event).as_json();
      if send_message_to_client(&client.tx, message) {
        sent += 1;
      }
    }
    sent
  }

  /// Sends a text frame to `connection`.
  pub fn send(&self, connection: ConnectionId, content: String) -> bool {
    match self.lock().get(&connection) {
      Some(client) => send_message_to_client(&client.tx, content),
      None => false,
    }
  }

  pub fn unregister(&self, connection: ConnectionId, name: &str) -> bool {
    self
      .lock()
      .get_mut(&connection)
      .map_or(false, |client| client.subscriptions.remove(name).is_some())
  }

  /// Forgets the connection and all its subscriptions.
  /// Returns how many subscriptions it had.
  pub fn unregister_all(&self, connection: ConnectionId) -> usize {
    self
      .lock()
      .remove(&connection)
      .map_or(0, |client| client.subscriptions.len())
  }

  /// Delivers `event` once to every subscription with a matching filter.
  /// Returns the number of subscriptions it was delivered or buffered for.
  pub fn broadcast(&self, event: &Event) -> usize {
    let mut connections = self.lock();
    let mut deliveries = 0;

    for client in connections.values_mut() {
      for (name, subscription) in client.subscriptions.iter_mut() {
        if !matches_any(&subscription.filters, event) {
          continue;
        }

        match &mut subscription.replay_buffer {
          Some(buffer) => {
            buffer.push(event.clone());
            deliveries += 1;
          }
          None => {
            let message = RelayToClientCommEvent::new_event(name.clone(), event.clone()).as_json();
            if send_message_to_client(&client.tx, message) {
              deliveries += 1;
            }
          }
        }
      }
    }

    debug!("Event {} broadcast to {deliveries} subscriptions", event.id);
    deliveries
  }

  pub fn subscription_count(&self, connection: ConnectionId) -> usize {
    self
      .lock()
      .get(&connection)
      .map_or(0, |client| client.subscriptions.len())
  }

  pub fn connection_count(&self) -> usize {
    self.lock().len()
  }

  /// Senders of every open connection.
  pub fn senders(&self) -> Vec<Tx> {
    self.lock().values().map(|client| client.tx.clone()).collect()
  }
}
