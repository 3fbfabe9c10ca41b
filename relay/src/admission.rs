use std::{
  collections::HashSet,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use log::{error, info, warn};
use nostr_sdk::{
  event::Event,
  filter::Filter,
  relay_to_client_communication::{
    eose::RelayToClientCommEose, event::RelayToClientCommEvent, notice::RelayToClientCommNotice,
    ok::RelayToClientCommOk,
  },
};

use crate::{
  config::{LiveConfig, RelayConfig},
  content_store::{ContentStore, FsContentStore},
  error::{with_timeout, RelayError},
  kinds::{FreeKind, KindDecision, KindHandler, KindRegistry, PriceSchedule, PricedKind},
  payment::{
    settlement_from_config, InvoiceStore, PaymentGate, PaymentRejection, PaymentSettlement,
  },
  pricing::PricingOracle,
  publication::{PublicationRecord, PublicationStatus, PublicationStore},
  storage::{EventStore, RedbStore},
  subscription::{ConnectionId, SubscriptionRegistry, Tx},
  unix_now,
};

pub const DUPLICATE_REASON: &str = "duplicate: already have this event";

/// Why an event was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
  /// The id is not the hash of the event's content.
  InvalidId,
  InvalidSignature,
  ContentTooLarge { size: u64, max: u64 },
  Payment(PaymentRejection),
  /// A collaborator failed or timed out.
  ServerError,
}

impl Rejection {
  /// Reason sent in the `OK` message, prefixed as NIP-01 machine-readable.
  pub fn reason(&self) -> String {
    match self {
      Self::InvalidId => "invalid: invalid signature (event id does not match)".to_string(),
      Self::InvalidSignature => "invalid: invalid signature".to_string(),
      Self::ContentTooLarge { size, max } => {
        format!("invalid: content too large ({size} bytes, max {max})")
      }
      Self::Payment(rejection) => format!("payment-required: {rejection}"),
      Self::ServerError => "error: server error".to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stored {
  New,
  Duplicate,
}

/// Replies to one `EVENT` message: an optional price quote and the `OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
  pub notice: Option<RelayToClientCommNotice>,
  pub ok: RelayToClientCommOk,
}

impl SubmitOutcome {
  pub fn accepted(&self) -> bool {
    self.ok.accepted
  }
}

/// The outer systems the relay talks to.
pub struct Collaborators {
  pub events: Arc<dyn EventStore>,
  pub invoices: Arc<dyn InvoiceStore>,
  pub publications: Arc<dyn PublicationStore>,
  pub content: Arc<dyn ContentStore>,
  pub settlement: Arc<dyn PaymentSettlement>,
}

impl Collaborators {
  /// redb for events, invoices and records, the filesystem for paper bodies,
  /// and the configured payment backend.
  pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
    let store = Arc::new(RedbStore::new(&config.db_path)?);

    Ok(Self {
      events: store.clone(),
      invoices: store.clone(),
      publications: store,
      content: Arc::new(FsContentStore::new(&config.content_dir)),
      settlement: settlement_from_config(config)?,
    })
  }
}

/// Event admission and subscription matching.
pub struct Relay {
  events: Arc<dyn EventStore>,
  publications: Arc<dyn PublicationStore>,
  gate: Arc<PaymentGate>,
  kinds: KindRegistry,
  subscriptions: SubscriptionRegistry,
  live_config: LiveConfig,
  /// Ids whose save timed out or failed, possibly after being written.
  unsettled_saves: Mutex<HashSet<String>>,
  max_query_limit: usize,
  timeout: Duration,
}

impl Relay {
  pub fn new(config: &RelayConfig, collaborators: Collaborators) -> Self {
    let timeout = config.collaborator_timeout;
    let live_config = LiveConfig::new(config.pricing);
    let oracle = PricingOracle::new(live_config.clone());
    let gate = Arc::new(PaymentGate::new(
      collaborators.invoices,
      collaborators.settlement,
      collaborators.publications.clone(),
      timeout,
      config.invoice_expiry,
    ));

    let mut kinds = KindRegistry::new(Arc::new(FreeKind::new(config.max_event_bytes)));
    kinds
      .register(
        config.paper_kind,
        Arc::new(PricedKind::new(
          "paper",
          PriceSchedule::Storage,
          config.max_paper_bytes,
          oracle.clone(),
          gate.clone(),
          collaborators.publications.clone(),
          Some(collaborators.content),
          timeout,
        )),
      )
      .register(
        config.comment_kind,
        Arc::new(PricedKind::new(
          "comment",
          PriceSchedule::Comment,
          config.max_comment_bytes,
          oracle,
          gate.clone(),
          collaborators.publications.clone(),
          None,
          timeout,
        )),
      );

    Self {
      events: collaborators.events,
      publications: collaborators.publications,
      gate,
      kinds,
      subscriptions: SubscriptionRegistry::new(),
      live_config,
      unsettled_saves: Mutex::new(HashSet::new()),
      max_query_limit: config.max_query_limit,
      timeout,
    }
  }

  pub fn live_config(&self) -> &LiveConfig {
    &self.live_config
  }

  pub fn subscriptions(&self) -> &SubscriptionRegistry {
    &self.subscriptions
  }

  pub fn connect(&self, connection: ConnectionId, tx: Tx) {
    self.subscriptions.connect(connection, tx);
  }

  /// Drops every subscription of a closed connection.
  pub fn disconnect(&self, connection: ConnectionId) -> usize {
    let removed = self.subscriptions.unregister_all(connection);
    info!("Connection {connection} closed, {removed} subscriptions removed");
    removed
  }

  /// Runs an event through verification, its kind's rules, storage and
  /// broadcast.
  ///
  /// Priced events without a payment get a fresh invoice quoted in a notice.
  pub async fn submit(&self, event: Event) -> SubmitOutcome {
    match self.admit(&event).await {
      Ok(Stored::New) => SubmitOutcome {
        notice: None,
        ok: RelayToClientCommOk::new_ok(event.id, true, String::new()),
      },
      Ok(Stored::Duplicate) => SubmitOutcome {
        notice: None,
        ok: RelayToClientCommOk::new_ok(event.id, true, DUPLICATE_REASON.to_string()),
      },
      Err(rejection) => {
        let reason = rejection.reason();
        info!("Event {} rejected: {reason}", event.id);

        let notice = match rejection {
          Rejection::Payment(PaymentRejection::PaymentRequired { amount }) => {
            self.price_quote(&event, amount).await
          }
          _ => None,
        };

        SubmitOutcome {
          notice,
          ok: RelayToClientCommOk::new_ok(event.id, false, reason),
        }
      }
    }
  }

  async fn admit(&self, event: &Event) -> Result<Stored, Rejection> {
    if !event.check_event_id() {
      return Err(Rejection::InvalidId);
    }
    if !event.check_event_signature() {
      return Err(Rejection::InvalidSignature);
    }

    let handler = self.kinds.handler_for(event.kind);

    let stored = with_timeout("event lookup", self.timeout, self.events.contains(&event.id))
      .await
      .map_err(|err| server_error(event, err))?;
    if stored {
      return Ok(self.resubmitted(&**handler, event).await);
    }

    let admitted = match handler
      .admit(event)
      .await
      .map_err(|err| server_error(event, err))?
    {
      KindDecision::Allowed(admitted) => admitted,
      KindDecision::Rejected(rejection) => return Err(rejection),
    };

    let inserted = match with_timeout("event save", self.timeout, self.events.save(event)).await {
      Ok(inserted) => inserted,
      Err(err) => {
        // The save may still land, so a resubmission must broadcast it.
        self.unsettled_saves().insert(event.id.clone());
        return Err(server_error(event, err));
      }
    };
    self.unsettled_saves().remove(&event.id);

    if let Err(err) = handler.on_stored(event, &admitted).await {
      error!("Post-storage step for {} failed: {err}", event.id);
    }

    if !inserted {
      return Ok(Stored::Duplicate);
    }

    info!("Event {} ({}) admitted", event.id, handler.name());
    self.subscriptions.broadcast(event);
    Ok(Stored::New)
  }

  /// An event that is already stored: repair what its handler keeps beside
  /// the event, and broadcast it if its first save was never confirmed.
  async fn resubmitted(&self, handler: &dyn KindHandler, event: &Event) -> Stored {
    let repaired = match handler.restore(event).await {
      Ok(admitted) => handler.on_stored(event, &admitted).await,
      Err(err) => Err(err),
    };
    if let Err(err) = repaired {
      error!("Post-storage step for {} failed again: {err}", event.id);
    }

    if !self.unsettled_saves().remove(&event.id) {
      return Stored::Duplicate;
    }

    info!("Event {} ({}) admitted after an unconfirmed save", event.id, handler.name());
    self.subscriptions.broadcast(event);
    Stored::New
  }

  fn unsettled_saves(&self) -> MutexGuard<'_, HashSet<String>> {
    self
      .unsettled_saves
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  async fn price_quote(&self, event: &Event, amount: u64) -> Option<RelayToClientCommNotice> {
    match self.gate.quote(event, amount).await {
      Ok(invoice) => Some(RelayToClientCommNotice::new_notice(format!(
        "price quote for event {}: amount={} payment_hash={} payment_request={} \
         (sign the event again with the tag [\"payment\",\"{}\"])",
        event.id, invoice.amount, invoice.payment_hash, invoice.payment_request, invoice.payment_hash
      ))),
      Err(err) => {
        error!("Could not issue an invoice for {}: {err}", event.id);
        None
      }
    }
  }

  /// Registers subscription `name` and replays the stored events matching it,
  /// followed by `EOSE`.
  ///
  /// Events admitted while the replay runs are delivered after the `EOSE`,
  /// exactly once. Returns the number of replayed events.
  pub async fn subscribe(
    &self,
    connection: ConnectionId,
    name: &str,
    filters: Vec<Filter>,
  ) -> Result<usize, RelayError> {
    if !self.subscriptions.register(connection, name, filters.clone()) {
      return Err(RelayError::UnknownConnection(connection));
    }

    let stored = match with_timeout(
      "event query",
      self.timeout,
      self.events.query(&filters, self.max_query_limit),
    )
    .await
    {
      Ok(stored) => stored,
      Err(err) => {
        warn!("Replay for subscription {name} of {connection} failed: {err}");
        self.subscriptions.unregister(connection, name);
        return Err(err);
      }
    };

    let replayed: HashSet<String> = stored.iter().map(|event| event.id.clone()).collect();
    let count = stored.len();
    for event in stored {
      let message = RelayToClientCommEvent::new_event(name.to_string(), event).as_json();
      self.subscriptions.send(connection, message);
    }
    self.subscriptions.send(
      connection,
      RelayToClientCommEose::new_eose(name.to_string()).as_json(),
    );
    self.subscriptions.finish_replay(connection, name, &replayed);

    Ok(count)
  }

  pub fn unsubscribe(&self, connection: ConnectionId, name: &str) -> bool {
    self.subscriptions.unregister(connection, name)
  }

  /// Moves a publication to `target` on behalf of a reviewer.
  pub async fn review(
    &self,
    event_id: &str,
    target: PublicationStatus,
  ) -> Result<PublicationRecord, RelayError> {
    let record = with_timeout(
      "publication update",
      self.timeout,
      self.publications.update(event_id, target, unix_now()),
    )
    .await?;
    info!("Publication {event_id} is {}", record.status);
    Ok(record)
  }

  pub async fn publication(&self, event_id: &str) -> Result<Option<PublicationRecord>, RelayError> {
    with_timeout(
      "publication lookup",
      self.timeout,
      self.publications.get(event_id),
    )
    .await
  }
}

fn server_error(event: &Event, err: RelayError) -> Rejection {
  error!("Admission of {} failed: {err}", event.id);
  Rejection::ServerError
}
