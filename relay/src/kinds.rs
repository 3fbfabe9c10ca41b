use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info};
use nostr_sdk::event::{kind::EventKind, tag::TagKind, Event};

use crate::{
  admission::Rejection,
  content_store::{ContentMetadata, ContentStore},
  error::{with_timeout, RelayError},
  payment::{GateDecision, PaymentGate},
  pricing::PricingOracle,
  publication::{PublicationRecord, PublicationStore},
  unix_now,
};

/// Payment facts of an admitted event, handed back to its handler once the
/// event is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admitted {
  pub payment_hash: Option<String>,
  pub price_paid: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindDecision {
  Allowed(Admitted),
  Rejected(Rejection),
}

/// Admission rules for one family of event kinds.
#[async_trait]
pub trait KindHandler: Send + Sync {
  fn name(&self) -> &'static str;

  /// Runs after signature verification and before the event is stored.
  async fn admit(&self, event: &Event) -> Result<KindDecision, RelayError>;

  /// Payment facts of an event that is already stored, recovered without
  /// pricing it again.
  async fn restore(&self, _event: &Event) -> Result<Admitted, RelayError> {
    Ok(Admitted::default())
  }

  /// Runs after the event is stored, on first submission and on resubmission,
  /// so it must be idempotent.
  async fn on_stored(&self, _event: &Event, _admitted: &Admitted) -> Result<(), RelayError> {
    Ok(())
  }
}

fn check_size(event: &Event, max: u64) -> Option<Rejection> {
  let size = event.content_size();
  if size > max {
    return Some(Rejection::ContentTooLarge { size, max });
  }
  None
}

/// Kinds anyone can publish for free, up to a size limit.
#[derive(Debug, Clone)]
pub struct FreeKind {
  max_content_bytes: u64,
}

impl FreeKind {
  pub fn new(max_content_bytes: u64) -> Self {
    Self { max_content_bytes }
  }
}

#[async_trait]
impl KindHandler for FreeKind {
  fn name(&self) -> &'static str {
    "free"
  }

  async fn admit(&self, event: &Event) -> Result<KindDecision, RelayError> {
    Ok(match check_size(event, self.max_content_bytes) {
      Some(rejection) => KindDecision::Rejected(rejection),
      None => KindDecision::Allowed(Admitted::default()),
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSchedule {
  /// Charged per MiB per year of storage.
  Storage,
  /// Charged per MiB, at least 1.
  Comment,
}

/// Kinds that must be paid for before they are admitted.
///
/// Admitted events get a publication record, and with a content store
/// configured their body is also written there.
pub struct PricedKind {
  name: &'static str,
  schedule: PriceSchedule,
  max_content_bytes: u64,
  oracle: PricingOracle,
  gate: Arc<PaymentGate>,
  publications: Arc<dyn PublicationStore>,
  content: Option<Arc<dyn ContentStore>>,
  timeout: Duration,
}

impl PricedKind {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    name: &'static str,
    schedule: PriceSchedule,
    max_content_bytes: u64,
    oracle: PricingOracle,
    gate: Arc<PaymentGate>,
    publications: Arc<dyn PublicationStore>,
    content: Option<Arc<dyn ContentStore>>,
    timeout: Duration,
  ) -> Self {
    Self {
      name,
      schedule,
      max_content_bytes,
      oracle,
      gate,
      publications,
      content,
      timeout,
    }
  }

  /// Current price of `size_bytes` of content.
  pub fn quote(&self, size_bytes: u64) -> u64 {
    match self.schedule {
      PriceSchedule::Storage => self.oracle.price(size_bytes, self.oracle.storage_years()),
      PriceSchedule::Comment => self.oracle.comment_price(size_bytes),
    }
  }
}

#[async_trait]
impl KindHandler for PricedKind {
  fn name(&self) -> &'static str {
    self.name
  }

  async fn admit(&self, event: &Event) -> Result<KindDecision, RelayError> {
    if let Some(rejection) = check_size(event, self.max_content_bytes) {
      return Ok(KindDecision::Rejected(rejection));
    }

    let amount = self.quote(event.content_size());
    debug!("Event {} ({}) costs {amount}", event.id, self.name);
    if amount == 0 {
      return Ok(KindDecision::Allowed(Admitted::default()));
    }

    Ok(match self.gate.admit(event, amount).await? {
      GateDecision::Allowed {
        payment_hash,
        amount,
      } => KindDecision::Allowed(Admitted {
        payment_hash: Some(payment_hash),
        price_paid: Some(amount),
      }),
      GateDecision::Rejected(rejection) => KindDecision::Rejected(Rejection::Payment(rejection)),
    })
  }

  async fn restore(&self, event: &Event) -> Result<Admitted, RelayError> {
    let payment_hash = match event.tag_value(TagKind::Payment) {
      Some(hash) => hash.to_string(),
      None => return Ok(Admitted::default()),
    };
    let price_paid = self.gate.paid_amount(&payment_hash).await?;

    Ok(Admitted {
      payment_hash: Some(payment_hash),
      price_paid,
    })
  }

  async fn on_stored(&self, event: &Event, admitted: &Admitted) -> Result<(), RelayError> {
    let record = PublicationRecord::new_submitted(
      event,
      admitted.payment_hash.clone(),
      admitted.price_paid,
      unix_now(),
    );
    let created = with_timeout(
      "publication create",
      self.timeout,
      self.publications.create(record),
    )
    .await?;
    if created {
      info!("New {} submission {}", self.name, event.id);
    }

    if let Some(content) = &self.content {
      let metadata =
        ContentMetadata::from_event(event, admitted.payment_hash.clone(), admitted.price_paid);
      with_timeout(
        "content write",
        self.timeout,
        content.write(&event.id, &event.content, &metadata),
      )
      .await?;
    }

    Ok(())
  }
}

/// Maps event kinds to their handler. Unregistered kinds get the fallback.
pub struct KindRegistry {
  handlers: HashMap<u64, Arc<dyn KindHandler>>,
  fallback: Arc<dyn KindHandler>,
}

impl KindRegistry {
  pub fn new(fallback: Arc<dyn KindHandler>) -> Self {
    Self {
      handlers: HashMap::new(),
      fallback,
    }
  }

  pub fn register(&mut self, kind: u64, handler: Arc<dyn KindHandler>) -> &mut Self {
    self.handlers.insert(kind, handler);
    self
  }

  pub fn handler_for(&self, kind: EventKind) -> &Arc<dyn KindHandler> {
    self.handlers.get(&kind.as_u64()).unwrap_or(&self.fallback)
  }
}
