use std::{fmt, str::FromStr};

use async_trait::async_trait;
use nostr_sdk::event::Event;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Review status of a priced submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
  Submitted,
  UnderReview,
  Accepted,
  Rejected,
  Published,
}

impl PublicationStatus {
  /// Whether `self -> target` is one of the allowed edges.
  /// Staying in the same state is not an edge.
  pub fn can_transition_to(self, target: PublicationStatus) -> bool {
    matches!(
      (self, target),
      (Self::Submitted, Self::UnderReview)
        | (Self::UnderReview, Self::Accepted)
        | (Self::UnderReview, Self::Rejected)
        | (Self::Accepted, Self::Published)
    )
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Rejected | Self::Published)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Submitted => "submitted",
      Self::UnderReview => "under_review",
      Self::Accepted => "accepted",
      Self::Rejected => "rejected",
      Self::Published => "published",
    }
  }
}

impl fmt::Display for PublicationStatus {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for PublicationStatus {
  type Err = PublicationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "submitted" => Ok(Self::Submitted),
      "under_review" => Ok(Self::UnderReview),
      "accepted" => Ok(Self::Accepted),
      "rejected" => Ok(Self::Rejected),
      "published" => Ok(Self::Published),
      other => Err(PublicationError::UnknownStatus(other.to_string())),
    }
  }
}

/// [`PublicationRecord`] error
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PublicationError {
  #[error("Invalid transition from {from} to {to}")]
  InvalidTransition {
    from: PublicationStatus,
    to: PublicationStatus,
  },
  #[error("No publication record for event {0}")]
  NotFound(String),
  #[error("Unknown publication status `{0}`")]
  UnknownStatus(String),
}

/// Lifecycle of one admitted priced event. Keyed by the event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
  pub event_id: String,
  pub kind: u64,
  pub status: PublicationStatus,
  pub size_bytes: u64,
  pub payment_hash: Option<String>,
  pub price_paid: Option<u64>,
  pub created_at: u64,
  pub updated_at: u64,
  pub published_at: Option<u64>,
}

impl PublicationRecord {
  /// A fresh record for an event that just passed the payment gate.
  pub fn new_submitted(
    event: &Event,
    payment_hash: Option<String>,
    price_paid: Option<u64>,
    now: u64,
  ) -> Self {
    Self {
      event_id: event.id.clone(),
      kind: event.kind.as_u64(),
      status: PublicationStatus::Submitted,
      size_bytes: event.content_size(),
      payment_hash,
      price_paid,
      created_at: now,
      updated_at: now,
      published_at: None,
    }
  }

  /// Moves the record to `target`.
  ///
  /// Returns `Ok(false)` when the record already is in `target`, leaving it
  /// untouched. `published_at` is stamped the first time the record is
  /// published and never rewritten.
  pub fn transition(&mut self, target: PublicationStatus, now: u64) -> Result<bool, PublicationError> {
    if self.status == target {
      return Ok(false);
    }

    if !self.status.can_transition_to(target) {
      return Err(PublicationError::InvalidTransition {
        from: self.status,
        to: target,
      });
    }

    self.status = target;
    self.updated_at = now;
    if target == PublicationStatus::Published && self.published_at.is_none() {
      self.published_at = Some(now);
    }

    Ok(true)
  }
}

/// Durable store of [`PublicationRecord`]s and of which event each payment
/// was spent on.
#[async_trait]
pub trait PublicationStore: Send + Sync {
  /// Stores `record` unless one exists for the same event.
  /// Returns whether it was stored.
  async fn create(&self, record: PublicationRecord) -> Result<bool, RelayError>;

  async fn get(&self, event_id: &str) -> Result<Option<PublicationRecord>, RelayError>;

  /// Applies [`PublicationRecord::transition`] atomically and returns the
  /// resulting record.
  async fn update(
    &self,
    event_id: &str,
    target: PublicationStatus,
    now: u64,
  ) -> Result<PublicationRecord, RelayError>;

  /// Binds `payment_hash` to `event_id`.
  ///
  /// Returns false if the payment is already bound to a different event.
  /// Binding the same pair again succeeds.
  async fn bind_payment(&self, payment_hash: &str, event_id: &str) -> Result<bool, RelayError>;
}
