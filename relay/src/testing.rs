//! In-memory collaborators and event helpers for tests.

use std::{
  collections::HashMap,
  io,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
  },
};

use async_trait::async_trait;
use nostr_sdk::{
  event::{kind::EventKind, tag::Tag, Event},
  filter::Filter,
  schnorr::generate_keys,
};

use crate::{
  content_store::{ContentMetadata, ContentStore},
  error::RelayError,
  payment::{Invoice, InvoiceStore},
  publication::{PublicationError, PublicationRecord, PublicationStatus, PublicationStore},
  storage::{select_events, EventStore},
  unix_now,
};

/// A validly signed event from a fresh key.
pub fn signed_event(kind: EventKind, content: &str, tags: Vec<Tag>) -> Event {
  signed_event_at(kind, content, tags, unix_now())
}

pub fn signed_event_at(kind: EventKind, content: &str, tags: Vec<Tag>, created_at: u64) -> Event {
  let keys = generate_keys();
  let mut event = Event::new_without_signature(
    keys.x_only_public_key(),
    created_at,
    kind,
    tags,
    content.to_string(),
  );
  event
    .sign_event(keys.private_key.secret_bytes().to_vec())
    .unwrap();
  event
}

#[derive(Default)]
pub struct MemoryEventStore {
  events: Mutex<Vec<Event>>,
  hang_after_save: AtomicBool,
}

impl MemoryEventStore {
  pub fn len(&self) -> usize {
    self.events.lock().unwrap().len()
  }

  /// From now on `save` stores the event and then never returns.
  pub fn hang_after_save(&self, hang: bool) {
    self.hang_after_save.store(hang, Ordering::SeqCst);
  }
}

#[async_trait]
impl EventStore for MemoryEventStore {
  async fn save(&self, event: &Event) -> Result<bool, RelayError> {
    let inserted = {
      let mut events = self.events.lock().unwrap();
      let exists = events.iter().any(|stored| stored.id == event.id);
      if !exists {
        events.push(event.clone());
      }
      !exists
    };
    if self.hang_after_save.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    Ok(inserted)
  }

  async fn contains(&self, event_id: &str) -> Result<bool, RelayError> {
    Ok(self.events.lock().unwrap().iter().any(|stored| stored.id == event_id))
  }

  async fn query(&self, filters: &[Filter], limit: usize) -> Result<Vec<Event>, RelayError> {
    Ok(select_events(&self.events.lock().unwrap(), filters, limit))
  }
}

/// Never answers.
pub struct StalledEventStore;

#[async_trait]
impl EventStore for StalledEventStore {
  async fn save(&self, _event: &Event) -> Result<bool, RelayError> {
    std::future::pending().await
  }

  async fn contains(&self, _event_id: &str) -> Result<bool, RelayError> {
    std::future::pending().await
  }

  async fn query(&self, _filters: &[Filter], _limit: usize) -> Result<Vec<Event>, RelayError> {
    std::future::pending().await
  }
}

#[derive(Default)]
pub struct MemoryInvoiceStore {
  invoices: Mutex<HashMap<String, Invoice>>,
}

impl MemoryInvoiceStore {
  pub fn get(&self, payment_hash: &str) -> Option<Invoice> {
    self.invoices.lock().unwrap().get(payment_hash).cloned()
  }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
  async fn lookup(&self, payment_hash: &str) -> Result<Option<Invoice>, RelayError> {
    Ok(self.get(payment_hash))
  }

  async fn insert(&self, invoice: Invoice) -> Result<(), RelayError> {
    self
      .invoices
      .lock()
      .unwrap()
      .insert(invoice.payment_hash.clone(), invoice);
    Ok(())
  }

  async fn mark_paid(&self, payment_hash: &str) -> Result<(), RelayError> {
    if let Some(invoice) = self.invoices.lock().unwrap().get_mut(payment_hash) {
      invoice.paid = true;
    }
    Ok(())
  }
}

#[derive(Default)]
pub struct MemoryPublicationStore {
  records: Mutex<HashMap<String, PublicationRecord>>,
  payments: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl PublicationStore for MemoryPublicationStore {
  async fn create(&self, record: PublicationRecord) -> Result<bool, RelayError> {
    let mut records = self.records.lock().unwrap();
    if records.contains_key(&record.event_id) {
      return Ok(false);
    }
    records.insert(record.event_id.clone(), record);
    Ok(true)
  }

  async fn get(&self, event_id: &str) -> Result<Option<PublicationRecord>, RelayError> {
    Ok(self.records.lock().unwrap().get(event_id).cloned())
  }

  async fn update(
    &self,
    event_id: &str,
    target: PublicationStatus,
    now: u64,
  ) -> Result<PublicationRecord, RelayError> {
    let mut records = self.records.lock().unwrap();
    let record = records
      .get_mut(event_id)
      .ok_or_else(|| PublicationError::NotFound(event_id.to_string()))?;
    record.transition(target, now)?;
    Ok(record.clone())
  }

  async fn bind_payment(&self, payment_hash: &str, event_id: &str) -> Result<bool, RelayError> {
    let mut payments = self.payments.lock().unwrap();
    match payments.get(payment_hash) {
      Some(owner) => Ok(owner == event_id),
      None => {
        payments.insert(payment_hash.to_string(), event_id.to_string());
        Ok(true)
      }
    }
  }
}

#[derive(Default)]
pub struct MemoryContentStore {
  bodies: Mutex<HashMap<String, (String, ContentMetadata)>>,
  failing_writes: AtomicUsize,
}

impl MemoryContentStore {
  /// The next `count` writes fail.
  pub fn fail_next_writes(&self, count: usize) {
    self.failing_writes.store(count, Ordering::SeqCst);
  }

  pub fn body(&self, event_id: &str) -> Option<String> {
    self
      .bodies
      .lock()
      .unwrap()
      .get(event_id)
      .map(|(body, _)| body.clone())
  }

  pub fn metadata(&self, event_id: &str) -> Option<ContentMetadata> {
    self
      .bodies
      .lock()
      .unwrap()
      .get(event_id)
      .map(|(_, metadata)| metadata.clone())
  }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
  async fn write(
    &self,
    event_id: &str,
    content: &str,
    metadata: &ContentMetadata,
  ) -> Result<(), RelayError> {
    let failed = self
      .failing_writes
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
      .is_ok();
    if failed {
      return Err(io::Error::new(io::ErrorKind::Other, "disk full").into());
    }

    self.bodies.lock().unwrap().insert(
      event_id.to_string(),
      (content.to_string(), metadata.clone()),
    );
    Ok(())
  }
}
