use std::{fs, path::Path, sync::Arc};

use async_trait::async_trait;
use log::{debug, info};
use nostr_sdk::{event::Event, filter::Filter};
use redb::{Database, ReadableTable, TableDefinition};

use super::{select_events, EventStore};
use crate::{
  error::RelayError,
  payment::{Invoice, InvoiceStore},
  publication::{PublicationError, PublicationRecord, PublicationStatus, PublicationStore},
};

type StrTable = TableDefinition<'static, &'static str, &'static str>;

/// event id -> event json
const EVENTS_TABLE: StrTable = TableDefinition::new("events");
/// payment hash -> invoice json
const INVOICES_TABLE: StrTable = TableDefinition::new("invoices");
/// event id -> publication record json
const PUBLICATIONS_TABLE: StrTable = TableDefinition::new("publications");
/// payment hash -> id of the event it paid for
const PAYMENTS_TABLE: StrTable = TableDefinition::new("payments");

/// Events, invoices and publication records in one redb file.
///
/// redb calls block, so every operation runs on tokio's blocking pool.
#[derive(Clone)]
pub struct RedbStore {
  db: Arc<Database>,
}

impl RedbStore {
  pub fn new(path: impl AsRef<Path>) -> Result<Self, redb::Error> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
      }
    }
    let db = Database::create(path)?;

    let write_txn = db.begin_write()?;
    for table in [EVENTS_TABLE, INVOICES_TABLE, PUBLICATIONS_TABLE, PAYMENTS_TABLE] {
      write_txn.open_table(table)?; // creates the table if it doesn't exist
    }
    write_txn.commit()?;
    info!("Database opened at {}", path.display());

    Ok(Self { db: Arc::new(db) })
  }

  async fn blocking<T, F>(&self, work: F) -> Result<T, RelayError>
  where
    F: FnOnce(&Database) -> Result<T, RelayError> + Send + 'static,
    T: Send + 'static,
  {
    let db = Arc::clone(&self.db);
    tokio::task::spawn_blocking(move || work(&db)).await?
  }
}

fn insert_if_absent(db: &Database, table: StrTable, key: &str, value: &str) -> Result<bool, redb::Error> {
  let write_txn = db.begin_write()?;
  let inserted = {
    let mut table = write_txn.open_table(table)?;
    let exists = table.get(key)?.is_some();
    if !exists {
      table.insert(key, value)?;
    }
    !exists
  };
  write_txn.commit()?;
  Ok(inserted)
}

fn put(db: &Database, table: StrTable, key: &str, value: &str) -> Result<(), redb::Error> {
  let write_txn = db.begin_write()?;
  {
    let mut table = write_txn.open_table(table)?;
    table.insert(key, value)?;
  }
  write_txn.commit()?;
  Ok(())
}

fn get(db: &Database, table: StrTable, key: &str) -> Result<Option<String>, redb::Error> {
  let read_txn = db.begin_read()?;
  let table = read_txn.open_table(table)?;
  let value = table.get(key)?.map(|guard| guard.value().to_string());
  Ok(value)
}

fn all_values(db: &Database, table: StrTable) -> Result<Vec<String>, redb::Error> {
  let read_txn = db.begin_read()?;
  let table = read_txn.open_table(table)?;
  let mut values = vec![];
  for entry in table.iter()? {
    let (_, value) = entry?;
    values.push(value.value().to_string());
  }
  Ok(values)
}

#[async_trait]
impl EventStore for RedbStore {
  async fn save(&self, event: &Event) -> Result<bool, RelayError> {
    let id = event.id.clone();
    let json = event.as_json();

    let inserted = self
      .blocking(move |db| Ok(insert_if_absent(db, EVENTS_TABLE, &id, &json)?))
      .await?;
    debug!("Event {} saved: {inserted}", event.id);
    Ok(inserted)
  }

  async fn contains(&self, event_id: &str) -> Result<bool, RelayError> {
    let event_id = event_id.to_string();

    self
      .blocking(move |db| Ok(get(db, EVENTS_TABLE, &event_id)?.is_some()))
      .await
  }

  async fn query(&self, filters: &[Filter], limit: usize) -> Result<Vec<Event>, RelayError> {
    let stored = self
      .blocking(|db| Ok(all_values(db, EVENTS_TABLE)?))
      .await?;

    let mut events = Vec::with_capacity(stored.len());
    for json in stored {
      events.push(serde_json::from_str::<Event>(&json)?);
    }

    Ok(select_events(&events, filters, limit))
  }
}

#[async_trait]
impl InvoiceStore for RedbStore {
  async fn lookup(&self, payment_hash: &str) -> Result<Option<Invoice>, RelayError> {
    let payment_hash = payment_hash.to_string();

    let json = self
      .blocking(move |db| Ok(get(db, INVOICES_TABLE, &payment_hash)?))
      .await?;
    match json {
      Some(json) => Ok(Some(serde_json::from_str(&json)?)),
      None => Ok(None),
    }
  }

  async fn insert(&self, invoice: Invoice) -> Result<(), RelayError> {
    let json = serde_json::to_string(&invoice)?;

    self
      .blocking(move |db| Ok(put(db, INVOICES_TABLE, &invoice.payment_hash, &json)?))
      .await
  }

  async fn mark_paid(&self, payment_hash: &str) -> Result<(), RelayError> {
    let payment_hash = payment_hash.to_string();

    self
      .blocking(move |db| {
        let write_txn = db.begin_write()?;
        {
          let mut table = write_txn.open_table(INVOICES_TABLE)?;
          let stored = table
            .get(payment_hash.as_str())?
            .map(|guard| guard.value().to_string());
          if let Some(json) = stored {
            let mut invoice: Invoice = serde_json::from_str(&json)?;
            invoice.paid = true;
            table.insert(payment_hash.as_str(), serde_json::to_string(&invoice)?.as_str())?;
          }
        }
        write_txn.commit()?;
        Ok(())
      })
      .await
  }
}

#[async_trait]
impl PublicationStore for RedbStore {
  async fn create(&self, record: PublicationRecord) -> Result<bool, RelayError> {
    let json = serde_json::to_string(&record)?;

    self
      .blocking(move |db| Ok(insert_if_absent(db, PUBLICATIONS_TABLE, &record.event_id, &json)?))
      .await
  }

  async fn get(&self, event_id: &str) -> Result<Option<PublicationRecord>, RelayError> {
    let event_id = event_id.to_string();

    let json = self
      .blocking(move |db| Ok(get(db, PUBLICATIONS_TABLE, &event_id)?))
      .await?;
    match json {
      Some(json) => Ok(Some(serde_json::from_str(&json)?)),
      None => Ok(None),
    }
  }

  async fn update(
    &self,
    event_id: &str,
    target: PublicationStatus,
    now: u64,
  ) -> Result<PublicationRecord, RelayError> {
    let event_id = event_id.to_string();

    self
      .blocking(move |db| {
        let write_txn = db.begin_write()?;
        let outcome = {
          let mut table = write_txn.open_table(PUBLICATIONS_TABLE)?;
          let stored = table
            .get(event_id.as_str())?
            .map(|guard| guard.value().to_string());

          match stored {
            None => Err(PublicationError::NotFound(event_id.clone())),
            Some(json) => {
              let mut record: PublicationRecord = serde_json::from_str(&json)?;
              match record.transition(target, now) {
                Ok(changed) => {
                  if changed {
                    table.insert(event_id.as_str(), serde_json::to_string(&record)?.as_str())?;
                  }
                  Ok(record)
                }
                Err(err) => Err(err),
              }
            }
          }
        };

        match outcome {
          Ok(record) => {
            write_txn.commit()?;
            Ok(record)
          }
          Err(err) => {
            write_txn.abort()?;
            Err(err.into())
          }
        }
      })
      .await
  }

  async fn bind_payment(&self, payment_hash: &str, event_id: &str) -> Result<bool, RelayError> {
    let payment_hash = payment_hash.to_string();
    let event_id = event_id.to_string();

    self
      .blocking(move |db| {
        let write_txn = db.begin_write()?;
        let bound = {
          let mut table = write_txn.open_table(PAYMENTS_TABLE)?;
          let owner = table
            .get(payment_hash.as_str())?
            .map(|guard| guard.value().to_string());
          match owner {
            Some(owner) => owner == event_id,
            None => {
              table.insert(payment_hash.as_str(), event_id.as_str())?;
              true
            }
          }
        };
        write_txn.commit()?;
        Ok(bound)
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use nostr_sdk::event::kind::EventKind;

  use super::*;
  use crate::testing::signed_event;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  struct Sut {
    store: RedbStore,
    name: String,
  }

  impl Drop for Sut {
    fn drop(&mut self) {
      self.remove_temp_db();
    }
  }

  impl Sut {
    fn new(name: &str) -> Self {
      let store = RedbStore::new(format!("db/{name}.redb")).unwrap();

      Self {
        store,
        name: name.to_owned(),
      }
    }

    fn gen_event(&self) -> Event {
      Event::from_json(r#"{"content":"potato","created_at":1684589418,"id":"00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae","kind":1,"pubkey":"614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6","sig":"bf073c935f71de50ec72bdb79f75b0bf32f9049305c3b22f97c06422c6f2edc86e0d7e07d7d7222678b238b1daee071be5f6fa653c611971395ec0d1c6407caf","tags":[]}"#).unwrap()
    }

    fn gen_invoice(&self, payment_hash: &str) -> Invoice {
      Invoice {
        payment_hash: payment_hash.to_string(),
        amount: 42,
        description: "kind 1111 event".to_string(),
        payment_request: format!("lnmock42n1{payment_hash}"),
        created_at: 100,
        expires_at: 700,
        paid: false,
      }
    }

    fn remove_temp_db(&self) {
      fs::remove_file(format!("db/{}.redb", self.name)).unwrap();
    }
  }

  #[tokio::test]
  async fn save_is_insert_if_absent() {
    let sut = Sut::new("save_is_insert_if_absent");
    let event = sut.gen_event();

    assert!(!sut.store.contains(&event.id).await.unwrap());
    assert!(sut.store.save(&event).await.unwrap());
    assert!(!sut.store.save(&event).await.unwrap());
    assert!(sut.store.contains(&event.id).await.unwrap());

    let stored = sut.store.query(&[Filter::new()], 100).await.unwrap();
    assert_eq!(stored, vec![event]);
  }

  #[tokio::test]
  async fn query_on_empty_store() {
    let sut = Sut::new("query_on_empty_store");

    let stored = sut.store.query(&[Filter::new()], 100).await.unwrap();

    assert!(stored.is_empty());
  }

  #[tokio::test]
  async fn query_applies_filters() {
    let sut = Sut::new("query_applies_filters");
    let text = signed_event(EventKind::Text, "hello", vec![]);
    let comment = signed_event(EventKind::Comment, "nice paper", vec![]);
    sut.store.save(&text).await.unwrap();
    sut.store.save(&comment).await.unwrap();

    let mut filter = Filter::new();
    filter.add_kinds(vec![1111]);
    let stored = sut.store.query(&[filter], 100).await.unwrap();

    assert_eq!(stored, vec![comment]);
  }

  #[tokio::test]
  async fn invoices_round_trip_and_get_paid() {
    let sut = Sut::new("invoices_round_trip_and_get_paid");
    let invoice = sut.gen_invoice("aa");

    assert_eq!(sut.store.lookup("aa").await.unwrap(), None);

    sut.store.insert(invoice.clone()).await.unwrap();
    assert_eq!(sut.store.lookup("aa").await.unwrap(), Some(invoice.clone()));

    sut.store.mark_paid("aa").await.unwrap();
    sut.store.mark_paid("unknown").await.unwrap();
    let paid = sut.store.lookup("aa").await.unwrap().unwrap();
    assert!(paid.paid);
    assert_eq!(paid.amount, invoice.amount);
  }

  #[tokio::test]
  async fn publication_records() {
    let sut = Sut::new("publication_records");
    let event = sut.gen_event();
    let record = PublicationRecord::new_submitted(&event, Some("aa".to_string()), Some(42), 100);

    assert!(sut.store.create(record.clone()).await.unwrap());
    assert!(!sut.store.create(record.clone()).await.unwrap());
    assert_eq!(sut.store.get(&event.id).await.unwrap(), Some(record));

    let updated = sut
      .store
      .update(&event.id, PublicationStatus::UnderReview, 200)
      .await
      .unwrap();
    assert_eq!(updated.status, PublicationStatus::UnderReview);
    assert_eq!(updated.updated_at, 200);
    assert_eq!(sut.store.get(&event.id).await.unwrap(), Some(updated));
  }

  #[tokio::test]
  async fn invalid_update_leaves_the_record_alone() {
    let sut = Sut::new("invalid_update_leaves_the_record_alone");
    let event = sut.gen_event();
    let record = PublicationRecord::new_submitted(&event, None, None, 100);
    sut.store.create(record.clone()).await.unwrap();

    let result = sut
      .store
      .update(&event.id, PublicationStatus::Published, 200)
      .await;

    assert!(matches!(
      result,
      Err(RelayError::Publication(PublicationError::InvalidTransition { .. }))
    ));
    assert_eq!(sut.store.get(&event.id).await.unwrap(), Some(record));

    let missing = sut
      .store
      .update("nope", PublicationStatus::UnderReview, 200)
      .await;
    assert!(matches!(
      missing,
      Err(RelayError::Publication(PublicationError::NotFound(_)))
    ));
  }

  #[tokio::test]
  async fn payments_bind_to_one_event() {
    let sut = Sut::new("payments_bind_to_one_event");

    assert!(sut.store.bind_payment("aa", "event-1").await.unwrap());
    assert!(sut.store.bind_payment("aa", "event-1").await.unwrap());
    assert!(!sut.store.bind_payment("aa", "event-2").await.unwrap());
    assert!(sut.store.bind_payment("bb", "event-2").await.unwrap());
  }
}
