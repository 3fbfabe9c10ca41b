use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use nostr_sdk::event::{tag::TagKind, Event};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Descriptive data stored next to a paper's body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
  pub event_id: String,
  pub pubkey: String,
  pub kind: u64,
  pub created_at: u64,
  pub title: Option<String>,
  pub size_bytes: u64,
  pub payment_hash: Option<String>,
  pub price_paid: Option<u64>,
}

impl ContentMetadata {
  pub fn from_event(event: &Event, payment_hash: Option<String>, price_paid: Option<u64>) -> Self {
    Self {
      event_id: event.id.clone(),
      pubkey: event.pubkey.clone(),
      kind: event.kind.as_u64(),
      created_at: event.created_at,
      title: event.tag_value(TagKind::Title).map(str::to_string),
      size_bytes: event.content_size(),
      payment_hash,
      price_paid,
    }
  }
}

/// Bulk storage for large event bodies.
#[async_trait]
pub trait ContentStore: Send + Sync {
  /// Writes (or rewrites with identical data) the body and metadata of one event.
  async fn write(
    &self,
    event_id: &str,
    content: &str,
    metadata: &ContentMetadata,
  ) -> Result<(), RelayError>;
}

/// Stores `<event_id>.md` and `<event_id>.json` under one directory.
#[derive(Debug, Clone)]
pub struct FsContentStore {
  root: PathBuf,
}

impl FsContentStore {
  pub fn new(root: impl AsRef<Path>) -> Self {
    Self {
      root: root.as_ref().to_path_buf(),
    }
  }

  pub fn content_path(&self, event_id: &str) -> PathBuf {
    self.root.join(format!("{event_id}.md"))
  }

  pub fn metadata_path(&self, event_id: &str) -> PathBuf {
    self.root.join(format!("{event_id}.json"))
  }
}

#[async_trait]
impl ContentStore for FsContentStore {
  async fn write(
    &self,
    event_id: &str,
    content: &str,
    metadata: &ContentMetadata,
  ) -> Result<(), RelayError> {
    // Ids become file names.
    if event_id.is_empty() || !event_id.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(RelayError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("event id `{event_id}` is not hex"),
      )));
    }

    tokio::fs::create_dir_all(&self.root).await?;
    tokio::fs::write(self.content_path(event_id), content).await?;
    tokio::fs::write(
      self.metadata_path(event_id),
      serde_json::to_vec_pretty(metadata)?,
    )
    .await?;
    debug!("Stored content of {event_id} in {}", self.root.display());

    Ok(())
  }
}
