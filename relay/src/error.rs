use std::{future::Future, time::Duration};

use crate::{config::ConfigError, publication::PublicationError};

/// Errors raised by the relay and its collaborators.
///
/// None of these reach a client verbatim: the admission pipeline logs them and
/// answers `error: server error`.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
  #[error(transparent)]
  Database(#[from] redb::Error),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Http(#[from] reqwest::Error),
  #[error(transparent)]
  Publication(#[from] PublicationError),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("Background task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
  #[error("Payment backend error: {0}")]
  Settlement(String),
  #[error("Unknown connection {0}")]
  UnknownConnection(uuid::Uuid),
  #[error("{0} timed out")]
  Timeout(&'static str),
}

/// Runs a collaborator call bounded by `limit`.
pub async fn with_timeout<T, F>(what: &'static str, limit: Duration, call: F) -> Result<T, RelayError>
where
  F: Future<Output = Result<T, RelayError>>,
{
  tokio::time::timeout(limit, call)
    .await
    .map_err(|_elapsed| RelayError::Timeout(what))?
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[tokio::test]
  async fn with_timeout_passes_the_result_through() {
    let result = with_timeout("quick call", Duration::from_millis(50), async { Ok(7) }).await;

    assert_eq!(result.unwrap(), 7);
  }

  #[tokio::test]
  async fn with_timeout_reports_which_call_stalled() {
    let result: Result<(), RelayError> = with_timeout("stalled call", Duration::from_millis(10), async {
      tokio::time::sleep(Duration::from_secs(5)).await;
      Ok(())
    })
    .await;

    assert_eq!(result.unwrap_err().to_string(), "stalled call timed out");
  }
}
