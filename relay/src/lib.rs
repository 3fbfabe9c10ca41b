pub mod admission;
pub mod config;
pub mod content_store;
pub mod error;
pub mod kinds;
pub mod payment;
pub mod pricing;
pub mod publication;
pub mod server;
pub mod storage;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch, or 0 if the clock is before it.
pub(crate) fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|since_epoch| since_epoch.as_secs())
    .unwrap_or_default()
}
