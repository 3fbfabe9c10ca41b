use std::{
  collections::HashSet,
  sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, PoisonError,
  },
  time::Duration,
};

use async_trait::async_trait;
use bitcoin_hashes::{sha256, Hash};
use log::debug;

use super::{IssuedInvoice, PaymentSettlement};
use crate::error::RelayError;

/// In-process settlement backend.
///
/// Payment hashes are derived from a counter, so a fresh instance always
/// issues the same sequence. Invoices are settled by calling
/// [`MockSettlement::settle`], or immediately when `auto_settle` is set.
#[derive(Debug, Default)]
pub struct MockSettlement {
  auto_settle: bool,
  counter: AtomicU64,
  settled: Mutex<HashSet<String>>,
}

impl MockSettlement {
  pub fn new(auto_settle: bool) -> Self {
    Self {
      auto_settle,
      ..Default::default()
    }
  }

  /// Marks the invoice as paid on the "network".
  pub fn settle(&self, payment_hash: &str) {
    self
      .settled
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(payment_hash.to_string());
  }
}

#[async_trait]
impl PaymentSettlement for MockSettlement {
  async fn create_invoice(
    &self,
    amount: u64,
    description: &str,
    _expiry: Duration,
  ) -> Result<IssuedInvoice, RelayError> {
    let sequence = self.counter.fetch_add(1, Ordering::SeqCst);
    let preimage = format!("{sequence}:{amount}:{description}");
    let payment_hash = sha256::Hash::hash(preimage.as_bytes()).to_string();
    debug!("Mock invoice {payment_hash} for {amount}");

    Ok(IssuedInvoice {
      payment_request: format!("lnmock{amount}n1{payment_hash}"),
      payment_hash,
    })
  }

  async fn is_settled(&self, payment_hash: &str) -> Result<bool, RelayError> {
    if self.auto_settle {
      return Ok(true);
    }

    Ok(
      self
        .settled
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(payment_hash),
    )
  }
}
