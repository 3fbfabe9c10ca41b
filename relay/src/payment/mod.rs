pub mod lnd;
pub mod mock;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info, warn};
use nostr_sdk::event::{tag::TagKind, Event};
use serde::{Deserialize, Serialize};

use crate::{
  config::{ConfigError, PaymentBackend, RelayConfig},
  error::{with_timeout, RelayError},
  publication::PublicationStore,
  unix_now,
};

use self::{lnd::LndSettlement, mock::MockSettlement};

/// A payment request issued by the relay, keyed by its payment hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
  pub payment_hash: String,
  /// Amount in the payment network's minimal unit.
  pub amount: u64,
  pub description: String,
  /// Opaque string the client pays, e.g. a BOLT11 request.
  pub payment_request: String,
  pub created_at: u64,
  pub expires_at: u64,
  /// Only ever goes from false to true.
  pub paid: bool,
}

/// What a settlement backend hands back for a new invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInvoice {
  pub payment_hash: String,
  pub payment_request: String,
}

/// Issues invoices on a payment network and reports whether they were paid.
#[async_trait]
pub trait PaymentSettlement: Send + Sync {
  async fn create_invoice(
    &self,
    amount: u64,
    description: &str,
    expiry: Duration,
  ) -> Result<IssuedInvoice, RelayError>;

  async fn is_settled(&self, payment_hash: &str) -> Result<bool, RelayError>;
}

/// Durable ledger of issued invoices.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
  async fn lookup(&self, payment_hash: &str) -> Result<Option<Invoice>, RelayError>;

  async fn insert(&self, invoice: Invoice) -> Result<(), RelayError>;

  /// Flags the invoice as paid. Unknown hashes are ignored.
  async fn mark_paid(&self, payment_hash: &str) -> Result<(), RelayError>;
}

/// Why the gate refused an event. Every variant carries the required amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRejection {
  /// The event has no `payment` tag.
  PaymentRequired { amount: u64 },
  /// The `payment` tag names an invoice the relay never issued.
  InvalidPaymentReference { amount: u64 },
  PaymentNotCompleted { amount: u64 },
  InsufficientPayment { amount: u64, paid: u64 },
  /// The invoice already paid for another event.
  PaymentAlreadyUsed { amount: u64 },
}

impl PaymentRejection {
  pub fn amount(&self) -> u64 {
    match self {
      Self::PaymentRequired { amount }
      | Self::InvalidPaymentReference { amount }
      | Self::PaymentNotCompleted { amount }
      | Self::InsufficientPayment { amount, .. }
      | Self::PaymentAlreadyUsed { amount } => *amount,
    }
  }
}

impl fmt::Display for PaymentRejection {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::PaymentRequired { amount } => write!(f, "payment required, amount={amount}"),
      Self::InvalidPaymentReference { amount } => {
        write!(f, "invalid payment reference, amount={amount}")
      }
      Self::PaymentNotCompleted { amount } => write!(f, "payment not completed, amount={amount}"),
      Self::InsufficientPayment { amount, paid } => {
        write!(f, "insufficient payment, paid={paid}, amount={amount}")
      }
      Self::PaymentAlreadyUsed { amount } => write!(f, "payment already used, amount={amount}"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
  Allowed { payment_hash: String, amount: u64 },
  Rejected(PaymentRejection),
}

/// Checks that a priced event references a paid invoice covering its price.
pub struct PaymentGate {
  invoices: Arc<dyn InvoiceStore>,
  settlement: Arc<dyn PaymentSettlement>,
  publications: Arc<dyn PublicationStore>,
  timeout: Duration,
  invoice_expiry: Duration,
}

impl PaymentGate {
  pub fn new(
    invoices: Arc<dyn InvoiceStore>,
    settlement: Arc<dyn PaymentSettlement>,
    publications: Arc<dyn PublicationStore>,
    timeout: Duration,
    invoice_expiry: Duration,
  ) -> Self {
    Self {
      invoices,
      settlement,
      publications,
      timeout,
      invoice_expiry,
    }
  }

  /// Decides whether `event` may be admitted for `required_amount`.
  ///
  /// An invoice the ledger still has as unpaid is re-checked with the
  /// settlement backend first. On success the invoice is bound to the event,
  /// so it cannot pay for anything else.
  pub async fn admit(&self, event: &Event, required_amount: u64) -> Result<GateDecision, RelayError> {
    let payment_hash = match event.tag_value(TagKind::Payment) {
      Some(hash) => hash.to_string(),
      None => {
        return Ok(GateDecision::Rejected(PaymentRejection::PaymentRequired {
          amount: required_amount,
        }))
      }
    };

    let invoice = with_timeout(
      "invoice lookup",
      self.timeout,
      self.invoices.lookup(&payment_hash),
    )
    .await?;
    let invoice = match invoice {
      Some(invoice) => invoice,
      None => {
        debug!("Event {} references unknown invoice {payment_hash}", event.id);
        return Ok(GateDecision::Rejected(
          PaymentRejection::InvalidPaymentReference {
            amount: required_amount,
          },
        ));
      }
    };

    if !invoice.paid && !self.refresh_settlement(&invoice).await? {
      return Ok(GateDecision::Rejected(PaymentRejection::PaymentNotCompleted {
        amount: required_amount,
      }));
    }

    if invoice.amount < required_amount {
      return Ok(GateDecision::Rejected(PaymentRejection::InsufficientPayment {
        amount: required_amount,
        paid: invoice.amount,
      }));
    }

    let bound = with_timeout(
      "payment binding",
      self.timeout,
      self.publications.bind_payment(&payment_hash, &event.id),
    )
    .await?;
    if !bound {
      warn!("Invoice {payment_hash} was already spent on another event");
      return Ok(GateDecision::Rejected(PaymentRejection::PaymentAlreadyUsed {
        amount: required_amount,
      }));
    }

    Ok(GateDecision::Allowed {
      payment_hash,
      amount: invoice.amount,
    })
  }

  /// Issues and records a fresh invoice for `amount`, to be paid before
  /// `event` is submitted again.
  pub async fn quote(&self, event: &Event, amount: u64) -> Result<Invoice, RelayError> {
    let description = format!("kind {} event {}", event.kind, event.id);
    let issued = with_timeout(
      "invoice creation",
      self.timeout,
      self
        .settlement
        .create_invoice(amount, &description, self.invoice_expiry),
    )
    .await?;

    let now = unix_now();
    let invoice = Invoice {
      payment_hash: issued.payment_hash,
      amount,
      description,
      payment_request: issued.payment_request,
      created_at: now,
      expires_at: now + self.invoice_expiry.as_secs(),
      paid: false,
    };
    with_timeout(
      "invoice insert",
      self.timeout,
      self.invoices.insert(invoice.clone()),
    )
    .await?;

    info!(
      "Issued invoice {} for {amount} to event {}",
      invoice.payment_hash, event.id
    );
    Ok(invoice)
  }

  /// Amount of the invoice `payment_hash` if it is paid.
  pub async fn paid_amount(&self, payment_hash: &str) -> Result<Option<u64>, RelayError> {
    let invoice = with_timeout(
      "invoice lookup",
      self.timeout,
      self.invoices.lookup(payment_hash),
    )
    .await?;

    match invoice {
      Some(invoice) if invoice.paid || self.refresh_settlement(&invoice).await? => {
        Ok(Some(invoice.amount))
      }
      _ => Ok(None),
    }
  }

  async fn refresh_settlement(&self, invoice: &Invoice) -> Result<bool, RelayError> {
    let settled = with_timeout(
      "settlement check",
      self.timeout,
      self.settlement.is_settled(&invoice.payment_hash),
    )
    .await?;

    if settled {
      with_timeout(
        "invoice update",
        self.timeout,
        self.invoices.mark_paid(&invoice.payment_hash),
      )
      .await?;
      info!("Invoice {} settled", invoice.payment_hash);
    }

    Ok(settled)
  }
}

/// The settlement backend selected by configuration.
pub fn settlement_from_config(
  config: &RelayConfig,
) -> Result<Arc<dyn PaymentSettlement>, RelayError> {
  match (config.payment_backend, &config.lnd) {
    (PaymentBackend::Mock, _) => {
      warn!("Using the mock payment backend, no real payments are involved");
      Ok(Arc::new(MockSettlement::new(config.mock_auto_settle)))
    }
    (PaymentBackend::Lnd, Some(lnd)) => Ok(Arc::new(LndSettlement::new(
      lnd,
      config.collaborator_timeout,
    )?)),
    (PaymentBackend::Lnd, None) => Err(ConfigError::Missing("LND_URL".to_string()).into()),
  }
}

#[cfg(test)]
mod tests {
  use nostr_sdk::event::{kind::EventKind, tag::Tag};

  use super::*;
  use crate::testing::{signed_event, MemoryInvoiceStore, MemoryPublicationStore};

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  struct Sut {
    gate: PaymentGate,
    invoices: Arc<MemoryInvoiceStore>,
    settlement: Arc<MockSettlement>,
    publications: Arc<MemoryPublicationStore>,
  }

  impl Sut {
    fn new() -> Self {
      let invoices = Arc::new(MemoryInvoiceStore::default());
      let settlement = Arc::new(MockSettlement::new(false));
      let publications = Arc::new(MemoryPublicationStore::default());
      let gate = PaymentGate::new(
        invoices.clone(),
        settlement.clone(),
        publications.clone(),
        Duration::from_secs(1),
        Duration::from_secs(600),
      );

      Self {
        gate,
        invoices,
        settlement,
        publications,
      }
    }

    async fn paid_invoice(&self, amount: u64) -> Invoice {
      let event = signed_event(EventKind::Comment, "quote me", vec![]);
      let invoice = self.gate.quote(&event, amount).await.unwrap();
      self.settlement.settle(&invoice.payment_hash);
      invoice
    }

    fn event_paying_with(&self, payment_hash: &str, content: &str) -> Event {
      signed_event(
        EventKind::Comment,
        content,
        vec![Tag::new(TagKind::Payment, vec![payment_hash])],
      )
    }
  }

  #[tokio::test]
  async fn no_payment_tag_asks_for_payment() {
    let sut = Sut::new();
    let event = signed_event(EventKind::Comment, "free ride", vec![]);

    let decision = sut.gate.admit(&event, 21).await.unwrap();

    assert_eq!(
      decision,
      GateDecision::Rejected(PaymentRejection::PaymentRequired { amount: 21 })
    );
  }

  #[tokio::test]
  async fn unknown_invoice_is_an_invalid_reference() {
    let sut = Sut::new();
    let event = sut.event_paying_with("deadbeef", "who paid?");

    let decision = sut.gate.admit(&event, 21).await.unwrap();

    assert_eq!(
      decision,
      GateDecision::Rejected(PaymentRejection::InvalidPaymentReference { amount: 21 })
    );
  }

  #[tokio::test]
  async fn unpaid_invoice_is_not_completed() {
    let sut = Sut::new();
    let event = signed_event(EventKind::Comment, "later", vec![]);
    let invoice = sut.gate.quote(&event, 21).await.unwrap();
    let event = sut.event_paying_with(&invoice.payment_hash, "later");

    let decision = sut.gate.admit(&event, 21).await.unwrap();

    assert_eq!(
      decision,
      GateDecision::Rejected(PaymentRejection::PaymentNotCompleted { amount: 21 })
    );
    assert!(!sut.invoices.get(&invoice.payment_hash).unwrap().paid);
  }

  #[tokio::test]
  async fn settled_invoice_is_marked_paid_and_admits() {
    let sut = Sut::new();
    let invoice = sut.paid_invoice(21).await;
    let event = sut.event_paying_with(&invoice.payment_hash, "paid for");

    let decision = sut.gate.admit(&event, 21).await.unwrap();

    assert_eq!(
      decision,
      GateDecision::Allowed {
        payment_hash: invoice.payment_hash.clone(),
        amount: 21
      }
    );
    assert!(sut.invoices.get(&invoice.payment_hash).unwrap().paid);
  }

  #[tokio::test]
  async fn amount_boundary() {
    let sut = Sut::new();
    let exact = sut.paid_invoice(500).await;
    let short = sut.paid_invoice(499).await;

    let decision = sut
      .gate
      .admit(&sut.event_paying_with(&exact.payment_hash, "exact"), 500)
      .await
      .unwrap();
    assert_eq!(
      decision,
      GateDecision::Allowed {
        payment_hash: exact.payment_hash,
        amount: 500
      }
    );

    let decision = sut
      .gate
      .admit(&sut.event_paying_with(&short.payment_hash, "short"), 500)
      .await
      .unwrap();
    assert_eq!(
      decision,
      GateDecision::Rejected(PaymentRejection::InsufficientPayment {
        amount: 500,
        paid: 499
      })
    );
  }

  #[tokio::test]
  async fn an_invoice_pays_for_one_event_only() {
    let sut = Sut::new();
    let invoice = sut.paid_invoice(21).await;
    let first = sut.event_paying_with(&invoice.payment_hash, "first");
    let second = sut.event_paying_with(&invoice.payment_hash, "second");

    assert!(matches!(
      sut.gate.admit(&first, 21).await.unwrap(),
      GateDecision::Allowed { .. }
    ));
    // resubmitting the same event is fine
    assert!(matches!(
      sut.gate.admit(&first, 21).await.unwrap(),
      GateDecision::Allowed { .. }
    ));
    assert_eq!(
      sut.gate.admit(&second, 21).await.unwrap(),
      GateDecision::Rejected(PaymentRejection::PaymentAlreadyUsed { amount: 21 })
    );
  }

  #[tokio::test]
  async fn quote_records_the_invoice() {
    let sut = Sut::new();
    let event = signed_event(EventKind::LongFormContent, "a paper", vec![]);

    let invoice = sut.gate.quote(&event, 1_234).await.unwrap();

    assert_eq!(invoice.amount, 1_234);
    assert!(!invoice.paid);
    assert_eq!(invoice.expires_at - invoice.created_at, 600);
    assert!(invoice.description.contains(&event.id));
    assert_eq!(sut.invoices.get(&invoice.payment_hash), Some(invoice));
  }

  #[tokio::test]
  async fn binding_survives_in_the_publication_store() {
    let sut = Sut::new();
    let invoice = sut.paid_invoice(21).await;
    let event = sut.event_paying_with(&invoice.payment_hash, "bound");

    sut.gate.admit(&event, 21).await.unwrap();

    assert!(sut
      .publications
      .bind_payment(&invoice.payment_hash, &event.id)
      .await
      .unwrap());
    assert!(!sut
      .publications
      .bind_payment(&invoice.payment_hash, "another event")
      .await
      .unwrap());
  }

  #[test]
  fn rejection_reasons_carry_the_amount() {
    let rejections = vec![
      PaymentRejection::PaymentRequired { amount: 7 },
      PaymentRejection::InvalidPaymentReference { amount: 7 },
      PaymentRejection::PaymentNotCompleted { amount: 7 },
      PaymentRejection::InsufficientPayment { amount: 7, paid: 3 },
      PaymentRejection::PaymentAlreadyUsed { amount: 7 },
    ];

    for rejection in rejections {
      assert_eq!(rejection.amount(), 7);
      assert!(rejection.to_string().ends_with("amount=7"), "{rejection}");
    }
  }
}
