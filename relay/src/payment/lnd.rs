use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, error};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{IssuedInvoice, PaymentSettlement};
use crate::{config::LndConfig, error::RelayError};

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

#[derive(Debug, Deserialize)]
struct AddInvoiceResponse {
  /// Base64 of the 32-bytes payment hash.
  r_hash: String,
  payment_request: String,
}

#[derive(Debug, Deserialize)]
struct LookupInvoiceResponse {
  #[serde(default)]
  state: String,
}

/// Settlement through the REST interface of an LND node.
pub struct LndSettlement {
  base_url: String,
  macaroon: String,
  http_client: Client,
}

impl LndSettlement {
  pub fn new(config: &LndConfig, timeout: Duration) -> Result<Self, RelayError> {
    let http_client = Client::builder().timeout(timeout).build()?;

    Ok(Self {
      base_url: config.url.trim_end_matches('/').to_string(),
      macaroon: config.macaroon.clone(),
      http_client,
    })
  }
}

/// LND returns payment hashes base64-encoded but looks them up by hex.
fn payment_hash_from_r_hash(r_hash: &str) -> Result<String, RelayError> {
  let bytes = STANDARD
    .decode(r_hash)
    .map_err(|err| RelayError::Settlement(format!("bad r_hash `{r_hash}`: {err}")))?;
  if bytes.len() != 32 {
    return Err(RelayError::Settlement(format!(
      "r_hash has {} bytes, expected 32",
      bytes.len()
    )));
  }
  Ok(hex::encode(bytes))
}

fn is_hex_hash(payment_hash: &str) -> bool {
  payment_hash.len() == 64 && payment_hash.chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
impl PaymentSettlement for LndSettlement {
  async fn create_invoice(
    &self,
    amount: u64,
    description: &str,
    expiry: Duration,
  ) -> Result<IssuedInvoice, RelayError> {
    let url = format!("{}/v1/invoices", self.base_url);
    let body = json!({
      "value": amount.to_string(),
      "memo": description,
      "expiry": expiry.as_secs().to_string(),
    });

    let response = self
      .http_client
      .post(&url)
      .header(MACAROON_HEADER, self.macaroon.as_str())
      .json(&body)
      .send()
      .await?
      .error_for_status()
      .map_err(|err| {
        error!("LND refused to create an invoice: {err}");
        err
      })?
      .json::<AddInvoiceResponse>()
      .await?;

    let payment_hash = payment_hash_from_r_hash(&response.r_hash)?;
    debug!("LND invoice {payment_hash} for {amount}");

    Ok(IssuedInvoice {
      payment_hash,
      payment_request: response.payment_request,
    })
  }

  async fn is_settled(&self, payment_hash: &str) -> Result<bool, RelayError> {
    // Anything else would be spliced into the URL path.
    if !is_hex_hash(payment_hash) {
      return Ok(false);
    }

    let url = format!("{}/v1/invoice/{payment_hash}", self.base_url);
    let response = self
      .http_client
      .get(&url)
      .header(MACAROON_HEADER, self.macaroon.as_str())
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(false);
    }

    let invoice = response
      .error_for_status()?
      .json::<LookupInvoiceResponse>()
      .await?;
    debug!("LND invoice {payment_hash} is {}", invoice.state);

    Ok(invoice.state == "SETTLED")
  }
}
