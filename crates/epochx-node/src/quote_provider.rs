use std::time::Duration;

use async_trait::async_trait;
use epochx_core::error::ProverError;
use epochx_core::types::{BondAmount, Epoch, Slot};
use epochx_rpc::{u256_from_json, u256_to_json};
use serde_json::Value;
use tracing::debug;

/// Pricing for one epoch's quote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteTerms {
    /// Checked against 0..=10000 when the payload is built.
    pub basis_point_fee: i64,
    pub bond_amount: BondAmount,
    /// When absent the node uses `current_slot + quote_validity_slots`.
    pub valid_until_slot: Option<Slot>,
}

/// Source of fee and bond terms.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_terms(&self, epoch: Epoch) -> Result<QuoteTerms, ProverError>;
}

/// Same fee and bond for every epoch.
pub struct SimpleQuoteProvider {
    basis_point_fee: i64,
    bond_amount: BondAmount,
}

impl SimpleQuoteProvider {
    pub fn new(basis_point_fee: i64, bond_amount: BondAmount) -> Self {
        Self { basis_point_fee, bond_amount }
    }
}

#[async_trait]
impl QuoteProvider for SimpleQuoteProvider {
    async fn get_terms(&self, _epoch: Epoch) -> Result<QuoteTerms, ProverError> {
        Ok(QuoteTerms {
            basis_point_fee: self.basis_point_fee,
            bond_amount: self.bond_amount,
            valid_until_slot: None,
        })
    }
}

/// Asks an external pricing service.
///
/// Request:  `POST <url>` with `{"epochNumber": <epoch>}`
/// Response: `{"basisPointFee": n, "bondAmount": n, "validUntilSlot"?: n}`
/// where 256-bit values may be numbers, decimal strings or 0x-hex strings.
pub struct HttpQuoteProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpQuoteProvider {
    pub fn new(url: &str) -> Self {
        Self::with_timeout(url, Duration::from_secs(10))
    }

    /// A service that has not answered within `timeout` counts as unavailable.
    pub fn with_timeout(url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { url: url.to_string(), client }
    }
}

fn unavailable(reason: impl std::fmt::Display) -> ProverError {
    ProverError::ProviderUnavailable(reason.to_string())
}

/// Parse a pricing service response body.
pub fn parse_terms(body: &Value) -> Result<QuoteTerms, ProverError> {
    let basis_point_fee = body
        .get("basisPointFee")
        .and_then(Value::as_i64)
        .ok_or_else(|| unavailable("response lacks an integer basisPointFee"))?;
    let bond_amount = body
        .get("bondAmount")
        .and_then(u256_from_json)
        .ok_or_else(|| unavailable("response lacks a bondAmount"))?;
    let valid_until_slot = match body.get("validUntilSlot") {
        None | Some(Value::Null) => None,
        Some(v) => Some(u256_from_json(v).ok_or_else(|| unavailable("malformed validUntilSlot"))?),
    };
    Ok(QuoteTerms { basis_point_fee, bond_amount, valid_until_slot })
}

#[async_trait]
impl QuoteProvider for HttpQuoteProvider {
    async fn get_terms(&self, epoch: Epoch) -> Result<QuoteTerms, ProverError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "epochNumber": u256_to_json(epoch) }))
            .send()
            .await
            .map_err(|e| unavailable(format!("{}: {e}", self.url)))?;
        if !resp.status().is_success() {
            return Err(unavailable(format!("{} answered {}", self.url, resp.status())));
        }
        let body: Value = resp.json().await.map_err(unavailable)?;
        let terms = parse_terms(&body)?;
        debug!(epoch = %epoch, fee = terms.basis_point_fee, bond = %terms.bond_amount, "quote terms received");
        Ok(terms)
    }
}
