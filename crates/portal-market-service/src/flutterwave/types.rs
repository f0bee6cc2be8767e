//! Flutterwave v3 API types.

use serde::Deserialize;

/// Envelope around every Flutterwave response.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct FlwResponse<T> {
    /// "success" or "error".
    pub status: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Response payload; absent on errors.
    #[serde(default)]
    pub data: Option<T>,
}

/// A created hosted payment session.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentLink {
    /// Hosted checkout page URL.
    pub link: String,
}

/// A transaction as reported by `GET /transactions/{id}/verify`.
#[derive(Debug, Clone, Deserialize)]
pub struct FlwTransaction {
    /// Flutterwave's numeric transaction id.
    pub id: i64,
    /// Our checkout reference.
    pub tx_ref: String,
    /// Amount in major currency units.
    pub amount: f64,
    /// Currency code.
    pub currency: String,
    /// "successful", "failed", "pending".
    pub status: String,
}

/// A created subaccount.
#[derive(Debug, Clone, Deserialize)]
pub struct Subaccount {
    /// Numeric row id.
    pub id: i64,
    /// The split-routing account id (`RS_...`).
    pub subaccount_id: String,
}

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct FlwWebhook {
    /// Event name, e.g. "charge.completed".
    pub event: String,
    /// Event payload.
    pub data: serde_json::Value,
}
