//! Stripe API types.

use serde::Deserialize;

/// Stripe Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID (`cs_...`).
    pub id: String,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
    /// Payment status ("paid", "unpaid", "no_payment_required").
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Total amount in minor units.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Lowercase currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Client reference ID (our user id).
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Session status ("open", "complete", "expired").
    #[serde(default)]
    pub status: Option<String>,
    /// Payment intent ID.
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Stripe Connect account object (the slice we read).
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectAccount {
    /// Account ID (`acct_...`).
    pub id: String,
    /// Whether the account can receive payouts.
    #[serde(default)]
    pub payouts_enabled: bool,
}

/// Stripe account link object (hosted onboarding).
#[derive(Debug, Clone, Deserialize)]
pub struct AccountLink {
    /// Onboarding URL.
    pub url: String,
}

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID (`evt_...`).
    pub id: String,
    /// Event type (e.g. "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
}
