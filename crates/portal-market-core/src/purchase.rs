//! Purchase records.
//!
//! One row per `(user, app)` pair. Re-initiating checkout upserts the same
//! row; only the webhook reconciler (or the free-app short-circuit) moves a
//! purchase out of `Pending`, and `Completed` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, ProviderId};
use crate::ids::{AppId, PurchaseId, UserId};

/// Purchase lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Checkout initiated, waiting on the provider webhook.
    Pending,
    /// Payment confirmed. Terminal.
    Completed,
    /// Payment declined or failed. May be re-initiated.
    Failed,
}

/// A user's intent (and eventual completion) to acquire an app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    /// Row identifier.
    pub id: PurchaseId,
    /// The buying user.
    pub user_id: UserId,
    /// The app being bought.
    pub app_id: AppId,
    /// Lifecycle state.
    pub status: PurchaseStatus,
    /// Price charged, in minor units. Zero for free acquisitions.
    pub amount_minor: i64,
    /// Currency of `amount_minor`.
    pub currency: Currency,
    /// Provider the checkout was routed to. `None` for free acquisitions.
    pub provider: Option<ProviderId>,
    /// Our checkout reference, echoed back by provider webhooks.
    pub tx_ref: Option<String>,
    /// When the purchase completed. `None` while pending or failed.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

impl Purchase {
    /// Whether this purchase confers ownership.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == PurchaseStatus::Completed
    }

    /// The checkout reference carried in provider metadata, derived from
    /// the row id so status polls can resolve it without extra state.
    #[must_use]
    pub fn checkout_reference(id: &PurchaseId) -> String {
        format!("pm-{id}")
    }

    /// Parse a checkout reference back into the purchase row id.
    #[must_use]
    pub fn parse_checkout_reference(tx_ref: &str) -> Option<PurchaseId> {
        tx_ref.strip_prefix("pm-")?.parse().ok()
    }
}
