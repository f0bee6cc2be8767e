//! Developer payout account linkage.
//!
//! The split computed at purchase time needs a destination before it can be
//! paid out through provider-native sub-merchant mechanisms. This record
//! persists the mapping from a developer to their account at a provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::ProviderId;
use crate::ids::DeveloperId;

/// A developer's account at a payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperAccount {
    /// The developer being paid.
    pub developer_id: DeveloperId,
    /// Which provider holds the account.
    pub provider: ProviderId,
    /// The provider-assigned account id (Connect account / subaccount).
    pub provider_account_id: String,
    /// Whether the provider has cleared the account for payouts. Kept in
    /// sync by the provider's account webhooks.
    pub payouts_enabled: bool,
    /// When the linkage was created.
    pub created_at: DateTime<Utc>,
}

impl DeveloperAccount {
    /// Link a freshly created provider account. Payouts start disabled
    /// until the provider finishes onboarding checks.
    #[must_use]
    pub fn new(developer_id: DeveloperId, provider: ProviderId, provider_account_id: String) -> Self {
        Self {
            developer_id,
            provider,
            provider_account_id,
            payouts_enabled: false,
            created_at: Utc::now(),
        }
    }
}
