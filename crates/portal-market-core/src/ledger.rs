//! The settlement ledger.
//!
//! Append-only: one entry per reconciled provider event, keyed by the
//! provider's transaction reference. Entries are never mutated or deleted;
//! they are the audit trail independent of the purchase row's mutable
//! status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, ProviderId};
use crate::ids::{AppId, TransactionId, UserId};

/// Kind of monetary event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// A completed app purchase.
    Purchase,
    /// A refund issued by the provider.
    Refund,
}

/// Settlement state of the entry as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Provider confirmed the money moved.
    Settled,
}

/// An immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Time-ordered entry id.
    pub id: TransactionId,
    /// The app the money moved against.
    pub app_id: AppId,
    /// The paying (or refunded) user.
    pub user_id: UserId,
    /// Gross amount in minor units.
    pub amount_minor: i64,
    /// Currency of the amounts.
    pub currency: Currency,
    /// Purchase or refund.
    pub entry_type: EntryType,
    /// Settlement state.
    pub status: EntryStatus,
    /// Which provider settled it.
    pub provider: ProviderId,
    /// The provider's transaction id — the idempotency key. A given
    /// reference contributes to counters at most once.
    pub provider_ref: String,
    /// Platform share of `amount_minor`.
    pub platform_fee_minor: i64,
    /// Developer share of `amount_minor`.
    pub developer_amount_minor: i64,
    /// When the entry was recorded.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build a purchase entry for a provider-confirmed payment.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn purchase(
        app_id: AppId,
        user_id: UserId,
        amount_minor: i64,
        currency: Currency,
        provider: ProviderId,
        provider_ref: String,
        platform_fee_minor: i64,
        developer_amount_minor: i64,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            app_id,
            user_id,
            amount_minor,
            currency,
            entry_type: EntryType::Purchase,
            status: EntryStatus::Settled,
            provider,
            provider_ref,
            platform_fee_minor,
            developer_amount_minor,
            created_at: Utc::now(),
        }
    }

    /// Build a refund entry. Amounts are recorded as reported by the
    /// provider; counter clawback happens at payout reconciliation.
    #[must_use]
    pub fn refund(
        app_id: AppId,
        user_id: UserId,
        amount_minor: i64,
        currency: Currency,
        provider: ProviderId,
        provider_ref: String,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            app_id,
            user_id,
            amount_minor,
            currency,
            entry_type: EntryType::Refund,
            status: EntryStatus::Settled,
            provider,
            provider_ref,
            platform_fee_minor: 0,
            developer_amount_minor: 0,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_entry_carries_the_split() {
        let entry = LedgerEntry::purchase(
            AppId::generate(),
            UserId::generate(),
            999,
            Currency::new("USD"),
            ProviderId::Stripe,
            "pi_123".into(),
            299,
            700,
        );
        assert_eq!(entry.entry_type, EntryType::Purchase);
        assert_eq!(entry.platform_fee_minor + entry.developer_amount_minor, entry.amount_minor);
    }

    #[test]
    fn refund_entry_has_no_split() {
        let entry = LedgerEntry::refund(
            AppId::generate(),
            UserId::generate(),
            500,
            Currency::new("KES"),
            ProviderId::Flutterwave,
            "flw-99".into(),
        );
        assert_eq!(entry.entry_type, EntryType::Refund);
        assert_eq!(entry.platform_fee_minor, 0);
        assert_eq!(entry.developer_amount_minor, 0);
    }
}
