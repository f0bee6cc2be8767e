//! Storage layer for Portal Market.
//!
//! The [`Store`] trait abstracts the persistence the payment core needs.
//! The production backend is PostgreSQL ([`PgStore`]); an in-memory backend
//! ([`MemoryStore`]) mirrors the same constraint semantics for tests.
//!
//! # Concurrency control
//!
//! All correctness under concurrent and duplicate webhook delivery comes
//! from storage-level guarantees, never from in-process locks:
//!
//! - `purchases` is unique on `(user_id, app_id)` — the upsert key that
//!   serializes concurrent transitions of one logical purchase.
//! - `ledger_entries` is unique on `provider_ref` — a provider transaction
//!   id is recorded, and counts toward revenue/downloads, at most once.
//! - App counters move only via atomic single-statement increments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use portal_market_core::{
    AppId, AppListing, Currency, DeveloperAccount, DeveloperId, LedgerEntry, ProviderId, Purchase,
    PurchaseId, UserId,
};

/// What a provider-confirmed payment settles into, in one atomic step.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// The app that was bought.
    pub app_id: AppId,
    /// The buyer.
    pub user_id: UserId,
    /// Gross amount in minor units.
    pub amount_minor: i64,
    /// Currency of the amounts.
    pub currency: Currency,
    /// Provider that confirmed the payment.
    pub provider: ProviderId,
    /// The provider's transaction id — the idempotency key.
    pub provider_ref: String,
    /// Platform share.
    pub platform_fee_minor: i64,
    /// Developer share, credited to the app's revenue counter.
    pub developer_amount_minor: i64,
}

/// Whether a settlement (or refund) write actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// First sighting of this provider reference; ledger and counters moved.
    Applied,
    /// Duplicate delivery; nothing changed beyond the idempotent purchase
    /// upsert.
    AlreadyRecorded,
}

/// The storage operations the payment core runs on.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Catalog projection
    // =========================================================================

    /// Insert or replace an app listing projection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_app(&self, app: &AppListing) -> Result<()>;

    /// Get an app by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_app(&self, id: &AppId) -> Result<Option<AppListing>>;

    /// Get an app by its public slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_app_by_slug(&self, slug: &str) -> Result<Option<AppListing>>;

    // =========================================================================
    // Purchases
    // =========================================================================

    /// Get the purchase row for a `(user, app)` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_purchase(&self, user_id: &UserId, app_id: &AppId) -> Result<Option<Purchase>>;

    /// Get a purchase by row id (status polls resolve checkout references
    /// this way).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>>;

    /// Upsert the `(user, app)` purchase row to `Pending` ahead of a
    /// provider checkout.
    ///
    /// Re-initiating checkout reuses the same row (and thus the same
    /// checkout reference). A `Completed` row is never regressed: it is
    /// returned unchanged and the caller decides what that means.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_pending_purchase(
        &self,
        user_id: &UserId,
        app_id: &AppId,
        amount_minor: i64,
        currency: &Currency,
        provider: ProviderId,
    ) -> Result<Purchase>;

    /// Upsert the `(user, app)` purchase row straight to `Completed` with a
    /// zero amount. The free-acquisition path; idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn complete_free_purchase(
        &self,
        user_id: &UserId,
        app_id: &AppId,
        currency: &Currency,
    ) -> Result<Purchase>;

    /// Transition a `Pending` purchase to `Failed`.
    ///
    /// Returns `true` if a row transitioned. A `Completed` purchase is
    /// never overwritten; a failure event arriving after completion is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn mark_purchase_failed(&self, user_id: &UserId, app_id: &AppId) -> Result<bool>;

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Reconcile a provider-confirmed payment, exactly once.
    ///
    /// In a single transaction: append the ledger entry if (and only if)
    /// `provider_ref` has not been seen, upsert the purchase to
    /// `Completed`, and — gated on the ledger insert — atomically bump the
    /// app's revenue and download counters.
    ///
    /// Safe to call any number of times with the same `provider_ref`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; state is left as
    /// it was before the call.
    async fn record_settlement(&self, settlement: &Settlement) -> Result<SettlementOutcome>;

    /// Append a refund ledger entry, idempotent on its `provider_ref`.
    /// Counters are untouched; clawback is reconciled at payout time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn append_refund(&self, entry: &LedgerEntry) -> Result<SettlementOutcome>;

    /// Audit read: ledger entries for an app, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_ledger_for_app(&self, app_id: &AppId, limit: usize) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Developer payout accounts
    // =========================================================================

    /// Persist a developer's provider account linkage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_developer_account(&self, account: &DeveloperAccount) -> Result<()>;

    /// Get a developer's linkage at one provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_developer_account(
        &self,
        developer_id: &DeveloperId,
        provider: ProviderId,
    ) -> Result<Option<DeveloperAccount>>;

    /// Flip the payout flag for a provider account id, as reported by the
    /// provider's account webhooks. Returns `true` if a row matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn set_developer_payouts_enabled(
        &self,
        provider_account_id: &str,
        enabled: bool,
    ) -> Result<bool>;
}
