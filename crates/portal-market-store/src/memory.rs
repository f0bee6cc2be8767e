//! In-memory storage backend.
//!
//! Mirrors the PostgreSQL backend's constraint semantics — the
//! `(user_id, app_id)` purchase key, `provider_ref` ledger uniqueness,
//! atomic counter bumps — behind a mutex, so integration tests exercise
//! the same behavior without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use portal_market_core::{
    AppId, AppListing, Currency, DeveloperAccount, DeveloperId, LedgerEntry, ProviderId, Purchase,
    PurchaseId, PurchaseStatus, UserId,
};

use crate::error::{Result, StoreError};
use crate::{Settlement, SettlementOutcome, Store};

#[derive(Default)]
struct Inner {
    apps: HashMap<AppId, AppListing>,
    purchases: HashMap<(UserId, AppId), Purchase>,
    /// Append-only; uniqueness of `provider_ref` is checked on insert.
    ledger: Vec<LedgerEntry>,
    developer_accounts: HashMap<(DeveloperId, ProviderId), DeveloperAccount>,
}

impl Inner {
    fn has_provider_ref(&self, provider_ref: &str) -> bool {
        self.ledger.iter().any(|e| e.provider_ref == provider_ref)
    }
}

/// Mutex-guarded [`Store`] for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a test already panicked; propagating the
        // inner state is the useful behavior there.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_app(&self, app: &AppListing) -> Result<()> {
        self.lock().apps.insert(app.id, app.clone());
        Ok(())
    }

    async fn get_app(&self, id: &AppId) -> Result<Option<AppListing>> {
        Ok(self.lock().apps.get(id).cloned())
    }

    async fn get_app_by_slug(&self, slug: &str) -> Result<Option<AppListing>> {
        Ok(self.lock().apps.values().find(|a| a.slug == slug).cloned())
    }

    async fn get_purchase(&self, user_id: &UserId, app_id: &AppId) -> Result<Option<Purchase>> {
        Ok(self.lock().purchases.get(&(*user_id, *app_id)).cloned())
    }

    async fn get_purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>> {
        Ok(self.lock().purchases.values().find(|p| p.id == *id).cloned())
    }

    async fn upsert_pending_purchase(
        &self,
        user_id: &UserId,
        app_id: &AppId,
        amount_minor: i64,
        currency: &Currency,
        provider: ProviderId,
    ) -> Result<Purchase> {
        let mut inner = self.lock();
        let now = Utc::now();

        let purchase = inner
            .purchases
            .entry((*user_id, *app_id))
            .and_modify(|p| {
                if p.status != PurchaseStatus::Completed {
                    p.status = PurchaseStatus::Pending;
                    p.amount_minor = amount_minor;
                    p.currency = currency.clone();
                    p.provider = Some(provider);
                    p.updated_at = now;
                }
            })
            .or_insert_with(|| {
                let id = PurchaseId::generate();
                Purchase {
                    id,
                    user_id: *user_id,
                    app_id: *app_id,
                    status: PurchaseStatus::Pending,
                    amount_minor,
                    currency: currency.clone(),
                    provider: Some(provider),
                    tx_ref: Some(Purchase::checkout_reference(&id)),
                    completed_at: None,
                    created_at: now,
                    updated_at: now,
                }
            });

        Ok(purchase.clone())
    }

    async fn complete_free_purchase(
        &self,
        user_id: &UserId,
        app_id: &AppId,
        currency: &Currency,
    ) -> Result<Purchase> {
        let mut inner = self.lock();
        let now = Utc::now();

        let purchase = inner
            .purchases
            .entry((*user_id, *app_id))
            .and_modify(|p| {
                if p.status != PurchaseStatus::Completed {
                    p.status = PurchaseStatus::Completed;
                    p.amount_minor = 0;
                    p.completed_at = Some(now);
                    p.updated_at = now;
                }
            })
            .or_insert_with(|| {
                let id = PurchaseId::generate();
                Purchase {
                    id,
                    user_id: *user_id,
                    app_id: *app_id,
                    status: PurchaseStatus::Completed,
                    amount_minor: 0,
                    currency: currency.clone(),
                    provider: None,
                    tx_ref: Some(Purchase::checkout_reference(&id)),
                    completed_at: Some(now),
                    created_at: now,
                    updated_at: now,
                }
            });

        Ok(purchase.clone())
    }

    async fn mark_purchase_failed(&self, user_id: &UserId, app_id: &AppId) -> Result<bool> {
        let mut inner = self.lock();

        if let Some(p) = inner.purchases.get_mut(&(*user_id, *app_id)) {
            if p.status == PurchaseStatus::Pending {
                p.status = PurchaseStatus::Failed;
                p.updated_at = Utc::now();
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn record_settlement(&self, settlement: &Settlement) -> Result<SettlementOutcome> {
        let mut inner = self.lock();
        let now = Utc::now();

        let applied = !inner.has_provider_ref(&settlement.provider_ref);

        if applied {
            inner.ledger.push(LedgerEntry::purchase(
                settlement.app_id,
                settlement.user_id,
                settlement.amount_minor,
                settlement.currency.clone(),
                settlement.provider,
                settlement.provider_ref.clone(),
                settlement.platform_fee_minor,
                settlement.developer_amount_minor,
            ));
        }

        // Purchase upsert is unconditional: a duplicate delivery must still
        // leave the purchase completed, without touching completed_at.
        inner
            .purchases
            .entry((settlement.user_id, settlement.app_id))
            .and_modify(|p| {
                if p.status != PurchaseStatus::Completed {
                    p.status = PurchaseStatus::Completed;
                    p.completed_at = Some(now);
                    p.updated_at = now;
                }
            })
            .or_insert_with(|| {
                let id = PurchaseId::generate();
                Purchase {
                    id,
                    user_id: settlement.user_id,
                    app_id: settlement.app_id,
                    status: PurchaseStatus::Completed,
                    amount_minor: settlement.amount_minor,
                    currency: settlement.currency.clone(),
                    provider: Some(settlement.provider),
                    tx_ref: Some(Purchase::checkout_reference(&id)),
                    completed_at: Some(now),
                    created_at: now,
                    updated_at: now,
                }
            });

        if applied {
            let app = inner
                .apps
                .get_mut(&settlement.app_id)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "app",
                    id: settlement.app_id.to_string(),
                })?;
            app.revenue_minor += settlement.developer_amount_minor;
            app.downloads += 1;

            Ok(SettlementOutcome::Applied)
        } else {
            Ok(SettlementOutcome::AlreadyRecorded)
        }
    }

    async fn append_refund(&self, entry: &LedgerEntry) -> Result<SettlementOutcome> {
        let mut inner = self.lock();

        if inner.has_provider_ref(&entry.provider_ref) {
            return Ok(SettlementOutcome::AlreadyRecorded);
        }

        inner.ledger.push(entry.clone());
        Ok(SettlementOutcome::Applied)
    }

    async fn list_ledger_for_app(&self, app_id: &AppId, limit: usize) -> Result<Vec<LedgerEntry>> {
        let inner = self.lock();
        let mut entries: Vec<_> = inner
            .ledger
            .iter()
            .filter(|e| e.app_id == *app_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.id.to_string().cmp(&a.id.to_string()));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn put_developer_account(&self, account: &DeveloperAccount) -> Result<()> {
        self.lock()
            .developer_accounts
            .insert((account.developer_id, account.provider), account.clone());
        Ok(())
    }

    async fn get_developer_account(
        &self,
        developer_id: &DeveloperId,
        provider: ProviderId,
    ) -> Result<Option<DeveloperAccount>> {
        Ok(self
            .lock()
            .developer_accounts
            .get(&(*developer_id, provider))
            .cloned())
    }

    async fn set_developer_payouts_enabled(
        &self,
        provider_account_id: &str,
        enabled: bool,
    ) -> Result<bool> {
        let mut inner = self.lock();
        for account in inner.developer_accounts.values_mut() {
            if account.provider_account_id == provider_account_id {
                account.payouts_enabled = enabled;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
