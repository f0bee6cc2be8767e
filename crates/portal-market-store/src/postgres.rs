//! PostgreSQL storage backend.
//!
//! All multi-step writes run inside database transactions, and every
//! idempotency/uniqueness guarantee is enforced by a constraint in the
//! schema rather than a check-then-write in application code. See the
//! crate docs for the constraint inventory.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;

use portal_market_core::{
    AppId, AppListing, AppStatus, Currency, DeveloperAccount, DeveloperId, EntryStatus, EntryType,
    LedgerEntry, ProviderId, Purchase, PurchaseId, PurchaseStatus, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::{Settlement, SettlementOutcome, Store};

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }

    /// Wrap an existing pool (migrations are the caller's concern).
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row types and enum encoding
// ============================================================================

#[derive(sqlx::FromRow)]
struct AppRow {
    id: uuid::Uuid,
    slug: String,
    title: String,
    developer_id: uuid::Uuid,
    price_minor: i64,
    currency: String,
    status: String,
    revenue_minor: i64,
    downloads: i64,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    app_id: uuid::Uuid,
    status: String,
    amount_minor: i64,
    currency: String,
    provider: Option<String>,
    tx_ref: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: String,
    app_id: uuid::Uuid,
    user_id: uuid::Uuid,
    amount_minor: i64,
    currency: String,
    entry_type: String,
    provider: String,
    provider_ref: String,
    platform_fee_minor: i64,
    developer_amount_minor: i64,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DeveloperAccountRow {
    developer_id: uuid::Uuid,
    provider: String,
    provider_account_id: String,
    payouts_enabled: bool,
    created_at: DateTime<Utc>,
}

const fn app_status_str(status: AppStatus) -> &'static str {
    match status {
        AppStatus::Draft => "draft",
        AppStatus::InReview => "in_review",
        AppStatus::Published => "published",
        AppStatus::Suspended => "suspended",
    }
}

fn parse_app_status(s: &str) -> Result<AppStatus> {
    match s {
        "draft" => Ok(AppStatus::Draft),
        "in_review" => Ok(AppStatus::InReview),
        "published" => Ok(AppStatus::Published),
        "suspended" => Ok(AppStatus::Suspended),
        other => Err(StoreError::Database(format!("unknown app status: {other}"))),
    }
}

fn parse_purchase_status(s: &str) -> Result<PurchaseStatus> {
    match s {
        "pending" => Ok(PurchaseStatus::Pending),
        "completed" => Ok(PurchaseStatus::Completed),
        "failed" => Ok(PurchaseStatus::Failed),
        other => Err(StoreError::Database(format!("unknown purchase status: {other}"))),
    }
}

const fn provider_str(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Stripe => "stripe",
        ProviderId::Flutterwave => "flutterwave",
    }
}

fn parse_provider(s: &str) -> Result<ProviderId> {
    match s {
        "stripe" => Ok(ProviderId::Stripe),
        "flutterwave" => Ok(ProviderId::Flutterwave),
        other => Err(StoreError::Database(format!("unknown provider: {other}"))),
    }
}

const fn entry_type_str(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Purchase => "purchase",
        EntryType::Refund => "refund",
    }
}

fn parse_entry_type(s: &str) -> Result<EntryType> {
    match s {
        "purchase" => Ok(EntryType::Purchase),
        "refund" => Ok(EntryType::Refund),
        other => Err(StoreError::Database(format!("unknown entry type: {other}"))),
    }
}

impl TryFrom<AppRow> for AppListing {
    type Error = StoreError;

    fn try_from(row: AppRow) -> Result<Self> {
        Ok(Self {
            id: AppId::from_uuid(row.id),
            slug: row.slug,
            title: row.title,
            developer_id: DeveloperId::from_uuid(row.developer_id),
            price_minor: row.price_minor,
            currency: Currency::new(&row.currency),
            status: parse_app_status(&row.status)?,
            revenue_minor: row.revenue_minor,
            downloads: row.downloads,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = StoreError;

    fn try_from(row: PurchaseRow) -> Result<Self> {
        Ok(Self {
            id: PurchaseId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            app_id: AppId::from_uuid(row.app_id),
            status: parse_purchase_status(&row.status)?,
            amount_minor: row.amount_minor,
            currency: Currency::new(&row.currency),
            provider: row.provider.as_deref().map(parse_provider).transpose()?,
            tx_ref: row.tx_ref,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        Ok(Self {
            id: TransactionId::from_str(&row.id)
                .map_err(|e| StoreError::Database(format!("bad ledger id: {e}")))?,
            app_id: AppId::from_uuid(row.app_id),
            user_id: UserId::from_uuid(row.user_id),
            amount_minor: row.amount_minor,
            currency: Currency::new(&row.currency),
            entry_type: parse_entry_type(&row.entry_type)?,
            status: EntryStatus::Settled,
            provider: parse_provider(&row.provider)?,
            provider_ref: row.provider_ref,
            platform_fee_minor: row.platform_fee_minor,
            developer_amount_minor: row.developer_amount_minor,
            created_at: row.created_at,
        })
    }
}

impl From<DeveloperAccountRow> for DeveloperAccount {
    fn from(row: DeveloperAccountRow) -> Self {
        Self {
            developer_id: DeveloperId::from_uuid(row.developer_id),
            provider: if row.provider == "stripe" {
                ProviderId::Stripe
            } else {
                ProviderId::Flutterwave
            },
            provider_account_id: row.provider_account_id,
            payouts_enabled: row.payouts_enabled,
            created_at: row.created_at,
        }
    }
}

const PURCHASE_COLUMNS: &str = "id, user_id, app_id, status, amount_minor, currency, provider, \
     tx_ref, completed_at, created_at, updated_at";

#[async_trait::async_trait]
impl Store for PgStore {
    async fn put_app(&self, app: &AppListing) -> Result<()> {
        sqlx::query(
            "INSERT INTO apps (id, slug, title, developer_id, price_minor, currency, status, \
             revenue_minor, downloads, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE \
             SET slug = EXCLUDED.slug, title = EXCLUDED.title, \
                 price_minor = EXCLUDED.price_minor, currency = EXCLUDED.currency, \
                 status = EXCLUDED.status",
        )
        .bind(app.id.as_uuid())
        .bind(&app.slug)
        .bind(&app.title)
        .bind(app.developer_id.as_uuid())
        .bind(app.price_minor)
        .bind(app.currency.as_str())
        .bind(app_status_str(app.status))
        .bind(app.revenue_minor)
        .bind(app.downloads)
        .bind(app.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_app(&self, id: &AppId) -> Result<Option<AppListing>> {
        let row: Option<AppRow> = sqlx::query_as("SELECT * FROM apps WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(AppListing::try_from).transpose()
    }

    async fn get_app_by_slug(&self, slug: &str) -> Result<Option<AppListing>> {
        let row: Option<AppRow> = sqlx::query_as("SELECT * FROM apps WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AppListing::try_from).transpose()
    }

    async fn get_purchase(&self, user_id: &UserId, app_id: &AppId) -> Result<Option<Purchase>> {
        let row: Option<PurchaseRow> = sqlx::query_as(
            "SELECT * FROM purchases WHERE user_id = $1 AND app_id = $2",
        )
        .bind(user_id.as_uuid())
        .bind(app_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Purchase::try_from).transpose()
    }

    async fn get_purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>> {
        let row: Option<PurchaseRow> = sqlx::query_as("SELECT * FROM purchases WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Purchase::try_from).transpose()
    }

    async fn upsert_pending_purchase(
        &self,
        user_id: &UserId,
        app_id: &AppId,
        amount_minor: i64,
        currency: &Currency,
        provider: ProviderId,
    ) -> Result<Purchase> {
        let new_id = PurchaseId::generate();
        let tx_ref = Purchase::checkout_reference(&new_id);

        // The WHERE guard keeps a completed row untouched; in that case
        // RETURNING yields nothing and we hand back the terminal row.
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            "INSERT INTO purchases (id, user_id, app_id, status, amount_minor, currency, \
             provider, tx_ref) \
             VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7) \
             ON CONFLICT (user_id, app_id) DO UPDATE \
             SET status = 'pending', amount_minor = EXCLUDED.amount_minor, \
                 currency = EXCLUDED.currency, provider = EXCLUDED.provider, \
                 updated_at = now() \
             WHERE purchases.status <> 'completed' \
             RETURNING {PURCHASE_COLUMNS}"
        ))
        .bind(new_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(app_id.as_uuid())
        .bind(amount_minor)
        .bind(currency.as_str())
        .bind(provider_str(provider))
        .bind(&tx_ref)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Purchase::try_from(row),
            None => self
                .get_purchase(user_id, app_id)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "purchase",
                    id: format!("{user_id}/{app_id}"),
                }),
        }
    }

    async fn complete_free_purchase(
        &self,
        user_id: &UserId,
        app_id: &AppId,
        currency: &Currency,
    ) -> Result<Purchase> {
        let new_id = PurchaseId::generate();
        let tx_ref = Purchase::checkout_reference(&new_id);

        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            "INSERT INTO purchases (id, user_id, app_id, status, amount_minor, currency, \
             tx_ref, completed_at) \
             VALUES ($1, $2, $3, 'completed', 0, $4, $5, now()) \
             ON CONFLICT (user_id, app_id) DO UPDATE \
             SET status = 'completed', amount_minor = 0, \
                 completed_at = COALESCE(purchases.completed_at, now()), \
                 updated_at = now() \
             WHERE purchases.status <> 'completed' \
             RETURNING {PURCHASE_COLUMNS}"
        ))
        .bind(new_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(app_id.as_uuid())
        .bind(currency.as_str())
        .bind(&tx_ref)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Purchase::try_from(row),
            None => self
                .get_purchase(user_id, app_id)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "purchase",
                    id: format!("{user_id}/{app_id}"),
                }),
        }
    }

    async fn mark_purchase_failed(&self, user_id: &UserId, app_id: &AppId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE purchases SET status = 'failed', updated_at = now() \
             WHERE user_id = $1 AND app_id = $2 AND status = 'pending'",
        )
        .bind(user_id.as_uuid())
        .bind(app_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_settlement(&self, settlement: &Settlement) -> Result<SettlementOutcome> {
        let mut tx = self.pool.begin().await?;

        let entry_id = TransactionId::generate();
        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO ledger_entries (id, app_id, user_id, amount_minor, currency, \
             entry_type, status, provider, provider_ref, platform_fee_minor, \
             developer_amount_minor) \
             VALUES ($1, $2, $3, $4, $5, 'purchase', 'settled', $6, $7, $8, $9) \
             ON CONFLICT (provider_ref) DO NOTHING \
             RETURNING id",
        )
        .bind(entry_id.to_string())
        .bind(settlement.app_id.as_uuid())
        .bind(settlement.user_id.as_uuid())
        .bind(settlement.amount_minor)
        .bind(settlement.currency.as_str())
        .bind(provider_str(settlement.provider))
        .bind(&settlement.provider_ref)
        .bind(settlement.platform_fee_minor)
        .bind(settlement.developer_amount_minor)
        .fetch_optional(&mut *tx)
        .await?;

        let new_id = PurchaseId::generate();
        let tx_ref = Purchase::checkout_reference(&new_id);
        sqlx::query(
            "INSERT INTO purchases (id, user_id, app_id, status, amount_minor, currency, \
             provider, tx_ref, completed_at) \
             VALUES ($1, $2, $3, 'completed', $4, $5, $6, $7, now()) \
             ON CONFLICT (user_id, app_id) DO UPDATE \
             SET status = 'completed', \
                 completed_at = COALESCE(purchases.completed_at, now()), \
                 updated_at = now()",
        )
        .bind(new_id.as_uuid())
        .bind(settlement.user_id.as_uuid())
        .bind(settlement.app_id.as_uuid())
        .bind(settlement.amount_minor)
        .bind(settlement.currency.as_str())
        .bind(provider_str(settlement.provider))
        .bind(&tx_ref)
        .execute(&mut *tx)
        .await?;

        let outcome = if inserted.is_some() {
            sqlx::query(
                "UPDATE apps \
                 SET revenue_minor = revenue_minor + $1, downloads = downloads + 1 \
                 WHERE id = $2",
            )
            .bind(settlement.developer_amount_minor)
            .bind(settlement.app_id.as_uuid())
            .execute(&mut *tx)
            .await?;

            SettlementOutcome::Applied
        } else {
            tracing::debug!(
                provider_ref = %settlement.provider_ref,
                "Settlement already recorded, counters untouched"
            );
            SettlementOutcome::AlreadyRecorded
        };

        tx.commit().await?;

        Ok(outcome)
    }

    async fn append_refund(&self, entry: &LedgerEntry) -> Result<SettlementOutcome> {
        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO ledger_entries (id, app_id, user_id, amount_minor, currency, \
             entry_type, status, provider, provider_ref, platform_fee_minor, \
             developer_amount_minor) \
             VALUES ($1, $2, $3, $4, $5, $6, 'settled', $7, $8, $9, $10) \
             ON CONFLICT (provider_ref) DO NOTHING \
             RETURNING id",
        )
        .bind(entry.id.to_string())
        .bind(entry.app_id.as_uuid())
        .bind(entry.user_id.as_uuid())
        .bind(entry.amount_minor)
        .bind(entry.currency.as_str())
        .bind(entry_type_str(entry.entry_type))
        .bind(provider_str(entry.provider))
        .bind(&entry.provider_ref)
        .bind(entry.platform_fee_minor)
        .bind(entry.developer_amount_minor)
        .fetch_optional(&self.pool)
        .await?;

        Ok(if inserted.is_some() {
            SettlementOutcome::Applied
        } else {
            SettlementOutcome::AlreadyRecorded
        })
    }

    async fn list_ledger_for_app(&self, app_id: &AppId, limit: usize) -> Result<Vec<LedgerEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<LedgerRow> = sqlx::query_as(
            "SELECT * FROM ledger_entries WHERE app_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(app_id.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    async fn put_developer_account(&self, account: &DeveloperAccount) -> Result<()> {
        sqlx::query(
            "INSERT INTO developer_accounts (developer_id, provider, provider_account_id, \
             payouts_enabled, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (developer_id, provider) DO UPDATE \
             SET provider_account_id = EXCLUDED.provider_account_id, \
                 payouts_enabled = EXCLUDED.payouts_enabled",
        )
        .bind(account.developer_id.as_uuid())
        .bind(provider_str(account.provider))
        .bind(&account.provider_account_id)
        .bind(account.payouts_enabled)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_developer_account(
        &self,
        developer_id: &DeveloperId,
        provider: ProviderId,
    ) -> Result<Option<DeveloperAccount>> {
        let row: Option<DeveloperAccountRow> = sqlx::query_as(
            "SELECT * FROM developer_accounts WHERE developer_id = $1 AND provider = $2",
        )
        .bind(developer_id.as_uuid())
        .bind(provider_str(provider))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeveloperAccount::from))
    }

    async fn set_developer_payouts_enabled(
        &self,
        provider_account_id: &str,
        enabled: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE developer_accounts SET payouts_enabled = $1 WHERE provider_account_id = $2",
        )
        .bind(enabled)
        .bind(provider_account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
