//! Core types and logic for the Portal Market payment backend.
//!
//! This crate holds the pure domain layer shared by the store and the HTTP
//! service:
//!
//! - **Identifiers**: `UserId`, `AppId`, `DeveloperId`, `PurchaseId`, `TransactionId`
//! - **Catalog projection**: `AppListing`, `AppStatus`
//! - **Purchases**: `Purchase`, `PurchaseStatus`
//! - **Ledger**: `LedgerEntry`, `EntryType`
//! - **Payments**: `ProviderId`, `Currency`, `select_provider`, `RevenueSplit`
//!
//! # Money
//!
//! All amounts are integer **minor units** of their currency (cents, kobo,
//! pesewas, ...), stored as `i64`. Splitting a price into the platform fee
//! and the developer share is exact: the two parts always sum back to the
//! price with no rounding leakage.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod currency;
pub mod developer;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod purchase;
pub mod split;

pub use catalog::{AppListing, AppStatus};
pub use currency::{select_provider, Currency, ProviderId};
pub use developer::DeveloperAccount;
pub use error::{MarketError, Result};
pub use ids::{AppId, DeveloperId, IdError, PurchaseId, TransactionId, UserId};
pub use ledger::{EntryStatus, EntryType, LedgerEntry};
pub use purchase::{Purchase, PurchaseStatus};
pub use split::{calculate as calculate_split, RevenueSplit, PLATFORM_COMMISSION_PERCENT};
