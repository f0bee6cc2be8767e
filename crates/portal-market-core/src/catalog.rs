//! Catalog projection.
//!
//! Apps are owned by the submission/review subsystem. This service reads
//! the fields it needs to sell an app and atomically bumps the revenue and
//! download counters on settlement; everything else about an app lives
//! elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::Currency;
use crate::ids::{AppId, DeveloperId};

/// Review state of a listing. Only `Published` apps are purchasable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    /// Being drafted by the developer.
    Draft,
    /// Submitted, awaiting admin review.
    InReview,
    /// Live in the store.
    Published,
    /// Pulled from the store by an admin.
    Suspended,
}

/// The revenue-relevant projection of an app row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppListing {
    /// App identifier.
    pub id: AppId,
    /// URL slug, the public handle used by checkout and ownership calls.
    pub slug: String,
    /// Display title.
    pub title: String,
    /// The developer receiving the split.
    pub developer_id: DeveloperId,
    /// Listed price in minor units of `currency`. Zero means free.
    pub price_minor: i64,
    /// The currency the app is listed in.
    pub currency: Currency,
    /// Review state.
    pub status: AppStatus,
    /// Cumulative developer earnings in minor units.
    pub revenue_minor: i64,
    /// Completed purchase count.
    pub downloads: i64,
    /// When the listing was created.
    pub created_at: DateTime<Utc>,
}

impl AppListing {
    /// Whether the app costs nothing.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.price_minor == 0
    }

    /// Whether the app can currently be purchased.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == AppStatus::Published
    }
}
