//! Ownership reads.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Ownership check request.
#[derive(Debug, Deserialize)]
pub struct OwnershipRequest {
    /// Slug of the app to check.
    pub app_slug: String,
}

/// Ownership check response.
#[derive(Debug, Serialize)]
pub struct OwnershipResponse {
    /// Whether the user may download the app.
    pub owned: bool,
    /// Whether the app is free.
    pub free: bool,
    /// When the purchase completed, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<String>,
}

/// Check whether the current user owns an app.
///
/// Free apps are owned by everyone — no purchase row is required to exist.
/// Paid apps are owned iff a completed purchase exists for the pair.
pub async fn check_ownership(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<OwnershipRequest>,
) -> Result<Json<OwnershipResponse>, ApiError> {
    let app = state
        .store
        .get_app_by_slug(&body.app_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("app not found: {}", body.app_slug)))?;

    let purchase = state.store.get_purchase(&auth.user_id, &app.id).await?;
    let purchased_at = purchase
        .as_ref()
        .filter(|p| p.is_completed())
        .and_then(|p| p.completed_at)
        .map(|t| t.to_rfc3339());

    if app.is_free() {
        return Ok(Json(OwnershipResponse {
            owned: true,
            free: true,
            purchased_at,
        }));
    }

    Ok(Json(OwnershipResponse {
        owned: purchased_at.is_some(),
        free: false,
        purchased_at,
    }))
}
