//! Developer payout account onboarding.
//!
//! The revenue split computed at purchase time needs a destination. This
//! handler creates the developer's sub-merchant account at a provider and
//! persists the linkage; the provider's account webhooks flip the payout
//! flag once onboarding checks pass.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use portal_market_core::{DeveloperAccount, DeveloperId, ProviderId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::providers::SubmerchantRequest;
use crate::state::AppState;

/// Payout account creation request.
#[derive(Debug, Deserialize)]
pub struct PayoutAccountRequest {
    /// Which provider to create the account at.
    pub provider: ProviderId,
    /// Developer contact email.
    pub email: String,
    /// Registered business name.
    pub business_name: String,
    /// ISO country code.
    pub country: String,
    /// Settlement bank code (required for Flutterwave).
    pub bank_code: Option<String>,
    /// Settlement account number (required for Flutterwave).
    pub account_number: Option<String>,
}

/// Payout account creation response.
#[derive(Debug, Serialize)]
pub struct PayoutAccountResponse {
    /// Which provider holds the account.
    pub provider: ProviderId,
    /// The provider's account id.
    pub account_id: String,
    /// Hosted onboarding URL, when the provider uses one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_url: Option<String>,
    /// Payouts start disabled until the provider clears the account.
    pub payouts_enabled: bool,
}

/// Create and persist a payout account for the current developer.
pub async fn create_payout_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PayoutAccountRequest>,
) -> Result<Json<PayoutAccountResponse>, ApiError> {
    if body.provider == ProviderId::Flutterwave
        && (body.bank_code.is_none() || body.account_number.is_none())
    {
        return Err(ApiError::BadRequest(
            "bank_code and account_number are required for Flutterwave subaccounts".into(),
        ));
    }

    let gateway = state
        .gateway(body.provider)
        .ok_or_else(|| ApiError::PaymentProvider(format!("{} is not configured", body.provider)))?;

    let request = SubmerchantRequest {
        email: body.email,
        business_name: body.business_name,
        country: body.country,
        bank_code: body.bank_code,
        account_number: body.account_number,
    };

    let submerchant = gateway.create_submerchant(&request).await?;

    let developer_id = DeveloperId::from_uuid(*auth.user_id.as_uuid());
    let account = DeveloperAccount::new(
        developer_id,
        submerchant.provider,
        submerchant.account_id.clone(),
    );
    state.store.put_developer_account(&account).await?;

    tracing::info!(
        developer_id = %developer_id,
        provider = %submerchant.provider,
        account_id = %submerchant.account_id,
        "Developer payout account linked"
    );

    Ok(Json(PayoutAccountResponse {
        provider: submerchant.provider,
        account_id: submerchant.account_id,
        onboarding_url: submerchant.onboarding_url,
        payouts_enabled: false,
    }))
}
