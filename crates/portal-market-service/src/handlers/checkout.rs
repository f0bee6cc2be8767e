//! Checkout orchestration.
//!
//! `initiate_checkout` is the purchase entry point: it validates
//! eligibility, short-circuits free apps, computes the revenue split,
//! routes the currency to a provider, pins the `(user, app)` purchase row
//! to `Pending`, and opens a hosted checkout session. Completion is
//! asynchronous — the webhook reconciler finishes the purchase; clients
//! poll `checkout_status` or re-check ownership.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use portal_market_core::{
    calculate_split, select_provider, Currency, ProviderId, Purchase, PurchaseStatus,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::providers::CheckoutIntent;
use crate::state::AppState;

/// Checkout initiation request.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Slug of the app to buy.
    #[serde(default)]
    pub app_slug: String,
    /// Currency to charge in. Must match the app's listed currency (no FX
    /// conversion); defaults to it when omitted.
    pub currency: Option<String>,
    /// Payment method hint forwarded to the provider (e.g. "card",
    /// "mpesa").
    pub payment_method: Option<String>,
    /// Buyer phone number for mobile-money flows.
    pub phone_number: Option<String>,
}

/// Checkout initiation response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Always true on the success path.
    pub success: bool,
    /// Set for free acquisitions: ownership is immediate, no payment step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free: Option<bool>,
    /// The purchase row id (free acquisitions).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<String>,
    /// Provider the checkout was routed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    /// Hosted payment page to redirect the user to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Provider-assigned session id (Stripe).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Our checkout reference (Flutterwave).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    /// Platform share of the price, minor units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_fee_minor: Option<i64>,
    /// Developer share of the price, minor units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_amount_minor: Option<i64>,
}

/// Initiate checkout for an app.
pub async fn initiate_checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    if body.app_slug.is_empty() {
        return Err(ApiError::BadRequest("missing app_slug".into()));
    }

    // Resolve the app; unpublished apps are indistinguishable from absent
    // ones to buyers.
    let app = state
        .store
        .get_app_by_slug(&body.app_slug)
        .await?
        .filter(portal_market_core::AppListing::is_published)
        .ok_or_else(|| ApiError::NotFound(format!("app not found: {}", body.app_slug)))?;

    // Already-owned guard, before any provider work.
    if let Some(purchase) = state.store.get_purchase(&auth.user_id, &app.id).await? {
        if purchase.is_completed() {
            return Err(ApiError::AlreadyOwned);
        }
    }

    // Free apps never touch the payment path.
    if app.is_free() {
        let purchase = state
            .store
            .complete_free_purchase(&auth.user_id, &app.id, &app.currency)
            .await?;

        tracing::info!(
            user_id = %auth.user_id,
            app = %app.slug,
            purchase_id = %purchase.id,
            "Free app acquired"
        );

        return Ok(Json(CheckoutResponse {
            success: true,
            free: Some(true),
            purchase_id: Some(purchase.id.to_string()),
            provider: None,
            url: None,
            session_id: None,
            tx_ref: None,
            platform_fee_minor: None,
            developer_amount_minor: None,
        }));
    }

    // Prices are listed in one currency; there is no FX conversion here.
    let currency = body
        .currency
        .as_deref()
        .map_or_else(|| app.currency.clone(), Currency::new);
    if currency != app.currency {
        return Err(ApiError::BadRequest(format!(
            "app is listed in {}, not {currency}",
            app.currency
        )));
    }

    let split = calculate_split(app.price_minor)?;
    let provider = select_provider(&currency)?;

    // Pin the purchase row before the provider call; the upsert is safe to
    // retry on provider failure and never regresses a completed row.
    let purchase = state
        .store
        .upsert_pending_purchase(&auth.user_id, &app.id, app.price_minor, &currency, provider)
        .await?;
    if purchase.status == PurchaseStatus::Completed {
        // Lost a race against our own webhook; the user owns the app.
        return Err(ApiError::AlreadyOwned);
    }

    let gateway = state
        .gateway(provider)
        .ok_or_else(|| ApiError::PaymentProvider(format!("{provider} is not configured")))?;

    let tx_ref = purchase
        .tx_ref
        .clone()
        .unwrap_or_else(|| Purchase::checkout_reference(&purchase.id));

    let intent = CheckoutIntent {
        app_id: app.id,
        user_id: auth.user_id,
        app_title: app.title.clone(),
        tx_ref: tx_ref.clone(),
        amount_minor: app.price_minor,
        currency,
        split,
        customer_email: None,
        phone_number: body.phone_number,
        payment_method: body.payment_method,
        success_url: format!(
            "{}/store/{}/purchase/complete",
            state.config.frontend_url, app.slug
        ),
        cancel_url: format!("{}/store/{}", state.config.frontend_url, app.slug),
    };

    let session = gateway.create_checkout(&intent).await?;

    tracing::info!(
        user_id = %auth.user_id,
        app = %app.slug,
        provider = %provider,
        amount_minor = %app.price_minor,
        tx_ref = %tx_ref,
        "Checkout session created"
    );

    Ok(Json(CheckoutResponse {
        success: true,
        free: None,
        purchase_id: None,
        provider: Some(provider),
        url: Some(session.url),
        session_id: session.session_id,
        tx_ref: session.tx_ref,
        platform_fee_minor: Some(split.platform_fee_minor),
        developer_amount_minor: Some(split.developer_amount_minor),
    }))
}

/// Checkout status query.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Stripe session id (`cs_...`).
    pub session_id: Option<String>,
    /// Our checkout reference (`pm-...`).
    pub tx_ref: Option<String>,
}

/// Checkout status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// The reference that was looked up.
    pub reference: String,
    /// "pending", "completed" or "failed".
    pub status: &'static str,
}

/// Poll the status of an initiated checkout.
///
/// Stripe session ids are retrieved live (the session object is
/// authoritative and cheap to fetch); our own `pm-` references resolve
/// through the purchase row, which stays pending until the webhook lands.
pub async fn checkout_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    if let Some(session_id) = query.session_id {
        let gateway = state
            .gateway(ProviderId::Stripe)
            .ok_or_else(|| ApiError::PaymentProvider("STRIPE is not configured".into()))?;

        let verified = gateway.verify_transaction(&session_id).await?;

        return Ok(Json(StatusResponse {
            reference: verified.reference,
            status: if verified.settled { "completed" } else { "pending" },
        }));
    }

    if let Some(tx_ref) = query.tx_ref {
        let purchase_id = Purchase::parse_checkout_reference(&tx_ref)
            .ok_or_else(|| ApiError::NotFound(format!("unknown reference: {tx_ref}")))?;

        let purchase = state
            .store
            .get_purchase_by_id(&purchase_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("unknown reference: {tx_ref}")))?;

        return Ok(Json(StatusResponse {
            reference: tx_ref,
            status: match purchase.status {
                PurchaseStatus::Pending => "pending",
                PurchaseStatus::Completed => "completed",
                PurchaseStatus::Failed => "failed",
            },
        }));
    }

    Err(ApiError::BadRequest("session_id or tx_ref is required".into()))
}
