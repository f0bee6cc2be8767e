//! Webhook reconciliation for Stripe and Flutterwave.
//!
//! Both endpoints share one contract over different wire formats:
//! authenticate the delivery, normalize it, re-verify the transaction with
//! the provider, then settle through the store's idempotent primitives.
//!
//! Ack policy differs per provider. Stripe: processing failures after
//! authentication return 5xx so Stripe's backoff redelivers — settlement
//! is idempotent, so redelivery is safe. Flutterwave: failures after
//! authentication are acknowledged with 200 and logged for manual
//! reconciliation, because unacked deliveries retry hot and eventually
//! disable the endpoint. Signature failures are 401 on both, with no state
//! change.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use portal_market_core::{calculate_split, LedgerEntry, RevenueSplit};
use portal_market_store::{Settlement, SettlementOutcome};

use crate::error::ApiError;
use crate::providers::{CompletedPayment, GatewayEvent, PaymentGateway, ProviderError};
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was received.
    pub received: bool,
}

/// Handle Stripe webhooks.
///
/// The raw body string goes into signature verification untouched; parsing
/// happens only after the signature holds.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let gateway = state
        .stripe
        .clone()
        .ok_or_else(|| ApiError::Internal("Stripe is not configured".into()))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    let event = authenticate(gateway.construct_webhook_event(&body, signature), "stripe")?;

    apply_event(&state, gateway.as_ref(), event).await?;

    Ok(Json(WebhookResponse { received: true }))
}

/// Handle Flutterwave webhooks.
pub async fn flutterwave_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let gateway = state
        .flutterwave
        .clone()
        .ok_or_else(|| ApiError::Internal("Flutterwave is not configured".into()))?;

    let signature = headers.get("verif-hash").and_then(|v| v.to_str().ok());

    let event = authenticate(gateway.construct_webhook_event(&body, signature), "flutterwave")?;

    // Acknowledge even on processing failure; the error log is the queue
    // for manual reconciliation.
    if let Err(err) = apply_event(&state, gateway.as_ref(), event).await {
        tracing::error!(
            provider = "flutterwave",
            error = %err,
            "Webhook processing failed after authentication; acknowledged"
        );
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Map authentication outcomes: signature problems become 401 with a
/// security log line (never the payload), malformed-but-authentic payloads
/// become 400.
fn authenticate(
    result: Result<GatewayEvent, ProviderError>,
    provider: &'static str,
) -> Result<GatewayEvent, ApiError> {
    result.map_err(|err| match err {
        ProviderError::InvalidSignature | ProviderError::Configuration(_) => {
            tracing::warn!(provider, "Webhook signature verification failed");
            ApiError::Unauthorized
        }
        other => other.into(),
    })
}

/// Dispatch a normalized event.
async fn apply_event(
    state: &AppState,
    gateway: &dyn PaymentGateway,
    event: GatewayEvent,
) -> Result<(), ApiError> {
    match event {
        GatewayEvent::PaymentCompleted(completed) => {
            settle_completed(state, gateway, completed).await
        }
        GatewayEvent::PaymentFailed {
            app_id,
            user_id,
            reference,
        } => {
            // Only pending purchases transition; a completed purchase is
            // terminal and a late failure event is absorbed as a no-op.
            let transitioned = state.store.mark_purchase_failed(&user_id, &app_id).await?;
            tracing::info!(
                user_id = %user_id,
                app_id = %app_id,
                reference = %reference,
                transitioned = %transitioned,
                "Payment failure event"
            );
            Ok(())
        }
        GatewayEvent::Refunded {
            reference,
            app_id,
            user_id,
            amount_minor,
            currency,
        } => {
            let (Some(app_id), Some(user_id)) = (app_id, user_id) else {
                tracing::warn!(
                    reference = %reference,
                    "Refund event without purchase identity; recorded in logs only"
                );
                return Ok(());
            };

            let entry = LedgerEntry::refund(
                app_id,
                user_id,
                amount_minor,
                currency,
                gateway.provider(),
                reference.clone(),
            );
            let outcome = state.store.append_refund(&entry).await?;

            // Revenue is not clawed back here; refunds net out at payout
            // reconciliation, with the ledger as the source of truth.
            tracing::info!(
                user_id = %user_id,
                app_id = %app_id,
                reference = %reference,
                amount_minor = %amount_minor,
                applied = %(outcome == SettlementOutcome::Applied),
                "Refund recorded"
            );
            Ok(())
        }
        GatewayEvent::PayoutAccountUpdated {
            provider_account_id,
            payouts_enabled,
        } => {
            let matched = state
                .store
                .set_developer_payouts_enabled(&provider_account_id, payouts_enabled)
                .await?;
            tracing::info!(
                provider_account_id = %provider_account_id,
                payouts_enabled = %payouts_enabled,
                matched = %matched,
                "Payout account update"
            );
            Ok(())
        }
        GatewayEvent::Ignored { kind } => {
            tracing::debug!(kind = %kind, "Unhandled provider event");
            Ok(())
        }
    }
}

/// Verify a completed payment with the provider, then settle it.
async fn settle_completed(
    state: &AppState,
    gateway: &dyn PaymentGateway,
    completed: CompletedPayment,
) -> Result<(), ApiError> {
    // The signature proves authenticity of a message, not that the
    // transaction is currently settled — look it up at the provider and
    // take the provider's answer as the amounts of record.
    let verified = gateway.verify_transaction(&completed.verify_ref).await?;

    if !verified.settled {
        tracing::warn!(
            reference = %completed.reference,
            "Provider does not confirm settlement; dropping event"
        );
        return Ok(());
    }

    if verified.amount_minor != completed.amount_minor || verified.currency != completed.currency
    {
        tracing::warn!(
            reference = %completed.reference,
            payload_amount = %completed.amount_minor,
            verified_amount = %verified.amount_minor,
            "Payload amounts disagree with provider; settling provider values"
        );
    }

    // The echoed split must account for the settled amount exactly;
    // otherwise recompute it under the standing commission policy.
    let mut split = RevenueSplit {
        platform_fee_minor: completed.platform_fee_minor,
        developer_amount_minor: completed.developer_amount_minor,
    };
    if split.total() != verified.amount_minor {
        split = calculate_split(verified.amount_minor)?;
    }

    let settlement = Settlement {
        app_id: completed.app_id,
        user_id: completed.user_id,
        amount_minor: verified.amount_minor,
        currency: verified.currency,
        provider: completed.provider,
        provider_ref: completed.reference.clone(),
        platform_fee_minor: split.platform_fee_minor,
        developer_amount_minor: split.developer_amount_minor,
    };

    match state.store.record_settlement(&settlement).await? {
        SettlementOutcome::Applied => {
            tracing::info!(
                user_id = %completed.user_id,
                app_id = %completed.app_id,
                provider_ref = %completed.reference,
                amount_minor = %settlement.amount_minor,
                developer_amount_minor = %settlement.developer_amount_minor,
                "Purchase settled"
            );
        }
        SettlementOutcome::AlreadyRecorded => {
            tracing::info!(
                provider_ref = %completed.reference,
                "Duplicate delivery; settlement already recorded"
            );
        }
    }

    Ok(())
}
