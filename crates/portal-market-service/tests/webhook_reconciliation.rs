//! Webhook reconciliation tests: signature gating, provider
//! re-verification, exactly-once settlement under duplicate delivery, and
//! the terminal-state invariant.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{auth_header, harness, seed_app, stripe_signed_header, FLW_WEBHOOK_SECRET};
use portal_market_core::{AppId, DeveloperAccount, ProviderId, PurchaseStatus, UserId};
use portal_market_store::Store;

/// A signed Flutterwave `charge.completed` payload.
fn flw_charge_payload(
    transaction_id: i64,
    status: &str,
    app_id: AppId,
    user_id: UserId,
    amount: f64,
    currency: &str,
) -> String {
    json!({
        "event": "charge.completed",
        "data": {
            "id": transaction_id,
            "tx_ref": "pm-00000000-0000-0000-0000-000000000000",
            "amount": amount,
            "currency": currency,
            "status": status,
            "meta": {
                "app_id": app_id.to_string(),
                "user_id": user_id.to_string(),
                "platform_fee_minor": "15000",
                "developer_amount_minor": "35000"
            }
        }
    })
    .to_string()
}

/// Mount the Flutterwave verification double for one transaction.
async fn mount_flw_verify(
    mock: &wiremock::MockServer,
    transaction_id: i64,
    status: &str,
    amount: f64,
    currency: &str,
) {
    Mock::given(method("GET"))
        .and(path(format!("/transactions/{transaction_id}/verify")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Transaction fetched successfully",
            "data": {
                "id": transaction_id,
                "tx_ref": "pm-00000000-0000-0000-0000-000000000000",
                "amount": amount,
                "currency": currency,
                "status": status
            }
        })))
        .mount(mock)
        .await;
}

#[tokio::test]
async fn stripe_checkout_completes_end_to_end() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "beat-blade", 999, "USD").await;

    // Checkout first, so the webhook completes a real pending purchase.
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "url": "https://checkout.stripe.com/c/pay/cs_test_1"
        })))
        .mount(&h.stripe_mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/checkout/sessions/cs_test_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "amount_total": 999,
            "currency": "usd"
        })))
        .mount(&h.stripe_mock)
        .await;

    let response = h
        .server
        .post("/v1/checkout")
        .add_header(AUTHORIZATION, auth_header(&user))
        .json(&json!({ "app_slug": "beat-blade", "currency": "USD" }))
        .await;
    response.assert_status_ok();

    let body = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_test_1",
            "payment_status": "paid",
            "amount_total": 999,
            "currency": "usd",
            "metadata": {
                "app_id": app.id.to_string(),
                "user_id": user.to_string(),
                "platform_fee_minor": "299",
                "developer_amount_minor": "700"
            }
        }}
    })
    .to_string();

    let response = h
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signed_header(&body))
        .text(body)
        .await;

    response.assert_status_ok();
    let ack: Value = response.json();
    assert_eq!(ack["received"], true);

    let purchase = h.store.get_purchase(&user, &app.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Completed);
    assert!(purchase.completed_at.is_some());

    let app_after = h.store.get_app(&app.id).await.unwrap().unwrap();
    assert_eq!(app_after.revenue_minor, 700);
    assert_eq!(app_after.downloads, 1);
    assert_eq!(h.store.list_ledger_for_app(&app.id, 10).await.unwrap().len(), 1);

    // Ownership flips once settlement lands.
    let response = h
        .server
        .post("/v1/library/ownership")
        .add_header(AUTHORIZATION, auth_header(&user))
        .json(&json!({ "app_slug": "beat-blade" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["owned"], true);
    assert_eq!(body["free"], false);
    assert!(body["purchased_at"].is_string());
}

#[tokio::test]
async fn duplicate_flutterwave_delivery_settles_exactly_once() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "savanna-run", 50_000, "KES").await;

    h.store
        .upsert_pending_purchase(&user, &app.id, 50_000, &app.currency, ProviderId::Flutterwave)
        .await
        .unwrap();

    mount_flw_verify(&h.flutterwave_mock, 9921, "successful", 500.0, "KES").await;
    let body = flw_charge_payload(9921, "successful", app.id, user, 500.0, "KES");

    for _ in 0..2 {
        let response = h
            .server
            .post("/webhooks/flutterwave")
            .add_header("verif-hash", FLW_WEBHOOK_SECRET)
            .text(body.clone())
            .await;
        response.assert_status_ok();
    }

    let app_after = h.store.get_app(&app.id).await.unwrap().unwrap();
    assert_eq!(app_after.downloads, 1);
    assert_eq!(app_after.revenue_minor, 35_000);
    assert_eq!(h.store.list_ledger_for_app(&app.id, 10).await.unwrap().len(), 1);

    let purchase = h.store.get_purchase(&user, &app.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Completed);
}

#[tokio::test]
async fn invalid_flutterwave_hash_is_rejected_with_no_writes() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "savanna-run", 50_000, "KES").await;

    let body = flw_charge_payload(9921, "successful", app.id, user, 500.0, "KES");

    let response = h
        .server
        .post("/webhooks/flutterwave")
        .add_header("verif-hash", "guessed-secret")
        .text(body)
        .await;

    response.assert_status_unauthorized();

    // Zero state change, and the provider was never contacted.
    assert!(h.store.get_purchase(&user, &app.id).await.unwrap().is_none());
    assert!(h.store.list_ledger_for_app(&app.id, 10).await.unwrap().is_empty());
    let app_after = h.store.get_app(&app.id).await.unwrap().unwrap();
    assert_eq!(app_after.downloads, 0);
    assert_eq!(app_after.revenue_minor, 0);
    assert!(h.flutterwave_mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_flutterwave_hash_is_rejected() {
    let h = harness().await;
    let body = json!({"event": "charge.completed", "data": {}}).to_string();

    let response = h.server.post("/webhooks/flutterwave").text(body).await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn tampered_stripe_signature_is_rejected_with_no_writes() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "beat-blade", 999, "USD").await;

    let body = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_forged",
            "payment_status": "paid",
            "amount_total": 999,
            "currency": "usd",
            "metadata": { "app_id": app.id.to_string(), "user_id": user.to_string() }
        }}
    })
    .to_string();

    let response = h
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", "t=1700000000,v1=deadbeef")
        .text(body)
        .await;

    response.assert_status_unauthorized();
    assert!(h.store.get_purchase(&user, &app.id).await.unwrap().is_none());
    assert!(h.store.list_ledger_for_app(&app.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_event_after_completion_is_absorbed() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "savanna-run", 50_000, "KES").await;

    mount_flw_verify(&h.flutterwave_mock, 9921, "successful", 500.0, "KES").await;

    let completed = flw_charge_payload(9921, "successful", app.id, user, 500.0, "KES");
    let response = h
        .server
        .post("/webhooks/flutterwave")
        .add_header("verif-hash", FLW_WEBHOOK_SECRET)
        .text(completed)
        .await;
    response.assert_status_ok();

    // A late failure event for the same purchase must not regress it.
    let failed = flw_charge_payload(9922, "failed", app.id, user, 500.0, "KES");
    let response = h
        .server
        .post("/webhooks/flutterwave")
        .add_header("verif-hash", FLW_WEBHOOK_SECRET)
        .text(failed)
        .await;
    response.assert_status_ok();

    let purchase = h.store.get_purchase(&user, &app.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Completed);
}

#[tokio::test]
async fn failed_event_transitions_a_pending_purchase() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "savanna-run", 50_000, "KES").await;

    h.store
        .upsert_pending_purchase(&user, &app.id, 50_000, &app.currency, ProviderId::Flutterwave)
        .await
        .unwrap();

    let failed = flw_charge_payload(9923, "failed", app.id, user, 500.0, "KES");
    let response = h
        .server
        .post("/webhooks/flutterwave")
        .add_header("verif-hash", FLW_WEBHOOK_SECRET)
        .text(failed)
        .await;
    response.assert_status_ok();

    let purchase = h.store.get_purchase(&user, &app.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Failed);

    let response = h
        .server
        .post("/v1/library/ownership")
        .add_header(AUTHORIZATION, auth_header(&user))
        .json(&json!({ "app_slug": "savanna-run" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["owned"], false);
}

#[tokio::test]
async fn unconfirmed_transactions_do_not_settle() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "savanna-run", 50_000, "KES").await;

    h.store
        .upsert_pending_purchase(&user, &app.id, 50_000, &app.currency, ProviderId::Flutterwave)
        .await
        .unwrap();

    // The payload claims success, but the provider's own record says the
    // charge failed (replay of a superseded state).
    mount_flw_verify(&h.flutterwave_mock, 9930, "failed", 500.0, "KES").await;
    let body = flw_charge_payload(9930, "successful", app.id, user, 500.0, "KES");

    let response = h
        .server
        .post("/webhooks/flutterwave")
        .add_header("verif-hash", FLW_WEBHOOK_SECRET)
        .text(body)
        .await;
    response.assert_status_ok();

    assert!(h.store.list_ledger_for_app(&app.id, 10).await.unwrap().is_empty());
    let purchase = h.store.get_purchase(&user, &app.id).await.unwrap().unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Pending);
}

#[tokio::test]
async fn stripe_verification_failure_returns_5xx_for_redelivery() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "beat-blade", 999, "USD").await;

    // The session retrieve blows up; under the Stripe ack policy that is a
    // 5xx so Stripe redelivers later.
    Mock::given(method("GET"))
        .and(path("/checkout/sessions/cs_test_down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.stripe_mock)
        .await;

    let body = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_test_down",
            "payment_status": "paid",
            "amount_total": 999,
            "currency": "usd",
            "metadata": {
                "app_id": app.id.to_string(),
                "user_id": user.to_string(),
                "platform_fee_minor": "299",
                "developer_amount_minor": "700"
            }
        }}
    })
    .to_string();

    let response = h
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signed_header(&body))
        .text(body)
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.store.list_ledger_for_app(&app.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn flutterwave_verification_failure_is_acked_and_logged() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "savanna-run", 50_000, "KES").await;

    // No verify double mounted: the lookup fails. Flutterwave's ack policy
    // still answers 200 so the hook is not disabled by retry storms.
    let body = flw_charge_payload(9940, "successful", app.id, user, 500.0, "KES");
    let response = h
        .server
        .post("/webhooks/flutterwave")
        .add_header("verif-hash", FLW_WEBHOOK_SECRET)
        .text(body)
        .await;

    response.assert_status_ok();
    assert!(h.store.list_ledger_for_app(&app.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn stripe_refund_is_recorded_without_touching_counters() {
    let h = harness().await;
    let user = UserId::generate();
    let app = seed_app(&h.store, "beat-blade", 999, "USD").await;

    mount_stripe_settlement(&h, &app, &user).await;

    let body = json!({
        "id": "evt_2",
        "type": "charge.refunded",
        "data": {"object": {
            "id": "ch_1",
            "amount_refunded": 999,
            "currency": "usd",
            "refunds": {"data": [{"id": "re_1"}]},
            "metadata": {
                "app_id": app.id.to_string(),
                "user_id": user.to_string()
            }
        }}
    })
    .to_string();

    let response = h
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signed_header(&body))
        .text(body)
        .await;
    response.assert_status_ok();

    let ledger = h.store.list_ledger_for_app(&app.id, 10).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().any(|e| e.provider_ref == "re_1"));

    // Clawback is deferred to payout reconciliation.
    let app_after = h.store.get_app(&app.id).await.unwrap().unwrap();
    assert_eq!(app_after.revenue_minor, 700);
    assert_eq!(app_after.downloads, 1);
}

#[tokio::test]
async fn account_updated_flips_the_payout_flag() {
    let h = harness().await;
    let developer = portal_market_core::DeveloperId::generate();
    h.store
        .put_developer_account(&DeveloperAccount::new(
            developer,
            ProviderId::Stripe,
            "acct_9".into(),
        ))
        .await
        .unwrap();

    let body = json!({
        "id": "evt_3",
        "type": "account.updated",
        "data": {"object": {"id": "acct_9", "payouts_enabled": true}}
    })
    .to_string();

    let response = h
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signed_header(&body))
        .text(body)
        .await;
    response.assert_status_ok();

    let account = h
        .store
        .get_developer_account(&developer, ProviderId::Stripe)
        .await
        .unwrap()
        .unwrap();
    assert!(account.payouts_enabled);
}

/// Settle one Stripe purchase through the webhook path, so later events
/// have completed state to act against.
async fn mount_stripe_settlement(
    h: &common::Harness,
    app: &portal_market_core::AppListing,
    user: &UserId,
) {
    Mock::given(method("GET"))
        .and(path("/checkout/sessions/cs_settled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_settled",
            "payment_status": "paid",
            "amount_total": 999,
            "currency": "usd"
        })))
        .mount(&h.stripe_mock)
        .await;

    let body = json!({
        "id": "evt_settle",
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_settled",
            "payment_status": "paid",
            "amount_total": 999,
            "currency": "usd",
            "metadata": {
                "app_id": app.id.to_string(),
                "user_id": user.to_string(),
                "platform_fee_minor": "299",
                "developer_amount_minor": "700"
            }
        }}
    })
    .to_string();

    let response = h
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", stripe_signed_header(&body))
        .text(body)
        .await;
    response.assert_status_ok();
}
