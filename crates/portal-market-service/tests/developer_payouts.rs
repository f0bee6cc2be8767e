//! Developer payout account onboarding tests.

mod common;

use axum::http::header::AUTHORIZATION;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{auth_header, harness};
use portal_market_core::{DeveloperId, ProviderId, UserId};
use portal_market_store::Store;

#[tokio::test]
async fn stripe_payout_account_is_created_and_persisted() {
    let h = harness().await;
    let user = UserId::generate();

    Mock::given(method("POST"))
        .and(path("/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "acct_42",
            "payouts_enabled": false
        })))
        .expect(1)
        .mount(&h.stripe_mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/account_links"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://connect.stripe.com/setup/e/acct_42"
        })))
        .mount(&h.stripe_mock)
        .await;

    let response = h
        .server
        .post("/v1/developers/payout-account")
        .add_header(AUTHORIZATION, auth_header(&user))
        .json(&json!({
            "provider": "STRIPE",
            "email": "dev@example.com",
            "business_name": "Beat Blade Studio",
            "country": "US"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["provider"], "STRIPE");
    assert_eq!(body["account_id"], "acct_42");
    assert_eq!(body["payouts_enabled"], false);
    assert!(body["onboarding_url"].as_str().unwrap().contains("connect.stripe.com"));

    let developer = DeveloperId::from_uuid(*user.as_uuid());
    let account = h
        .store
        .get_developer_account(&developer, ProviderId::Stripe)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.provider_account_id, "acct_42");
    assert!(!account.payouts_enabled);
}

#[tokio::test]
async fn flutterwave_subaccount_requires_bank_details() {
    let h = harness().await;
    let user = UserId::generate();

    let response = h
        .server
        .post("/v1/developers/payout-account")
        .add_header(AUTHORIZATION, auth_header(&user))
        .json(&json!({
            "provider": "FLUTTERWAVE",
            "email": "dev@example.com",
            "business_name": "Savanna Interactive",
            "country": "KE"
        }))
        .await;

    response.assert_status_bad_request();
    assert!(h.flutterwave_mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn flutterwave_subaccount_is_created_with_bank_details() {
    let h = harness().await;
    let user = UserId::generate();

    Mock::given(method("POST"))
        .and(path("/subaccounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Subaccount created",
            "data": { "id": 123, "subaccount_id": "RS_99X" }
        })))
        .expect(1)
        .mount(&h.flutterwave_mock)
        .await;

    let response = h
        .server
        .post("/v1/developers/payout-account")
        .add_header(AUTHORIZATION, auth_header(&user))
        .json(&json!({
            "provider": "FLUTTERWAVE",
            "email": "dev@example.com",
            "business_name": "Savanna Interactive",
            "country": "KE",
            "bank_code": "044",
            "account_number": "0690000040"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["provider"], "FLUTTERWAVE");
    assert_eq!(body["account_id"], "RS_99X");
    assert!(body.get("onboarding_url").is_none());
}
