//! Shared integration test harness.
//!
//! Wires the router to a `MemoryStore` and points both provider clients at
//! wiremock doubles, so full checkout and webhook flows run without
//! touching real provider APIs.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::Utc;
use wiremock::MockServer;

use portal_market_core::{AppId, AppListing, AppStatus, Currency, DeveloperId, UserId};
use portal_market_service::crypto::hmac_sha256_hex;
use portal_market_service::{create_router, AppState, FlutterwaveClient, ServiceConfig, StripeClient};
use portal_market_store::{MemoryStore, Store};

/// Stripe webhook signing secret used by the harness.
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Flutterwave `verif-hash` shared secret used by the harness.
pub const FLW_WEBHOOK_SECRET: &str = "flw-test-hash";

/// A running test server with its store and provider doubles.
pub struct Harness {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub stripe_mock: MockServer,
    pub flutterwave_mock: MockServer,
}

/// Build the full stack against mock providers.
pub async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let stripe_mock = MockServer::start().await;
    let flutterwave_mock = MockServer::start().await;

    let config = ServiceConfig {
        allow_test_tokens: true,
        stripe_api_key: Some("sk_test_xxx".into()),
        stripe_webhook_secret: Some(STRIPE_WEBHOOK_SECRET.into()),
        flutterwave_api_key: Some("FLWSECK_TEST-xxx".into()),
        flutterwave_webhook_secret: Some(FLW_WEBHOOK_SECRET.into()),
        ..ServiceConfig::default()
    };

    let stripe = StripeClient::with_base_url(
        "sk_test_xxx",
        Some(STRIPE_WEBHOOK_SECRET.to_string()),
        stripe_mock.uri(),
    )
    .expect("Failed to build Stripe client");
    let flutterwave = FlutterwaveClient::with_base_url(
        "FLWSECK_TEST-xxx",
        Some(FLW_WEBHOOK_SECRET.to_string()),
        flutterwave_mock.uri(),
    )
    .expect("Failed to build Flutterwave client");

    let state = AppState::with_clients(
        store.clone(),
        config,
        Some(Arc::new(stripe)),
        Some(Arc::new(flutterwave)),
    );

    let server = TestServer::new(create_router(state)).expect("Failed to create test server");

    Harness {
        server,
        store,
        stripe_mock,
        flutterwave_mock,
    }
}

/// Seed a published app listing.
pub async fn seed_app(
    store: &MemoryStore,
    slug: &str,
    price_minor: i64,
    currency: &str,
) -> AppListing {
    let app = AppListing {
        id: AppId::generate(),
        slug: slug.to_string(),
        title: format!("{slug} (VR)"),
        developer_id: DeveloperId::generate(),
        price_minor,
        currency: Currency::new(currency),
        status: AppStatus::Published,
        revenue_minor: 0,
        downloads: 0,
        created_at: Utc::now(),
    };
    store.put_app(&app).await.expect("Failed to seed app");
    app
}

/// Bearer auth header value for a user.
pub fn auth_header(user_id: &UserId) -> String {
    format!("Bearer test-token:{user_id}")
}

/// A valid `stripe-signature` header for a body.
pub fn stripe_signed_header(body: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let signature = hmac_sha256_hex(STRIPE_WEBHOOK_SECRET, &format!("{timestamp}.{body}"));
    format!("t={timestamp},v1={signature}")
}
