//! Stripe API client.

use std::time::Duration;

use async_trait::async_trait;

use portal_market_core::{AppId, Currency, ProviderId, UserId};

use super::types::{AccountLink, CheckoutSession, ConnectAccount, StripeErrorResponse, WebhookEvent};
use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::providers::{
    CheckoutIntent, CompletedPayment, GatewayEvent, GatewaySession, PaymentGateway, ProviderError,
    SubmerchantAccount, SubmerchantRequest, VerifiedPayment,
};

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    webhook_secret: Option<String>,
}

impl StripeClient {
    /// Stripe API base URL.
    const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a client against the live Stripe API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: Option<String>,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, webhook_secret, Self::BASE_URL)
    }

    /// Create a client against a custom base URL (test doubles).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        webhook_secret: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            webhook_secret,
        })
    }

    /// Create a Checkout session for purchasing an app.
    ///
    /// The split and purchase identity ride along as metadata on both the
    /// session and its payment intent, so every later webhook (completion,
    /// failure, refund) can be correlated back to the purchase.
    ///
    /// # Errors
    ///
    /// Returns an error if Stripe rejects or the call fails.
    pub async fn create_checkout_session(
        &self,
        intent: &CheckoutIntent,
    ) -> Result<CheckoutSession, ProviderError> {
        let currency = intent.currency.as_str().to_ascii_lowercase();

        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".to_string()),
            ("success_url".into(), intent.success_url.clone()),
            ("cancel_url".into(), intent.cancel_url.clone()),
            ("client_reference_id".into(), intent.user_id.to_string()),
            ("line_items[0][price_data][currency]".into(), currency),
            (
                "line_items[0][price_data][product_data][name]".into(),
                intent.app_title.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                intent.amount_minor.to_string(),
            ),
            ("line_items[0][quantity]".into(), "1".to_string()),
        ];

        // The same correlation metadata goes on the session and on its
        // payment intent, so failure and refund events can find the
        // purchase too.
        let metadata = [
            ("app_id", intent.app_id.to_string()),
            ("user_id", intent.user_id.to_string()),
            ("tx_ref", intent.tx_ref.clone()),
            ("platform_fee_minor", intent.split.platform_fee_minor.to_string()),
            (
                "developer_amount_minor",
                intent.split.developer_amount_minor.to_string(),
            ),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
            params.push((format!("payment_intent_data[metadata][{key}]"), value));
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Retrieve a Checkout session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if Stripe rejects or the call fails.
    pub async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", self.base_url, session_id))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create an Express Connect account for a developer.
    ///
    /// # Errors
    ///
    /// Returns an error if Stripe rejects or the call fails.
    pub async fn create_connect_account(
        &self,
        email: &str,
        country: &str,
    ) -> Result<ConnectAccount, ProviderError> {
        let params = [
            ("type", "express"),
            ("email", email),
            ("country", country),
            ("capabilities[transfers][requested]", "true"),
        ];

        let response = self
            .client
            .post(format!("{}/accounts", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create a hosted onboarding link for a Connect account.
    ///
    /// # Errors
    ///
    /// Returns an error if Stripe rejects or the call fails.
    pub async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<AccountLink, ProviderError> {
        let params = [
            ("account", account_id),
            ("refresh_url", refresh_url),
            ("return_url", return_url),
            ("type", "account_onboarding"),
        ];

        let response = self
            .client
            .post(format!("{}/account_links", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Verify a `stripe-signature` header against the raw request body.
    ///
    /// Header format: `t=<unix>,v1=<hex>[,v1=<hex>...]`; the signed message
    /// is `"{t}.{raw_body}"`. The body must be the bytes on the wire — a
    /// re-serialized parse will not verify.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Configuration`] without a webhook secret;
    /// [`ProviderError::InvalidSignature`] on mismatch.
    pub fn verify_webhook_signature(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<(), ProviderError> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or_else(|| ProviderError::Configuration("Stripe webhook secret not set".into()))?;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            let mut kv = part.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("t"), Some(ts)) => timestamp = Some(ts),
                (Some("v1"), Some(sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(ProviderError::InvalidSignature)?;
        if signatures.is_empty() {
            return Err(ProviderError::InvalidSignature);
        }

        let signed_payload = format!("{timestamp}.{payload}");
        let expected = hmac_sha256_hex(secret, &signed_payload);

        if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
            Ok(())
        } else {
            Err(ProviderError::InvalidSignature)
        }
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = match response.json::<StripeErrorResponse>().await {
            Ok(body) => body
                .error
                .message
                .unwrap_or_else(|| format!("HTTP {status}")),
            Err(_) => format!("HTTP {status}"),
        };

        Err(ProviderError::Api {
            provider: ProviderId::Stripe,
            message,
        })
    }
}

// ============================================================================
// Webhook payload field access
// ============================================================================

fn object_str<'a>(object: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(|v| v.as_str())
}

fn meta_str<'a>(object: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    object.get("metadata").and_then(|m| m.get(key)).and_then(|v| v.as_str())
}

fn meta_i64(object: &serde_json::Value, key: &str) -> Option<i64> {
    meta_str(object, key).and_then(|s| s.parse().ok())
}

fn require_purchase_identity(
    object: &serde_json::Value,
) -> Result<(AppId, UserId), ProviderError> {
    let app_id = meta_str(object, "app_id")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProviderError::InvalidPayload("missing metadata.app_id".into()))?;
    let user_id = meta_str(object, "user_id")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProviderError::InvalidPayload("missing metadata.user_id".into()))?;
    Ok((app_id, user_id))
}

#[async_trait]
impl PaymentGateway for StripeClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Stripe
    }

    async fn create_checkout(
        &self,
        intent: &CheckoutIntent,
    ) -> Result<GatewaySession, ProviderError> {
        let session = self.create_checkout_session(intent).await?;

        let url = session.url.ok_or_else(|| ProviderError::Api {
            provider: ProviderId::Stripe,
            message: "checkout session has no URL".into(),
        })?;

        Ok(GatewaySession {
            provider: ProviderId::Stripe,
            url,
            session_id: Some(session.id),
            tx_ref: Some(intent.tx_ref.clone()),
        })
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedPayment, ProviderError> {
        let session = self.get_checkout_session(reference).await?;

        Ok(VerifiedPayment {
            reference: session.id,
            amount_minor: session.amount_total.unwrap_or(0),
            currency: Currency::new(session.currency.as_deref().unwrap_or("")),
            settled: session.payment_status.as_deref() == Some("paid"),
        })
    }

    fn construct_webhook_event(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> Result<GatewayEvent, ProviderError> {
        let signature = signature.ok_or(ProviderError::InvalidSignature)?;
        self.verify_webhook_signature(body, signature)?;

        let event: WebhookEvent = serde_json::from_str(body)
            .map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;
        let object = &event.data.object;

        match event.event_type.as_str() {
            "checkout.session.completed" => {
                if object_str(object, "payment_status") != Some("paid") {
                    return Ok(GatewayEvent::Ignored {
                        kind: "checkout.session.completed (unpaid)".into(),
                    });
                }

                let (app_id, user_id) = require_purchase_identity(object)?;
                let session_id = object_str(object, "id")
                    .ok_or_else(|| ProviderError::InvalidPayload("missing session id".into()))?
                    .to_string();
                let amount_minor = object
                    .get("amount_total")
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0);
                let currency = Currency::new(object_str(object, "currency").unwrap_or(""));

                Ok(GatewayEvent::PaymentCompleted(CompletedPayment {
                    provider: ProviderId::Stripe,
                    reference: session_id.clone(),
                    verify_ref: session_id,
                    app_id,
                    user_id,
                    amount_minor,
                    currency,
                    platform_fee_minor: meta_i64(object, "platform_fee_minor").unwrap_or(0),
                    developer_amount_minor: meta_i64(object, "developer_amount_minor")
                        .unwrap_or(0),
                }))
            }
            "payment_intent.payment_failed" => {
                // Without our echoed metadata there is no purchase to match.
                match require_purchase_identity(object) {
                    Ok((app_id, user_id)) => Ok(GatewayEvent::PaymentFailed {
                        app_id,
                        user_id,
                        reference: object_str(object, "id").unwrap_or_default().to_string(),
                    }),
                    Err(_) => Ok(GatewayEvent::Ignored {
                        kind: "payment_intent.payment_failed (no metadata)".into(),
                    }),
                }
            }
            "charge.refunded" => {
                let charge_id = object_str(object, "id").unwrap_or_default().to_string();
                let refund_ref = object
                    .get("refunds")
                    .and_then(|r| r.get("data"))
                    .and_then(|d| d.get(0))
                    .and_then(|r| r.get("id"))
                    .and_then(|v| v.as_str())
                    .map_or_else(|| format!("{charge_id}_refund"), ToString::to_string);

                Ok(GatewayEvent::Refunded {
                    reference: refund_ref,
                    app_id: meta_str(object, "app_id").and_then(|s| s.parse().ok()),
                    user_id: meta_str(object, "user_id").and_then(|s| s.parse().ok()),
                    amount_minor: object
                        .get("amount_refunded")
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(0),
                    currency: Currency::new(object_str(object, "currency").unwrap_or("")),
                })
            }
            "account.updated" => {
                let account_id = object_str(object, "id")
                    .ok_or_else(|| ProviderError::InvalidPayload("missing account id".into()))?
                    .to_string();
                Ok(GatewayEvent::PayoutAccountUpdated {
                    provider_account_id: account_id,
                    payouts_enabled: object
                        .get("payouts_enabled")
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false),
                })
            }
            other => Ok(GatewayEvent::Ignored { kind: other.to_string() }),
        }
    }

    async fn create_submerchant(
        &self,
        request: &SubmerchantRequest,
    ) -> Result<SubmerchantAccount, ProviderError> {
        let account = self
            .create_connect_account(&request.email, &request.country)
            .await?;

        let onboarding_url = self
            .create_account_link(
                &account.id,
                "https://portalmarket.dev/developers/payouts/refresh",
                "https://portalmarket.dev/developers/payouts/complete",
            )
            .await
            .map(|link| link.url)
            .ok();

        Ok(SubmerchantAccount {
            provider: ProviderId::Stripe,
            account_id: account.id,
            onboarding_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> StripeClient {
        StripeClient::new("sk_test_xxx", Some("whsec_test".to_string())).unwrap()
    }

    fn signed_header(secret: &str, body: &str, timestamp: &str) -> String {
        let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{body}"));
        format!("t={timestamp},v1={expected}")
    }

    #[test]
    fn valid_signature_verifies() {
        let client = test_client();
        let body = r#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = signed_header("whsec_test", body, "1700000000");
        assert!(client.verify_webhook_signature(body, &header).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let client = test_client();
        let body = r#"{"id":"evt_1"}"#;
        let header = signed_header("whsec_other", body, "1700000000");
        assert!(matches!(
            client.verify_webhook_signature(body, &header),
            Err(ProviderError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let client = test_client();
        let header = signed_header("whsec_test", r#"{"amount":100}"#, "1700000000");
        assert!(matches!(
            client.verify_webhook_signature(r#"{"amount":999}"#, &header),
            Err(ProviderError::InvalidSignature)
        ));
    }

    #[test]
    fn header_without_v1_is_rejected() {
        let client = test_client();
        assert!(matches!(
            client.verify_webhook_signature("{}", "t=1700000000"),
            Err(ProviderError::InvalidSignature)
        ));
    }

    #[test]
    fn missing_webhook_secret_is_a_configuration_error() {
        let client = StripeClient::new("sk_test_xxx", None).unwrap();
        assert!(matches!(
            client.verify_webhook_signature("{}", "t=1,v1=aa"),
            Err(ProviderError::Configuration(_))
        ));
    }

    #[test]
    fn completed_session_event_normalizes() {
        let client = test_client();
        let app_id = AppId::generate();
        let user_id = UserId::generate();
        let body = serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_1",
                "payment_status": "paid",
                "amount_total": 999,
                "currency": "usd",
                "metadata": {
                    "app_id": app_id.to_string(),
                    "user_id": user_id.to_string(),
                    "platform_fee_minor": "299",
                    "developer_amount_minor": "700"
                }
            }}
        })
        .to_string();
        let header = signed_header("whsec_test", &body, "1700000000");

        let event = client.construct_webhook_event(&body, Some(&header)).unwrap();
        match event {
            GatewayEvent::PaymentCompleted(completed) => {
                assert_eq!(completed.reference, "cs_test_1");
                assert_eq!(completed.app_id, app_id);
                assert_eq!(completed.user_id, user_id);
                assert_eq!(completed.amount_minor, 999);
                assert_eq!(completed.platform_fee_minor, 299);
                assert_eq!(completed.developer_amount_minor, 700);
                assert_eq!(completed.currency.as_str(), "USD");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unpaid_session_is_ignored() {
        let client = test_client();
        let body = serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_1", "payment_status": "unpaid"}}
        })
        .to_string();
        let header = signed_header("whsec_test", &body, "1700000000");

        assert!(matches!(
            client.construct_webhook_event(&body, Some(&header)).unwrap(),
            GatewayEvent::Ignored { .. }
        ));
    }

    #[test]
    fn missing_signature_header_is_unauthorized() {
        let client = test_client();
        assert!(matches!(
            client.construct_webhook_event("{}", None),
            Err(ProviderError::InvalidSignature)
        ));
    }
}
