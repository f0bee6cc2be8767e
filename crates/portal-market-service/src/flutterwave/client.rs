//! Flutterwave API client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use portal_market_core::{Currency, ProviderId};

use super::types::{FlwResponse, FlwTransaction, FlwWebhook, PaymentLink, Subaccount};
use crate::crypto::constant_time_eq;
use crate::providers::{
    CheckoutIntent, CompletedPayment, GatewayEvent, GatewaySession, PaymentGateway, ProviderError,
    SubmerchantAccount, SubmerchantRequest, VerifiedPayment,
};

/// Convert a Flutterwave major-unit amount to minor units.
#[allow(clippy::cast_possible_truncation)]
fn to_minor(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert minor units to the major-unit amount Flutterwave expects.
#[allow(clippy::cast_precision_loss)]
fn to_major(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}

/// Flutterwave API client.
#[derive(Debug, Clone)]
pub struct FlutterwaveClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    webhook_secret: Option<String>,
}

impl FlutterwaveClient {
    /// Flutterwave API base URL.
    const BASE_URL: &'static str = "https://api.flutterwave.com/v3";

    /// Create a client against the live Flutterwave API.
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

    /// Create a hosted payment session and return its link.
    ///
    /// # Errors
    ///
    /// Returns an error if Flutterwave rejects or the call fails.
    pub async fn create_payment(
        &self,
        intent: &CheckoutIntent,
    ) -> Result<PaymentLink, ProviderError> {
        let mut body = json!({
            "tx_ref": intent.tx_ref,
            "amount": to_major(intent.amount_minor),
            "currency": intent.currency.as_str(),
            "redirect_url": intent.success_url,
            "customer": {
                "email": intent.customer_email.as_deref().unwrap_or("buyer@portalmarket.dev"),
            },
            "customizations": {
                "title": intent.app_title,
            },
            "meta": {
                "app_id": intent.app_id.to_string(),
                "user_id": intent.user_id.to_string(),
                "tx_ref": intent.tx_ref,
                "platform_fee_minor": intent.split.platform_fee_minor.to_string(),
                "developer_amount_minor": intent.split.developer_amount_minor.to_string(),
            },
        });

        if let Some(phone) = &intent.phone_number {
            body["customer"]["phonenumber"] = json!(phone);
        }
        if let Some(method) = &intent.payment_method {
            body["payment_options"] = json!(method);
        }

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Ask Flutterwave to verify a transaction by its numeric id.
    ///
    /// # Errors
    ///
    /// Returns an error if Flutterwave rejects or the call fails.
    pub async fn verify_transaction_by_id(
        &self,
        transaction_id: &str,
    ) -> Result<FlwTransaction, ProviderError> {
        let response = self
            .client
            .get(format!(
                "{}/transactions/{}/verify",
                self.base_url, transaction_id
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create a subaccount for routing a developer's split.
    ///
    /// # Errors
    ///
    /// Returns an error if Flutterwave rejects or the call fails.
    pub async fn create_subaccount(
        &self,
        request: &SubmerchantRequest,
    ) -> Result<Subaccount, ProviderError> {
        let body = json!({
            "account_bank": request.bank_code,
            "account_number": request.account_number,
            "business_name": request.business_name,
            "business_email": request.email,
            "country": request.country,
            "split_type": "percentage",
            // The subaccount keeps the developer share of each charge.
            "split_value": 0.7,
        });

        let response = self
            .client
            .post(format!("{}/subaccounts", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Check a `verif-hash` header against the configured secret.
    ///
    /// Flutterwave does not sign payloads; it sends the shared secret hash
    /// verbatim in the header, so authentication is a constant-time
    /// equality check.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Configuration`] without a webhook secret;
    /// [`ProviderError::InvalidSignature`] on mismatch.
    pub fn verify_webhook_hash(&self, signature: &str) -> Result<(), ProviderError> {
        let secret = self.webhook_secret.as_ref().ok_or_else(|| {
            ProviderError::Configuration("Flutterwave webhook secret not set".into())
        })?;

        if constant_time_eq(signature, secret) {
            Ok(())
        } else {
            Err(ProviderError::InvalidSignature)
        }
    }

    /// Unwrap the Flutterwave response envelope and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<FlwResponse<serde_json::Value>>()
                .await
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| format!("HTTP {status}"));

            return Err(ProviderError::Api {
                provider: ProviderId::Flutterwave,
                message,
            });
        }

        let envelope: FlwResponse<T> = response.json().await?;

        if envelope.status != "success" {
            return Err(ProviderError::Api {
                provider: ProviderId::Flutterwave,
                message: envelope.message.unwrap_or_else(|| "request failed".into()),
            });
        }

        envelope.data.ok_or_else(|| ProviderError::Api {
            provider: ProviderId::Flutterwave,
            message: "response has no data".into(),
        })
    }
}

// ============================================================================
// Webhook payload field access
// ============================================================================

fn data_str<'a>(data: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(|v| v.as_str())
}

fn meta_str<'a>(data: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    data.get("meta").and_then(|m| m.get(key)).and_then(|v| v.as_str())
}

fn meta_i64(data: &serde_json::Value, key: &str) -> Option<i64> {
    data.get("meta")
        .and_then(|m| m.get(key))
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
}

#[async_trait]
impl PaymentGateway for FlutterwaveClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Flutterwave
    }

    async fn create_checkout(
        &self,
        intent: &CheckoutIntent,
    ) -> Result<GatewaySession, ProviderError> {
        let payment = self.create_payment(intent).await?;

        Ok(GatewaySession {
            provider: ProviderId::Flutterwave,
            url: payment.link,
            session_id: None,
            tx_ref: Some(intent.tx_ref.clone()),
        })
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedPayment, ProviderError> {
        let tx = self.verify_transaction_by_id(reference).await?;

        Ok(VerifiedPayment {
            reference: tx.id.to_string(),
            amount_minor: to_minor(tx.amount),
            currency: Currency::new(&tx.currency),
            settled: tx.status == "successful",
        })
    }

    fn construct_webhook_event(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> Result<GatewayEvent, ProviderError> {
        let signature = signature.ok_or(ProviderError::InvalidSignature)?;
        self.verify_webhook_hash(signature)?;

        let webhook: FlwWebhook = serde_json::from_str(body)
            .map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;
        let data = &webhook.data;

        if webhook.event != "charge.completed" {
            return Ok(GatewayEvent::Ignored { kind: webhook.event });
        }

        let transaction_id = data
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| ProviderError::InvalidPayload("missing data.id".into()))?;
        let app_id = meta_str(data, "app_id")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProviderError::InvalidPayload("missing meta.app_id".into()))?;
        let user_id = meta_str(data, "user_id")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProviderError::InvalidPayload("missing meta.user_id".into()))?;

        match data_str(data, "status") {
            Some("successful") => Ok(GatewayEvent::PaymentCompleted(CompletedPayment {
                provider: ProviderId::Flutterwave,
                reference: transaction_id.to_string(),
                verify_ref: transaction_id.to_string(),
                app_id,
                user_id,
                amount_minor: data
                    .get("amount")
                    .and_then(serde_json::Value::as_f64)
                    .map_or(0, to_minor),
                currency: Currency::new(data_str(data, "currency").unwrap_or("")),
                platform_fee_minor: meta_i64(data, "platform_fee_minor").unwrap_or(0),
                developer_amount_minor: meta_i64(data, "developer_amount_minor").unwrap_or(0),
            })),
            Some("failed") => Ok(GatewayEvent::PaymentFailed {
                app_id,
                user_id,
                reference: transaction_id.to_string(),
            }),
            other => Ok(GatewayEvent::Ignored {
                kind: format!("charge.completed ({})", other.unwrap_or("no status")),
            }),
        }
    }

    async fn create_submerchant(
        &self,
        request: &SubmerchantRequest,
    ) -> Result<SubmerchantAccount, ProviderError> {
        let subaccount = self.create_subaccount(request).await?;

        Ok(SubmerchantAccount {
            provider: ProviderId::Flutterwave,
            account_id: subaccount.subaccount_id,
            onboarding_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_market_core::{AppId, UserId};

    fn test_client() -> FlutterwaveClient {
        FlutterwaveClient::new("FLWSECK_TEST-xxx", Some("fw-hook-secret".to_string())).unwrap()
    }

    fn completed_body(app_id: AppId, user_id: UserId, status: &str) -> String {
        serde_json::json!({
            "event": "charge.completed",
            "data": {
                "id": 4_276_551,
                "tx_ref": "pm-11111111-2222-3333-4444-555555555555",
                "amount": 500.0,
                "currency": "KES",
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

    #[test]
    fn matching_hash_authenticates() {
        let client = test_client();
        assert!(client.verify_webhook_hash("fw-hook-secret").is_ok());
    }

    #[test]
    fn wrong_hash_is_rejected() {
        let client = test_client();
        assert!(matches!(
            client.verify_webhook_hash("guessed-secret"),
            Err(ProviderError::InvalidSignature)
        ));
    }

    #[test]
    fn successful_charge_normalizes_with_minor_units() {
        let client = test_client();
        let app_id = AppId::generate();
        let user_id = UserId::generate();
        let body = completed_body(app_id, user_id, "successful");

        let event = client
            .construct_webhook_event(&body, Some("fw-hook-secret"))
            .unwrap();
        match event {
            GatewayEvent::PaymentCompleted(completed) => {
                assert_eq!(completed.reference, "4276551");
                assert_eq!(completed.amount_minor, 50_000);
                assert_eq!(completed.currency.as_str(), "KES");
                assert_eq!(completed.app_id, app_id);
                assert_eq!(completed.platform_fee_minor, 15_000);
                assert_eq!(completed.developer_amount_minor, 35_000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn failed_charge_normalizes_to_payment_failed() {
        let client = test_client();
        let body = completed_body(AppId::generate(), UserId::generate(), "failed");

        assert!(matches!(
            client
                .construct_webhook_event(&body, Some("fw-hook-secret"))
                .unwrap(),
            GatewayEvent::PaymentFailed { .. }
        ));
    }

    #[test]
    fn transfer_events_are_ignored() {
        let client = test_client();
        let body = serde_json::json!({"event": "transfer.completed", "data": {}}).to_string();

        assert!(matches!(
            client
                .construct_webhook_event(&body, Some("fw-hook-secret"))
                .unwrap(),
            GatewayEvent::Ignored { .. }
        ));
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let client = test_client();
        assert!(matches!(
            client.construct_webhook_event("{}", None),
            Err(ProviderError::InvalidSignature)
        ));
    }

    #[test]
    fn major_minor_conversion_roundtrips() {
        assert_eq!(to_minor(500.0), 50_000);
        assert_eq!(to_minor(9.99), 999);
        assert!((to_major(999) - 9.99).abs() < f64::EPSILON);
    }
}
