//! The uniform payment provider interface.
//!
//! Both processors expose the same four capabilities behind
//! [`PaymentGateway`]: create a hosted checkout, independently verify a
//! transaction, authenticate-and-normalize a webhook delivery, and create a
//! sub-merchant account for developer payouts. The Provider Selector picks
//! a gateway once per request; handlers thread it explicitly instead of
//! re-dispatching on provider names.

use async_trait::async_trait;

use portal_market_core::{AppId, Currency, ProviderId, RevenueSplit, UserId};

/// Errors from provider clients.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider API returned an error.
    #[error("{provider} API error: {message}")]
    Api {
        /// Which provider answered.
        provider: ProviderId,
        /// Provider-reported message.
        message: String,
    },

    /// Webhook signature missing or mismatched.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Webhook payload did not parse or is missing required fields.
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Client-side configuration problem (e.g. missing webhook secret).
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Everything a gateway needs to open a hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutIntent {
    /// The app being bought.
    pub app_id: AppId,
    /// The buying user.
    pub user_id: UserId,
    /// Display title for the provider's hosted page.
    pub app_title: String,
    /// Our checkout reference, echoed back by webhooks.
    pub tx_ref: String,
    /// Price in minor units.
    pub amount_minor: i64,
    /// Currency of `amount_minor`.
    pub currency: Currency,
    /// The revenue split, carried as opaque metadata the provider echoes.
    pub split: RevenueSplit,
    /// Buyer email, when the provider wants one up front.
    pub customer_email: Option<String>,
    /// Buyer phone number (mobile-money flows).
    pub phone_number: Option<String>,
    /// Requested payment method hint (e.g. "card", "mpesa").
    pub payment_method: Option<String>,
    /// Where the provider sends the user after paying.
    pub success_url: String,
    /// Where the provider sends the user on cancel.
    pub cancel_url: String,
}

/// A provider-side checkout session.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    /// Which provider hosts it.
    pub provider: ProviderId,
    /// Hosted payment page to redirect the user to.
    pub url: String,
    /// Provider-assigned session id (Stripe).
    pub session_id: Option<String>,
    /// Our reference as registered with the provider (Flutterwave).
    pub tx_ref: Option<String>,
}

/// A provider's independent answer about one transaction.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    /// The provider's reference for the transaction.
    pub reference: String,
    /// Amount the provider actually settled, in minor units.
    pub amount_minor: i64,
    /// Currency the provider settled in.
    pub currency: Currency,
    /// Whether the provider confirms the payment as successful.
    pub settled: bool,
}

/// A webhook delivery, authenticated and normalized out of the provider's
/// wire format.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The provider says a checkout finished successfully.
    PaymentCompleted(CompletedPayment),
    /// The provider says a payment was declined or failed.
    PaymentFailed {
        /// App from the echoed metadata.
        app_id: AppId,
        /// User from the echoed metadata.
        user_id: UserId,
        /// The provider's transaction reference.
        reference: String,
    },
    /// The provider refunded a charge.
    Refunded {
        /// Idempotency reference for the refund event.
        reference: String,
        /// App from metadata, when the provider carried it through.
        app_id: Option<AppId>,
        /// User from metadata, when the provider carried it through.
        user_id: Option<UserId>,
        /// Refunded amount in minor units.
        amount_minor: i64,
        /// Currency of the refund.
        currency: Currency,
    },
    /// A sub-merchant account changed state (payout onboarding).
    PayoutAccountUpdated {
        /// The provider's account id.
        provider_account_id: String,
        /// Whether payouts are now enabled.
        payouts_enabled: bool,
    },
    /// Authenticated but not interesting to settlement.
    Ignored {
        /// The provider's event type, for logging.
        kind: String,
    },
}

/// A verified completed payment with its echoed split metadata.
#[derive(Debug, Clone)]
pub struct CompletedPayment {
    /// Which provider settled it.
    pub provider: ProviderId,
    /// Stable provider transaction id — the settlement idempotency key.
    pub reference: String,
    /// What to hand to [`PaymentGateway::verify_transaction`]. Equal to
    /// `reference` for Stripe; Flutterwave verifies by numeric id.
    pub verify_ref: String,
    /// App from the echoed metadata.
    pub app_id: AppId,
    /// User from the echoed metadata.
    pub user_id: UserId,
    /// Payload-declared amount in minor units (verified independently
    /// before settlement).
    pub amount_minor: i64,
    /// Payload-declared currency.
    pub currency: Currency,
    /// Platform share from the echoed metadata.
    pub platform_fee_minor: i64,
    /// Developer share from the echoed metadata.
    pub developer_amount_minor: i64,
}

/// A request to create a developer payout account at a provider.
#[derive(Debug, Clone)]
pub struct SubmerchantRequest {
    /// Developer contact email.
    pub email: String,
    /// Registered business name.
    pub business_name: String,
    /// ISO country code.
    pub country: String,
    /// Settlement bank code (Flutterwave subaccounts).
    pub bank_code: Option<String>,
    /// Settlement account number (Flutterwave subaccounts).
    pub account_number: Option<String>,
}

/// A provider-created sub-merchant account.
#[derive(Debug, Clone)]
pub struct SubmerchantAccount {
    /// Which provider holds it.
    pub provider: ProviderId,
    /// The provider's account id.
    pub account_id: String,
    /// Onboarding URL for the developer to finish setup, when the provider
    /// uses hosted onboarding.
    pub onboarding_url: Option<String>,
}

/// The capability surface shared by both payment processors.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Which provider this gateway talks to.
    fn provider(&self) -> ProviderId;

    /// Create a hosted checkout session for the intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects or the call fails.
    async fn create_checkout(&self, intent: &CheckoutIntent)
        -> Result<GatewaySession, ProviderError>;

    /// Look the transaction up at the provider and report what actually
    /// settled. Reconciliation trusts this, never the webhook payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects or the call fails.
    async fn verify_transaction(&self, reference: &str)
        -> Result<VerifiedPayment, ProviderError>;

    /// Authenticate a webhook delivery against the raw body and signature
    /// header, then normalize it into a [`GatewayEvent`].
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidSignature`] when authentication fails;
    /// [`ProviderError::InvalidPayload`] when an authenticated body is
    /// malformed.
    fn construct_webhook_event(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> Result<GatewayEvent, ProviderError>;

    /// Create a sub-merchant account for developer payouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects or the call fails.
    async fn create_submerchant(
        &self,
        request: &SubmerchantRequest,
    ) -> Result<SubmerchantAccount, ProviderError>;
}
