//! Application state.

use std::sync::Arc;

use portal_market_core::ProviderId;
use portal_market_store::Store;

use crate::config::ServiceConfig;
use crate::flutterwave::FlutterwaveClient;
use crate::providers::PaymentGateway;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Stripe client (optional; card checkout disabled without it).
    pub stripe: Option<Arc<StripeClient>>,

    /// Flutterwave client (optional; mobile-money checkout disabled
    /// without it).
    pub flutterwave: Option<Arc<FlutterwaveClient>>,
}

impl AppState {
    /// Create application state, building provider clients from config.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(key, config.stripe_webhook_secret.clone()) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - card checkout will not be available");
        }

        let flutterwave = config.flutterwave_api_key.as_ref().and_then(|key| {
            match FlutterwaveClient::new(key, config.flutterwave_webhook_secret.clone()) {
                Ok(client) => {
                    tracing::info!("Flutterwave integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Flutterwave client");
                    None
                }
            }
        });

        if flutterwave.is_none() {
            tracing::warn!(
                "Flutterwave not configured - mobile-money checkout will not be available"
            );
        }

        Self {
            store,
            config,
            stripe,
            flutterwave,
        }
    }

    /// Create application state with injected provider clients (tests point
    /// these at wiremock doubles).
    #[must_use]
    pub fn with_clients(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        stripe: Option<Arc<StripeClient>>,
        flutterwave: Option<Arc<FlutterwaveClient>>,
    ) -> Self {
        Self {
            store,
            config,
            stripe,
            flutterwave,
        }
    }

    /// The gateway for a provider, when configured.
    #[must_use]
    pub fn gateway(&self, provider: ProviderId) -> Option<Arc<dyn PaymentGateway>> {
        match provider {
            ProviderId::Stripe => self
                .stripe
                .clone()
                .map(|c| c as Arc<dyn PaymentGateway>),
            ProviderId::Flutterwave => self
                .flutterwave
                .clone()
                .map(|c| c as Arc<dyn PaymentGateway>),
        }
    }
}
