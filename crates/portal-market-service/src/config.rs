//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Service configuration loaded from environment variables and secrets
/// files.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Identity service base URL for JWKS validation.
    pub auth_base_url: String,

    /// Expected JWT audience (default: "portal-market").
    pub auth_audience: String,

    /// Accept `test-token:<user-id>` bearer tokens instead of real JWTs.
    /// Test harness only; a warning is logged when enabled.
    pub allow_test_tokens: bool,

    /// Stripe API key (optional; Stripe checkout disabled without it).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook signing secret (whsec_...).
    pub stripe_webhook_secret: Option<String>,

    /// Flutterwave API key (optional; Flutterwave checkout disabled without it).
    pub flutterwave_api_key: Option<String>,

    /// Flutterwave webhook hash (the `verif-hash` shared secret).
    pub flutterwave_webhook_secret: Option<String>,

    /// Storefront URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

/// Flutterwave secrets file structure.
#[derive(Debug, Deserialize)]
struct FlutterwaveSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let (stripe_api_key, stripe_webhook_secret) = load_stripe_secrets();
        let (flutterwave_api_key, flutterwave_webhook_secret) = load_flutterwave_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/portal_market".into()),
            auth_base_url: std::env::var("AUTH_BASE_URL")
                .unwrap_or_else(|_| "https://id.portalmarket.dev".into()),
            auth_audience: std::env::var("AUTH_AUDIENCE")
                .unwrap_or_else(|_| "portal-market".into()),
            allow_test_tokens: false,
            stripe_api_key,
            stripe_webhook_secret,
            flutterwave_api_key,
            flutterwave_webhook_secret,
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/stripe.json",
        "portal-market/.secrets/stripe.json",
        "../.secrets/stripe.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
    )
}

/// Load Flutterwave secrets from file or environment.
fn load_flutterwave_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/flutterwave.json",
        "portal-market/.secrets/flutterwave.json",
        "../.secrets/flutterwave.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<FlutterwaveSecrets>(path) {
            tracing::info!(path = %path, "Loaded Flutterwave secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    tracing::debug!("Flutterwave secrets file not found, using environment variables");
    (
        std::env::var("FLUTTERWAVE_API_KEY").ok(),
        std::env::var("FLUTTERWAVE_WEBHOOK_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: "postgres://localhost/portal_market".into(),
            auth_base_url: "https://id.portalmarket.dev".into(),
            auth_audience: "portal-market".into(),
            allow_test_tokens: false,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            flutterwave_api_key: None,
            flutterwave_webhook_secret: None,
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
