//! Currencies and payment provider selection.
//!
//! Each supported currency is settled by exactly one provider: Flutterwave
//! for the mobile-money markets it serves, Stripe for card currencies.
//! Anything outside both sets is a typed error, never a silent default.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MarketError, Result};

/// Currencies settled through Flutterwave (mobile money and regional cards).
const FLUTTERWAVE_CURRENCIES: &[&str] = &[
    "NGN", "GHS", "KES", "UGX", "TZS", "RWF", "ZMW", "MWK", "XAF", "XOF", "SLL", "ZAR",
];

/// Currencies settled through Stripe checkout.
const STRIPE_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "CAD", "AUD", "NZD", "JPY", "CHF", "SEK", "NOK", "DKK", "SGD", "HKD",
    "MXN", "BRL", "INR",
];

/// An ISO-4217 currency code, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Normalize a raw code. No validation happens here; whether the
    /// currency is actually supported is [`select_provider`]'s call.
    #[must_use]
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }

    /// The uppercase currency code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        Self::new(&code)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// The payment providers this marketplace settles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderId {
    /// Global card processor with hosted checkout sessions.
    Stripe,
    /// Mobile-money and card processor for emerging markets.
    Flutterwave,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stripe => write!(f, "STRIPE"),
            Self::Flutterwave => write!(f, "FLUTTERWAVE"),
        }
    }
}

/// Pick the provider equipped to settle `currency`.
///
/// # Errors
///
/// Returns [`MarketError::UnsupportedCurrency`] when neither provider
/// settles the currency.
pub fn select_provider(currency: &Currency) -> Result<ProviderId> {
    let code = currency.as_str();

    if FLUTTERWAVE_CURRENCIES.contains(&code) {
        Ok(ProviderId::Flutterwave)
    } else if STRIPE_CURRENCIES.contains(&code) {
        Ok(ProviderId::Stripe)
    } else {
        Err(MarketError::UnsupportedCurrency(code.to_string()))
    }
}
