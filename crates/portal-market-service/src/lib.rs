//! Portal Market HTTP service.
//!
//! Checkout orchestration, webhook reconciliation, ownership reads, and
//! the Stripe/Flutterwave provider clients behind the uniform
//! [`providers::PaymentGateway`] interface.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod flutterwave;
pub mod handlers;
pub mod providers;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use flutterwave::FlutterwaveClient;
pub use routes::create_router;
pub use state::AppState;
pub use stripe::StripeClient;
