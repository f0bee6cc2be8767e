//! Stripe integration: checkout sessions, transaction verification,
//! webhook authentication, Connect accounts for developer payouts.

pub mod client;
pub mod types;

pub use client::StripeClient;
