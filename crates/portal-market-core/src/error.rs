//! Core error types.

/// Result alias using [`MarketError`].
pub type Result<T> = std::result::Result<T, MarketError>;

/// Errors produced by the domain layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    /// The requested currency is settled by neither provider.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// A price was negative. Prices are minor units and must be >= 0.
    #[error("invalid price: {0}")]
    InvalidPrice(i64),
}
