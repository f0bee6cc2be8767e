//! Storage error types.

/// Result alias using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (e.g. "app", "purchase").
        entity: &'static str,
        /// The id that missed.
        id: String,
    },

    /// The database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
