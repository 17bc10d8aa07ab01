//! Persistence capabilities consumed by the gateway.
//!
//! The gateway never talks to a database directly. It asks a [`KeyValidator`]
//! whether a key exists, reads and appends conversion history through a
//! [`RequestLog`], and registers users through a [`UserRegistry`].

use async_trait::async_trait;
use fxgate_common::{ApiKey, ConversionRecord, NewUser, Timestamp, User};
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field is already taken.
    #[error("{0}")]
    Conflict(String),

    /// Backend failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Resolves a presented key to a known caller.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    /// Return the key if it belongs to a registered user.
    async fn validate(&self, key: &ApiKey) -> StoreResult<Option<ApiKey>>;
}

/// Append-only log of successful conversions.
#[async_trait]
pub trait RequestLog: Send + Sync {
    /// All records for `key`, in no particular order.
    async fn requests_for_key(&self, key: &ApiKey) -> StoreResult<Vec<ConversionRecord>>;

    /// Persist a record.
    async fn append(&self, record: ConversionRecord) -> StoreResult<()>;
}

/// User registration.
#[async_trait]
pub trait UserRegistry: Send + Sync {
    /// Register a user. Username, email and API key must each be unused.
    async fn register(&self, user: NewUser, created_at: Timestamp) -> StoreResult<User>;
}

/// Everything the gateway needs from persistence.
pub trait GatewayStore: KeyValidator + RequestLog + UserRegistry {}

impl<T> GatewayStore for T where T: KeyValidator + RequestLog + UserRegistry {}

pub(crate) const EMAIL_TAKEN: &str = "Email already registered";
pub(crate) const USERNAME_TAKEN: &str = "Username already taken";
pub(crate) const API_KEY_TAKEN: &str = "API key already in use";
