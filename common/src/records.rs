//! Persisted record types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ApiKey, Currency, RecordId, Timestamp, UserId};

/// Audit record of one successful conversion.
///
/// Written exactly once per successful request and never modified. The
/// request history used by the daily rate limit is the set of these records
/// for a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Unique record ID.
    pub id: RecordId,
    /// Key that made the request.
    pub api_key: ApiKey,
    /// Source currency.
    pub from_currency: Currency,
    /// Target currency.
    pub to_currency: Currency,
    /// Requested amount.
    pub amount: Decimal,
    /// Converted amount.
    pub converted_amount: Decimal,
    /// When the record was appended.
    pub timestamp: Timestamp,
    /// JSON body returned to the caller.
    pub response_body: String,
}

impl ConversionRecord {
    /// Create a new record stamped with `timestamp`.
    pub fn new(
        api_key: ApiKey,
        from_currency: Currency,
        to_currency: Currency,
        amount: Decimal,
        converted_amount: Decimal,
        response_body: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: RecordId::new(),
            api_key,
            from_currency,
            to_currency,
            amount,
            converted_amount,
            timestamp,
            response_body,
        }
    }
}

/// A registered gateway user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub api_key: ApiKey,
    pub created_at: Timestamp,
}

/// Registration request for a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub api_key: String,
}

impl NewUser {
    /// Minimal shape check on the email address: one `@` with a non-empty
    /// local part and a dotted domain.
    pub fn has_valid_email(&self) -> bool {
        let Some((local, domain)) = self.email.split_once('@') else {
            return false;
        };
        !local.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
    }
}
