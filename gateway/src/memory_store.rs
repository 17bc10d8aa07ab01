//! In-process store used when no database is configured, and by tests.

use async_trait::async_trait;
use dashmap::DashMap;
use fxgate_common::{ApiKey, ConversionRecord, NewUser, Timestamp, User, UserId};
use parking_lot::RwLock;
use tracing::debug;

use crate::store::{
    KeyValidator, RequestLog, StoreError, StoreResult, UserRegistry, API_KEY_TAKEN, EMAIL_TAKEN,
    USERNAME_TAKEN,
};

/// Users and conversion history held in memory.
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<Vec<User>>,
    requests: DashMap<ApiKey, Vec<ConversionRecord>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one user already registered under `key`.
    pub fn with_api_key(key: impl Into<String>) -> Self {
        let store = Self::new();
        let key = key.into();
        let user = User {
            id: UserId::new(),
            username: format!("user-{}", key),
            email: format!("{}@fxgate.local", key),
            api_key: ApiKey::new(key),
            created_at: chrono::Utc::now(),
        };
        store.users.write().push(user);
        store
    }

    /// Records for `key` (test helper).
    pub fn records_for(&self, key: &ApiKey) -> Vec<ConversionRecord> {
        self.requests
            .get(key)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Total number of records across all keys.
    pub fn record_count(&self) -> usize {
        self.requests.iter().map(|r| r.len()).sum()
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }
}

#[async_trait]
impl KeyValidator for InMemoryStore {
    async fn validate(&self, key: &ApiKey) -> StoreResult<Option<ApiKey>> {
        let users = self.users.read();
        Ok(users
            .iter()
            .find(|u| &u.api_key == key)
            .map(|u| u.api_key.clone()))
    }
}

#[async_trait]
impl RequestLog for InMemoryStore {
    async fn requests_for_key(&self, key: &ApiKey) -> StoreResult<Vec<ConversionRecord>> {
        Ok(self.records_for(key))
    }

    async fn append(&self, record: ConversionRecord) -> StoreResult<()> {
        debug!(record_id = %record.id, api_key = %record.api_key, "Appending conversion record");
        self.requests
            .entry(record.api_key.clone())
            .or_default()
            .push(record);
        Ok(())
    }
}

#[async_trait]
impl UserRegistry for InMemoryStore {
    async fn register(&self, user: NewUser, created_at: Timestamp) -> StoreResult<User> {
        // Check and insert under one write lock so concurrent registrations
        // cannot both claim the same field.
        let mut users = self.users.write();

        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
        }
        if users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(USERNAME_TAKEN.to_string()));
        }
        if users.iter().any(|u| u.api_key.as_str() == user.api_key) {
            return Err(StoreError::Conflict(API_KEY_TAKEN.to_string()));
        }

        let created = User {
            id: UserId::new(),
            username: user.username,
            email: user.email,
            api_key: ApiKey::new(user.api_key),
            created_at,
        };
        users.push(created.clone());
        Ok(created)
    }
}
