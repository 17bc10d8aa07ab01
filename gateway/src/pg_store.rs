//! Postgres-backed store.

use async_trait::async_trait;
use fxgate_common::{ApiKey, ConversionRecord, Currency, NewUser, RecordId, Timestamp, User, UserId};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, instrument};

use crate::store::{
    KeyValidator, RequestLog, StoreError, StoreResult, UserRegistry, API_KEY_TAKEN, EMAIL_TAKEN,
    USERNAME_TAKEN,
};

// `timestamp` deliberately has no column default: the gateway binds the
// moment of append on every insert.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        api_key TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS conversion_requests (
        id UUID PRIMARY KEY,
        api_key TEXT NOT NULL,
        from_currency TEXT NOT NULL,
        to_currency TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        converted_amount NUMERIC NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        response_body TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS conversion_requests_api_key_idx ON conversion_requests (api_key)",
];

/// Store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if missing.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }

    async fn exists(&self, column: &str, value: &str) -> StoreResult<bool> {
        // `column` is one of our own constants, never caller input.
        let sql = format!("SELECT EXISTS(SELECT 1 FROM users WHERE {} = $1)", column);
        let row = sqlx::query(&sql).bind(value).fetch_one(&self.pool).await?;
        Ok(row.try_get::<bool, _>(0)?)
    }
}

fn record_from_row(row: &PgRow) -> StoreResult<ConversionRecord> {
    Ok(ConversionRecord {
        id: RecordId::from_uuid(row.try_get("id")?),
        api_key: ApiKey::new(row.try_get::<String, _>("api_key")?),
        from_currency: Currency::new(row.try_get::<String, _>("from_currency")?),
        to_currency: Currency::new(row.try_get::<String, _>("to_currency")?),
        amount: row.try_get("amount")?,
        converted_amount: row.try_get("converted_amount")?,
        timestamp: row.try_get("timestamp")?,
        response_body: row.try_get("response_body")?,
    })
}

fn conflict_for_constraint(constraint: &str) -> Option<StoreError> {
    let msg = match constraint {
        "users_email_key" => EMAIL_TAKEN,
        "users_username_key" => USERNAME_TAKEN,
        "users_api_key_key" => API_KEY_TAKEN,
        _ => return None,
    };
    Some(StoreError::Conflict(msg.to_string()))
}

#[async_trait]
impl KeyValidator for PgStore {
    async fn validate(&self, key: &ApiKey) -> StoreResult<Option<ApiKey>> {
        let row = sqlx::query("SELECT api_key FROM users WHERE api_key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_get::<String, _>("api_key").map(ApiKey::new))
            .transpose()
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl RequestLog for PgStore {
    async fn requests_for_key(&self, key: &ApiKey) -> StoreResult<Vec<ConversionRecord>> {
        let rows = sqlx::query(
            "SELECT id, api_key, from_currency, to_currency, amount, converted_amount, timestamp, response_body \
             FROM conversion_requests WHERE api_key = $1",
        )
        .bind(key.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    #[instrument(skip(self, record), fields(record_id = %record.id))]
    async fn append(&self, record: ConversionRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO conversion_requests \
             (id, api_key, from_currency, to_currency, amount, converted_amount, timestamp, response_body) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(*record.id.as_uuid())
        .bind(record.api_key.as_str())
        .bind(record.from_currency.code())
        .bind(record.to_currency.code())
        .bind(record.amount)
        .bind(record.converted_amount)
        .bind(record.timestamp)
        .bind(&record.response_body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserRegistry for PgStore {
    async fn register(&self, user: NewUser, created_at: Timestamp) -> StoreResult<User> {
        // Friendly messages for the common case; the unique constraints
        // below still catch a concurrent registration.
        if self.exists("email", &user.email).await? {
            return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
        }
        if self.exists("username", &user.username).await? {
            return Err(StoreError::Conflict(USERNAME_TAKEN.to_string()));
        }
        if self.exists("api_key", &user.api_key).await? {
            return Err(StoreError::Conflict(API_KEY_TAKEN.to_string()));
        }

        let id = UserId::new();
        let result = sqlx::query(
            "INSERT INTO users (id, username, email, api_key, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(*id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.api_key)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(User {
                id,
                username: user.username,
                email: user.email,
                api_key: ApiKey::new(user.api_key),
                created_at,
            }),
            Err(sqlx::Error::Database(db)) => {
                let conflict = db.constraint().and_then(conflict_for_constraint);
                Err(conflict.unwrap_or_else(|| StoreError::Database(db.to_string())))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_mapping() {
        assert!(matches!(
            conflict_for_constraint("users_email_key"),
            Some(StoreError::Conflict(ref m)) if m == EMAIL_TAKEN
        ));
        assert!(matches!(
            conflict_for_constraint("users_api_key_key"),
            Some(StoreError::Conflict(ref m)) if m == API_KEY_TAKEN
        ));
        assert!(conflict_for_constraint("something_else").is_none());
    }

    #[test]
    fn test_request_timestamp_has_no_default() {
        let table = SCHEMA[1];
        assert!(table.contains("timestamp TIMESTAMPTZ NOT NULL"));
        assert!(!table.to_uppercase().contains("DEFAULT"));
    }
}
