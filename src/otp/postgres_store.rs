//! PostgreSQL-based OTP record store.
//!
//! Expects the OTP table managed by the surrounding auth backend:
//!
//! ```sql
//! CREATE TABLE _otps (
//!     id             TEXT PRIMARY KEY,
//!     collection_ref TEXT NOT NULL,
//!     record_ref     TEXT NOT NULL,
//!     sent_to        TEXT NOT NULL DEFAULT '',
//!     created        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated        TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{OtpRecord, OtpRecordStore, StoreError};

type OtpRow = (String, String, String, String, DateTime<Utc>, DateTime<Utc>);

/// PostgreSQL-backed OTP record store
pub struct PostgresOtpStore {
    pool: PgPool,
}

impl PostgresOtpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new record, used by the OTP issuer and in tests
    pub async fn create(&self, record: &OtpRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO _otps (id, collection_ref, record_ref, sent_to, created, updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.id)
        .bind(&record.collection_ref)
        .bind(&record.record_ref)
        .bind(record.sent_to())
        .bind(record.created)
        .bind(record.updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn current_sent_to(&self, otp_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT sent_to FROM _otps WHERE id = $1")
            .bind(otp_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(sent_to,)| sent_to))
    }
}

#[async_trait]
impl OtpRecordStore for PostgresOtpStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn find_by_id(&self, otp_id: &str) -> Result<OtpRecord, StoreError> {
        let row: Option<OtpRow> = sqlx::query_as(
            r#"
            SELECT id, collection_ref, record_ref, sent_to, created, updated
            FROM _otps
            WHERE id = $1
            "#,
        )
        .bind(otp_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, collection_ref, record_ref, sent_to, created, updated)| {
            OtpRecord::from_parts(id, collection_ref, record_ref, sent_to, created, updated)
        })
        .ok_or_else(|| StoreError::NotFound(otp_id.to_string()))
    }

    async fn save(&self, record: &OtpRecord) -> Result<(), StoreError> {
        // Compare-and-set: only an empty or identical sent_to may be written over
        let result = sqlx::query(
            r#"
            UPDATE _otps
            SET sent_to = $2, updated = $3
            WHERE id = $1 AND (sent_to = '' OR sent_to = $2)
            "#,
        )
        .bind(&record.id)
        .bind(record.sent_to())
        .bind(record.updated)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.current_sent_to(&record.id).await? {
            None => Err(StoreError::NotFound(record.id.clone())),
            Some(existing) => Err(StoreError::SentToConflict {
                otp_id: record.id.clone(),
                existing,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires a PostgreSQL instance: TEST_DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_compare_and_set_against_postgres() {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set");
        let pool = PgPool::connect(&url).await.unwrap();
        let store = PostgresOtpStore::new(pool);

        let id = format!("otp_{}", uuid::Uuid::new_v4().simple());
        store.create(&OtpRecord::new(&id, "users", "user1")).await.unwrap();

        let mut first = store.find_by_id(&id).await.unwrap();
        first.set_sent_to("+15551234567");
        store.save(&first).await.unwrap();

        let mut second = first.clone();
        second.set_sent_to("user@example.com");
        assert!(matches!(
            store.save(&second).await,
            Err(StoreError::SentToConflict { .. })
        ));

        assert_eq!(store.find_by_id(&id).await.unwrap().sent_to(), "+15551234567");
    }
}
