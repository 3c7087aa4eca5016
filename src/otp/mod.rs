//! OTP records, target records, and the record store abstraction.
//!
//! # Store Backends
//!
//! - `MemoryOtpStore`: in-memory storage using DashMap (default)
//! - `PostgresOtpStore`: persistent storage in the `_otps` table
//!
//! Both enforce compare-and-set on `sent_to`: once a record carries a
//! destination, `save` refuses to replace it with a different one and
//! returns `StoreError::SentToConflict`.
//!
//! Use `create_otp_store()` to create the appropriate backend based on configuration.

mod memory_store;
mod postgres_store;
mod record;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::config::DatabaseConfig;

pub use memory_store::MemoryOtpStore;
pub use postgres_store::PostgresOtpStore;
pub use record::{AuthRecord, OtpRecord, TargetRecord};

/// Errors that can occur during OTP store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("OTP record not found: {0}")]
    NotFound(String),

    /// Another writer already recorded a different destination
    #[error("OTP {otp_id} already has a different sent_to")]
    SentToConflict { otp_id: String, existing: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Backend trait for OTP record storage.
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared by
/// concurrent dispatches.
#[async_trait]
pub trait OtpRecordStore: Send + Sync {
    /// Backend type identifier
    fn backend_type(&self) -> &'static str;

    /// Look up an OTP record by its identifier.
    ///
    /// Returns `StoreError::NotFound` if the record does not exist (deleted or
    /// expired).
    async fn find_by_id(&self, otp_id: &str) -> Result<OtpRecord, StoreError>;

    /// Persist an OTP record.
    ///
    /// A stored non-empty `sent_to` is never replaced by a different value;
    /// such a write fails with `StoreError::SentToConflict`.
    async fn save(&self, record: &OtpRecord) -> Result<(), StoreError>;
}

/// Create an OTP record store based on configuration.
///
/// - `database` present: connects a PostgreSQL pool and returns a `PostgresOtpStore`
/// - otherwise: returns a `MemoryOtpStore`
pub async fn create_otp_store(
    database: Option<&DatabaseConfig>,
) -> Result<Arc<dyn OtpRecordStore>, StoreError> {
    match database {
        Some(config) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
                .connect(&config.url)
                .await?;

            tracing::info!(
                backend = "postgres",
                pool_size = config.pool_size,
                "Creating PostgreSQL OTP store"
            );
            Ok(Arc::new(PostgresOtpStore::new(pool)))
        }
        None => {
            tracing::info!(backend = "memory", "Creating memory OTP store");
            Ok(Arc::new(MemoryOtpStore::new()))
        }
    }
}
