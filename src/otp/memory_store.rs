//! In-memory OTP record store using DashMap.
//!
//! Records are lost on restart. Useful for tests and single-node setups where
//! OTP records live in the same process.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{OtpRecord, OtpRecordStore, StoreError};

/// In-memory OTP record store
#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    records: DashMap<String, OtpRecord>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record without the `sent_to` check
    pub fn insert(&self, record: OtpRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Remove a record, as expiry or deletion would
    pub fn remove(&self, otp_id: &str) -> Option<OtpRecord> {
        self.records.remove(otp_id).map(|(_, record)| record)
    }

    pub fn get(&self, otp_id: &str) -> Option<OtpRecord> {
        self.records.get(otp_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl OtpRecordStore for MemoryOtpStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn find_by_id(&self, otp_id: &str) -> Result<OtpRecord, StoreError> {
        self.get(otp_id)
            .ok_or_else(|| StoreError::NotFound(otp_id.to_string()))
    }

    async fn save(&self, record: &OtpRecord) -> Result<(), StoreError> {
        // The entry guard holds the shard lock, so check and write are atomic
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get().sent_to();
                if !existing.is_empty() && existing != record.sent_to() {
                    return Err(StoreError::SentToConflict {
                        otp_id: record.id.clone(),
                        existing: existing.to_string(),
                    });
                }
                entry.insert(record.clone());
            }
            // Deleted or expired since it was read; never resurrect it
            Entry::Vacant(_) => return Err(StoreError::NotFound(record.id.clone())),
        }

        tracing::trace!(otp_id = %record.id, "OTP record saved");
        Ok(())
    }
}
