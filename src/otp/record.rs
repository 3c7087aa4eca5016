use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::template::value_to_string;

/// Persisted OTP record, as far as delivery bookkeeping is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    /// OTP identifier handed to the client
    pub id: String,
    /// Collection of the owning auth record
    pub collection_ref: String,
    /// Identifier of the owning auth record
    pub record_ref: String,
    /// Destination the OTP was delivered to, empty until delivered
    sent_to: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl OtpRecord {
    pub fn new(
        id: impl Into<String>,
        collection_ref: impl Into<String>,
        record_ref: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            collection_ref: collection_ref.into(),
            record_ref: record_ref.into(),
            sent_to: String::new(),
            created: now,
            updated: now,
        }
    }

    /// Rebuild a record from stored columns
    pub fn from_parts(
        id: String,
        collection_ref: String,
        record_ref: String,
        sent_to: String,
        created: DateTime<Utc>,
        updated: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            collection_ref,
            record_ref,
            sent_to,
            created,
            updated,
        }
    }

    pub fn sent_to(&self) -> &str {
        &self.sent_to
    }

    pub fn set_sent_to(&mut self, destination: impl Into<String>) {
        self.sent_to = destination.into();
        self.updated = Utc::now();
    }

    pub fn is_sent(&self) -> bool {
        !self.sent_to.is_empty()
    }
}

/// Identity record an OTP belongs to.
///
/// Attribute lookups return an empty string when the attribute is absent.
pub trait TargetRecord: Send + Sync {
    fn identifier(&self) -> String;

    fn attribute(&self, name: &str) -> String;

    fn email(&self) -> String {
        self.attribute("email")
    }
}

/// Attribute-map backed target record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthRecord {
    pub id: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl AuthRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl TargetRecord for AuthRecord {
    fn identifier(&self) -> String {
        self.id.clone()
    }

    fn attribute(&self, name: &str) -> String {
        self.attributes
            .get(name)
            .map(value_to_string)
            .unwrap_or_default()
    }
}
