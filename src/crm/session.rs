//! The CRM capability contract consumed by the engine.
//!
//! The pipeline never talks to a concrete vendor API; it is handed a
//! `CrmSession` at construction (no ambient global session). `rest.rs`
//! provides the production JSON REST implementation, tests supply mocks.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;

use super::records::{CrmRecord, FieldKey, FieldValue};

/// Acknowledgment of a single record update call.
#[derive(Debug, Clone)]
pub struct UpdateAck {
    pub success: bool,
    /// HTTP status (or transport-level equivalent) when available.
    pub status_code: Option<u16>,
    /// Raw response body, kept for failure descriptions.
    pub raw_response: Option<String>,
}

impl UpdateAck {
    pub fn ok(status_code: u16) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            raw_response: None,
        }
    }

    pub fn rejected(status_code: Option<u16>, body: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            raw_response: Some(body.into()),
        }
    }
}

/// Allowed picklist values for one record-type variant of an object.
#[derive(Debug, Clone)]
pub struct RecordTypePicklist {
    pub record_type_id: String,
    pub allowed_values: HashSet<String>,
}

/// Session against the CRM backing store.
#[async_trait]
pub trait CrmSession: Send + Sync {
    /// Fetch the order records for the given business keys. Implementations
    /// are expected to honor the configured chunk size internally; callers
    /// treat the result as one snapshot.
    async fn fetch_records(&self, registrations: &[String]) -> Result<Vec<CrmRecord>>;

    /// Apply one field-level update to a record. Atomic per record; a
    /// transport fault surfaces as `Err`, a rejected write as an
    /// unsuccessful ack.
    async fn update_record(
        &self,
        id: &str,
        fields: &BTreeMap<FieldKey, FieldValue>,
    ) -> Result<UpdateAck>;

    /// Allowed values of a picklist field, per record-type variant.
    async fn describe_picklist(&self, object: &str, field: &str)
        -> Result<Vec<RecordTypePicklist>>;

    /// Record-type identifiers defined for an object.
    async fn list_record_types(&self, object: &str) -> Result<Vec<String>>;
}
