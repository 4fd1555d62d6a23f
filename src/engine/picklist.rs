//! Termination-reason picklist validation.
//!
//! The allowed value set is fetched once per run, per record-type variant of
//! the order object. Every variant must agree on the value set; a mismatch is
//! a CRM metadata integrity violation that aborts the run, because the
//! invalid-value classification below it could not be trusted. Feed rows
//! whose non-null reason falls outside the set are reported as an
//! informational bucket and never block updates.

use std::collections::HashSet;

use log::info;

use crate::crm::session::RecordTypePicklist;
use crate::feed::normalize::ExternalRecord;

/// CRM metadata integrity violation; aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PicklistError {
    /// A record-type variant disagrees with the others on the allowed set.
    Inconsistent {
        field: String,
        record_type: String,
    },
    /// The object exposes no record types at all.
    NoRecordTypes { field: String },
}

impl std::fmt::Display for PicklistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PicklistError::Inconsistent { field, record_type } => write!(
                f,
                "picklist '{}' differs for record type '{}' - allowed values must be identical across all record types",
                field, record_type
            ),
            PicklistError::NoRecordTypes { field } => {
                write!(f, "picklist '{}' has no record-type variants to validate", field)
            }
        }
    }
}

impl std::error::Error for PicklistError {}

/// Collapse the per-record-type picklists down to the single shared value
/// set, failing hard if any variant disagrees.
pub fn unified_allowed_values(
    field: &str,
    picklists: &[RecordTypePicklist],
) -> Result<HashSet<String>, PicklistError> {
    let Some(first) = picklists.first() else {
        return Err(PicklistError::NoRecordTypes {
            field: field.to_string(),
        });
    };

    for other in &picklists[1..] {
        if other.allowed_values != first.allowed_values {
            return Err(PicklistError::Inconsistent {
                field: field.to_string(),
                record_type: other.record_type_id.clone(),
            });
        }
    }

    info!(
        "Picklist '{}' consistent across {} record types ({} values)",
        field,
        picklists.len(),
        first.allowed_values.len()
    );
    Ok(first.allowed_values.clone())
}

/// Feed records whose non-null termination reason is outside the allowed
/// set. Advisory only.
pub fn invalid_reason_records(
    records: &[ExternalRecord],
    allowed: &HashSet<String>,
) -> Vec<ExternalRecord> {
    records
        .iter()
        .filter(|r| {
            r.termination_reason
                .as_deref()
                .is_some_and(|reason| !allowed.contains(reason))
        })
        .cloned()
        .collect()
}
