//! Joins normalized feed records against the CRM snapshot by business key.
//!
//! Produces the matched inner join plus both directions of the symmetric
//! difference: feed keys the CRM does not know, and CRM keys absent from the
//! feed. Key equality is exact (both sides are uppercased at their
//! boundaries); there is no fuzzy matching.

use std::collections::HashMap;

use log::{info, warn};

use crate::crm::records::CrmRecord;
use crate::feed::normalize::ExternalRecord;

/// One feed row joined with its CRM record.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub external: ExternalRecord,
    pub crm: CrmRecord,
}

/// Complete partition of the two key sets.
#[derive(Debug, Clone, Default)]
pub struct MatchPartition {
    pub matched: Vec<MatchedPair>,
    /// Feed records with no CRM counterpart.
    pub unmatched_external: Vec<ExternalRecord>,
    /// CRM records the feed never mentioned.
    pub unmatched_crm: Vec<CrmRecord>,
}

/// Collapse duplicate business keys, keeping the first occurrence.
fn dedupe_external(records: Vec<ExternalRecord>) -> Vec<ExternalRecord> {
    let mut seen: HashMap<String, ()> = HashMap::with_capacity(records.len());
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(record.registration.clone(), ()).is_none() {
            out.push(record);
        } else {
            warn!(
                "Duplicate registration {} in feed, keeping first occurrence",
                record.registration
            );
        }
    }
    out
}

/// Partition feed and CRM records by business key.
pub fn match_records(external: Vec<ExternalRecord>, crm: Vec<CrmRecord>) -> MatchPartition {
    let external = dedupe_external(external);

    let mut crm_by_key: HashMap<String, CrmRecord> = HashMap::with_capacity(crm.len());
    for record in crm {
        if let Some(dup) = crm_by_key.insert(record.registration.clone(), record) {
            warn!(
                "Duplicate registration {} in CRM snapshot, keeping latest",
                dup.registration
            );
        }
    }

    let mut partition = MatchPartition::default();
    for record in external {
        match crm_by_key.remove(&record.registration) {
            Some(crm_record) => partition.matched.push(MatchedPair {
                external: record,
                crm: crm_record,
            }),
            None => partition.unmatched_external.push(record),
        }
    }

    // Whatever the feed did not claim is CRM-only
    let mut leftover: Vec<CrmRecord> = crm_by_key.into_values().collect();
    leftover.sort_by(|a, b| a.registration.cmp(&b.registration));
    partition.unmatched_crm = leftover;

    info!(
        "Matched {} records, {} feed-only, {} crm-only",
        partition.matched.len(),
        partition.unmatched_external.len(),
        partition.unmatched_crm.len()
    );
    partition
}
