//! Outcome classification: one pass over the run's results producing a
//! tagged bucket per record, then grouped into report tables.
//!
//! Success, Skipped, AlreadyClosed and Failed partition the matched set with
//! no overlaps. RenewalMismatch and InvalidPicklistValue are advisory layers
//! on top; the unmatched buckets cover both directions of the key join.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::crm::records::CrmRecord;
use crate::feed::normalize::ExternalRecord;

use super::executor::Outcome;
use super::matcher::MatchPartition;
use super::retry::CycleResult;

/// Terminal classification for one matched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Bucket {
    Success,
    Skipped,
    AlreadyClosed,
    Failed,
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bucket::Success => write!(f, "Success"),
            Bucket::Skipped => write!(f, "Skipped"),
            Bucket::AlreadyClosed => write!(f, "Already Closed"),
            Bucket::Failed => write!(f, "Failed"),
        }
    }
}

/// Enriched record view for the report: business fields plus identity and
/// the execution status text.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: String,
    pub bucket: Bucket,
    pub external: ExternalRecord,
    pub status_description: String,
}

/// Renewal flag disagreement between feed and CRM, advisory only.
#[derive(Debug, Clone)]
pub struct RenewalMismatch {
    pub id: String,
    pub registration: String,
    pub feed_renewed: bool,
    pub crm_renewed: Option<bool>,
}

/// Summary counters for the notification payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Distinct business keys acquired from the feed.
    pub acquired: usize,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Close transitions attempted this run, success or not.
    pub closed: usize,
    pub already_closed: usize,
    pub unmatched_feed: usize,
    pub unmatched_crm: usize,
    pub renewal_mismatch: usize,
    /// Distinct termination-reason values outside the picklist.
    pub invalid_picklist_values: usize,
    pub attempts: u32,
}

/// Everything the report and notification collaborators consume.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub success: Vec<ReportRow>,
    pub skipped: Vec<ReportRow>,
    /// Records for which a close transition was attempted this run,
    /// straight from the planner's closing set.
    pub closed: Vec<ReportRow>,
    pub already_closed: Vec<ReportRow>,
    pub failed: Vec<ReportRow>,
    pub renewal_mismatch: Vec<RenewalMismatch>,
    pub unmatched_feed: Vec<ExternalRecord>,
    pub unmatched_crm: Vec<CrmRecord>,
    pub invalid_picklist: Vec<ExternalRecord>,
    pub summary: RunSummary,
}

/// Classify every record from the run into its terminal bucket.
pub fn classify_run(
    partition: MatchPartition,
    cycle: CycleResult,
    invalid_picklist: Vec<ExternalRecord>,
) -> RunReport {
    let outcome_by_id: HashMap<String, Outcome> = cycle
        .outcomes
        .into_iter()
        .map(|o| (o.id.clone(), o))
        .collect();

    let skipped_ids: HashSet<&str> = cycle.pass.skipped.iter().map(|i| i.id.as_str()).collect();
    let write_ids: HashSet<&str> = cycle.pass.writes.iter().map(|i| i.id.as_str()).collect();
    let already_closed_ids: HashSet<&str> =
        cycle.pass.already_closed.iter().map(String::as_str).collect();
    let closing_ids: HashSet<&str> = cycle.pass.closing.iter().map(String::as_str).collect();

    let mut success = Vec::new();
    let mut skipped = Vec::new();
    let mut already_closed = Vec::new();
    let mut failed = Vec::new();
    let mut closed = Vec::new();
    let mut renewal_mismatch = Vec::new();

    let acquired = partition.matched.len() + partition.unmatched_external.len();

    for pair in &partition.matched {
        let id = pair.crm.id.as_str();

        // Advisory layer: open records whose renewal flag disagrees.
        // A CRM record with no flag set counts as a disagreement.
        if !pair.crm.is_closed() && pair.crm.renewed != Some(pair.external.renewed) {
            renewal_mismatch.push(RenewalMismatch {
                id: id.to_string(),
                registration: pair.crm.registration.clone(),
                feed_renewed: pair.external.renewed,
                crm_renewed: pair.crm.renewed,
            });
        }

        let (bucket, description) = if already_closed_ids.contains(id) {
            (Bucket::AlreadyClosed, "Already Closed".to_string())
        } else if skipped_ids.contains(id) {
            (Bucket::Skipped, Outcome::skipped(id).description)
        } else if write_ids.contains(id) {
            match outcome_by_id.get(id) {
                Some(outcome) if outcome.is_success() => {
                    (Bucket::Success, outcome.description.clone())
                }
                Some(outcome) => (Bucket::Failed, outcome.description.clone()),
                None => (Bucket::Failed, "no outcome recorded".to_string()),
            }
        } else {
            // A matched pair always lands in one of the three planner
            // groups; an empty final pass can only happen for empty input.
            continue;
        };

        let row = ReportRow {
            id: id.to_string(),
            bucket,
            external: pair.external.clone(),
            status_description: description,
        };

        if closing_ids.contains(id) {
            closed.push(row.clone());
        }
        match bucket {
            Bucket::Success => success.push(row),
            Bucket::Skipped => skipped.push(row),
            Bucket::AlreadyClosed => already_closed.push(row),
            Bucket::Failed => failed.push(row),
        }
    }

    let distinct_invalid_values: HashSet<&str> = invalid_picklist
        .iter()
        .filter_map(|r| r.termination_reason.as_deref())
        .collect();

    let summary = RunSummary {
        acquired,
        success: success.len(),
        skipped: skipped.len(),
        failed: failed.len(),
        closed: closed.len(),
        already_closed: already_closed.len(),
        unmatched_feed: partition.unmatched_external.len(),
        unmatched_crm: partition.unmatched_crm.len(),
        renewal_mismatch: renewal_mismatch.len(),
        invalid_picklist_values: distinct_invalid_values.len(),
        attempts: cycle.attempts,
    };

    RunReport {
        success,
        skipped,
        closed,
        already_closed,
        failed,
        renewal_mismatch,
        unmatched_feed: partition.unmatched_external,
        unmatched_crm: partition.unmatched_crm,
        invalid_picklist,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::records::{FieldKey, FieldValue, OrderStatus};
    use crate::engine::matcher::MatchedPair;
    use crate::engine::planner::{PlannedPass, UpdateIntent};
    use std::collections::BTreeMap;

    fn make_external(key: &str, renewed: bool) -> ExternalRecord {
        ExternalRecord {
            registration: key.to_string(),
            lease_start: None,
            lease_end: None,
            return_date: None,
            odometer: None,
            renewed,
            termination_reason: None,
            extra_costs: None,
        }
    }

    fn make_crm(id: &str, key: &str, status: OrderStatus) -> CrmRecord {
        CrmRecord {
            id: id.to_string(),
            registration: key.to_string(),
            status,
            return_date: None,
            odometer: None,
            renewed: Some(false),
            termination_reason: None,
            extra_costs: None,
        }
    }

    fn make_intent(id: &str, key: &str, status_only: bool) -> UpdateIntent {
        let mut fields = BTreeMap::new();
        fields.insert(FieldKey::Status, FieldValue::Status(OrderStatus::Closed));
        if !status_only {
            fields.insert(FieldKey::Odometer, FieldValue::Int(1));
        }
        UpdateIntent {
            id: id.to_string(),
            registration: key.to_string(),
            fields,
        }
    }

    /// Four matched records: one per terminal bucket.
    fn make_fixture() -> (MatchPartition, CycleResult) {
        let partition = MatchPartition {
            matched: vec![
                MatchedPair {
                    external: make_external("OK", false),
                    crm: make_crm("R1", "OK", OrderStatus::Open),
                },
                MatchedPair {
                    external: make_external("SKIP", false),
                    crm: make_crm("R2", "SKIP", OrderStatus::Open),
                },
                MatchedPair {
                    external: make_external("DONE", false),
                    crm: make_crm("R3", "DONE", OrderStatus::Closed),
                },
                MatchedPair {
                    external: make_external("BAD", false),
                    crm: make_crm("R4", "BAD", OrderStatus::Open),
                },
            ],
            unmatched_external: vec![make_external("LOST", false)],
            unmatched_crm: vec![make_crm("R9", "CRMONLY", OrderStatus::Open)],
        };

        let cycle = CycleResult {
            pass: PlannedPass {
                writes: vec![make_intent("R1", "OK", false), make_intent("R4", "BAD", false)],
                skipped: vec![make_intent("R2", "SKIP", true)],
                already_closed: vec!["R3".to_string()],
                closing: vec!["R1".to_string(), "R2".to_string(), "R4".to_string()],
            },
            outcomes: vec![
                Outcome::success("R1"),
                Outcome::failure("R4", "INVALID_FIELD"),
            ],
            attempts: 3,
        };

        (partition, cycle)
    }

    #[test]
    fn test_bucket_exclusivity() {
        let (partition, cycle) = make_fixture();
        let report = classify_run(partition, cycle, vec![]);

        assert_eq!(report.success.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.already_closed.len(), 1);
        assert_eq!(report.failed.len(), 1);

        // Every matched record lands in exactly one terminal bucket
        let mut ids: Vec<&str> = report
            .success
            .iter()
            .chain(&report.skipped)
            .chain(&report.already_closed)
            .chain(&report.failed)
            .map(|r| r.id.as_str())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["R1", "R2", "R3", "R4"]);
    }

    #[test]
    fn test_closed_mirrors_planner_closing_set() {
        let (partition, cycle) = make_fixture();
        let mut expected: Vec<String> = cycle.pass.closing.clone();
        expected.sort();

        let report = classify_run(partition, cycle, vec![]);

        let mut closed_ids: Vec<String> = report.closed.iter().map(|r| r.id.clone()).collect();
        closed_ids.sort();
        // Success, skipped and failed all attempted a close; R3 did not
        assert_eq!(closed_ids, expected);
    }

    #[test]
    fn test_renewal_mismatch_only_for_open_records() {
        let (mut partition, cycle) = make_fixture();
        // Feed says renewed for an open and a closed record
        partition.matched[0].external.renewed = true; // R1, open
        partition.matched[2].external.renewed = true; // R3, closed

        let report = classify_run(partition, cycle, vec![]);
        let ids: Vec<&str> = report.renewal_mismatch.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["R1"]);
    }

    #[test]
    fn test_summary_counters() {
        let (partition, cycle) = make_fixture();
        let invalid = vec![
            ExternalRecord {
                termination_reason: Some("Alluvione".to_string()),
                ..make_external("A", false)
            },
            ExternalRecord {
                termination_reason: Some("Alluvione".to_string()),
                ..make_external("B", false)
            },
            ExternalRecord {
                termination_reason: Some("Meteorite".to_string()),
                ..make_external("C", false)
            },
        ];

        let report = classify_run(partition, cycle, invalid);
        let s = &report.summary;
        assert_eq!(s.acquired, 5); // 4 matched + 1 feed-only
        assert_eq!(s.success, 1);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.already_closed, 1);
        assert_eq!(s.closed, 3);
        assert_eq!(s.unmatched_feed, 1);
        assert_eq!(s.unmatched_crm, 1);
        assert_eq!(s.invalid_picklist_values, 2); // distinct values, not rows
        assert_eq!(s.attempts, 3);
    }

    #[test]
    fn test_failure_description_carried_through() {
        let (partition, cycle) = make_fixture();
        let report = classify_run(partition, cycle, vec![]);
        assert_eq!(report.failed[0].status_description, "INVALID_FIELD");
    }
}
