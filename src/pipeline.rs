//! End-to-end run orchestration.
//!
//! Wires the stages together: normalize the feed, validate the picklist,
//! fetch and match the CRM snapshot, run the retried update cycle, then
//! classify everything into the run report. The caller owns I/O at both
//! ends (reading the feed workbook, writing the report).

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::RunConfig;
use crate::crm::session::CrmSession;
use crate::engine::classify::{classify_run, RunReport};
use crate::engine::matcher::match_records;
use crate::engine::picklist::{invalid_reason_records, unified_allowed_values};
use crate::engine::retry::run_update_cycle;
use crate::feed::normalize::normalize_rows;
use crate::feed::reader::RawRow;

/// Run one full reconciliation over the given feed rows.
///
/// An empty feed short-circuits to an empty report without touching the
/// CRM. Normalization failures, picklist inconsistencies and snapshot
/// fetch faults abort the run; per-record update faults do not.
pub async fn run_pipeline(
    session: &dyn CrmSession,
    raw_rows: &[RawRow],
    config: &RunConfig,
) -> Result<RunReport> {
    if raw_rows.is_empty() {
        info!("Feed is empty, nothing to reconcile");
        return Ok(RunReport::default());
    }

    let records = normalize_rows(raw_rows, &config.renewal_token)
        .context("Feed normalization failed")?;
    info!("Normalized {} feed rows", records.len());

    // Advisory picklist check on the termination reason field. Each
    // record type must expose the same allowed set.
    let reason_field = &config.fields.termination_reason;
    let picklists = session
        .describe_picklist(&config.object, reason_field)
        .await
        .with_context(|| format!("Failed to describe picklist '{}'", reason_field))?;

    let record_types = session.list_record_types(&config.object).await?;
    let covered: HashSet<&str> = picklists
        .iter()
        .map(|p| p.record_type_id.as_str())
        .collect();
    for record_type in &record_types {
        if !covered.contains(record_type.as_str()) {
            warn!(
                "Record type '{}' has no picklist variant for '{}'",
                record_type, reason_field
            );
        }
    }

    let allowed = unified_allowed_values(reason_field, &picklists)?;
    let invalid = invalid_reason_records(&records, &allowed);
    if !invalid.is_empty() {
        warn!(
            "{} feed records carry a termination reason outside the picklist",
            invalid.len()
        );
    }

    // One snapshot fetch for the whole run; the matcher dedupes keys on
    // its side, the fetch just needs each key once.
    let mut seen = HashSet::new();
    let keys: Vec<String> = records
        .iter()
        .filter(|r| seen.insert(r.registration.clone()))
        .map(|r| r.registration.clone())
        .collect();

    let crm_records = session
        .fetch_records(&keys)
        .await
        .context("Failed to fetch CRM snapshot")?;
    info!(
        "Fetched {} CRM records for {} distinct keys",
        crm_records.len(),
        keys.len()
    );

    let partition = match_records(records, crm_records);
    info!(
        "Matched {} records ({} feed-only, {} CRM-only)",
        partition.matched.len(),
        partition.unmatched_external.len(),
        partition.unmatched_crm.len()
    );

    let cycle = run_update_cycle(session, partition.matched.clone(), config).await?;
    let report = classify_run(partition, cycle, invalid);

    info!(
        "Run finished: {} success, {} skipped, {} already closed, {} failed ({} attempts)",
        report.summary.success,
        report.summary.skipped,
        report.summary.already_closed,
        report.summary.failed,
        report.summary.attempts
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::records::{CrmRecord, FieldKey, FieldValue, OrderStatus};
    use crate::crm::session::{RecordTypePicklist, UpdateAck};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSession {
        crm: Vec<CrmRecord>,
        picklists: Vec<RecordTypePicklist>,
        reject_updates: bool,
        fetch_calls: AtomicUsize,
        update_calls: AtomicUsize,
    }

    impl StubSession {
        fn new(crm: Vec<CrmRecord>, allowed: Vec<&'static str>) -> Self {
            Self {
                crm,
                picklists: vec![make_picklist("default", &allowed)],
                reject_updates: false,
                fetch_calls: AtomicUsize::new(0),
                update_calls: AtomicUsize::new(0),
            }
        }
    }

    fn make_picklist(record_type: &str, values: &[&str]) -> RecordTypePicklist {
        RecordTypePicklist {
            record_type_id: record_type.to_string(),
            allowed_values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[async_trait]
    impl CrmSession for StubSession {
        async fn fetch_records(&self, _keys: &[String]) -> Result<Vec<CrmRecord>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.crm.clone())
        }

        async fn update_record(
            &self,
            _id: &str,
            _fields: &BTreeMap<FieldKey, FieldValue>,
        ) -> Result<UpdateAck> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_updates {
                Ok(UpdateAck::rejected(Some(500), "UNABLE_TO_LOCK_ROW"))
            } else {
                Ok(UpdateAck::ok(204))
            }
        }

        async fn describe_picklist(
            &self,
            _object: &str,
            _field: &str,
        ) -> Result<Vec<RecordTypePicklist>> {
            Ok(self.picklists.clone())
        }

        async fn list_record_types(&self, _object: &str) -> Result<Vec<String>> {
            Ok(self.picklists.iter().map(|p| p.record_type_id.clone()).collect())
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

    fn make_row(key: &str, odometer: &str) -> RawRow {
        RawRow {
            registration: Some(key.to_string()),
            odometer: Some(odometer.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_feed_short_circuits() {
        let session = StubSession::new(vec![], vec![]);
        let config = RunConfig::default();

        let report = run_pipeline(&session, &[], &config).await.unwrap();

        assert_eq!(report.summary.acquired, 0);
        assert_eq!(session.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.update_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_full_run_classifies_all_records() {
        let session = StubSession::new(
            vec![
                make_crm("R1", "AB123CD", OrderStatus::Open),
                make_crm("R2", "EF456GH", OrderStatus::Closed),
                make_crm("R3", "ZZ999ZZ", OrderStatus::Open),
            ],
            vec!["Fine Contratto"],
        );
        let config = RunConfig::default();

        let rows = vec![
            make_row("ab123cd", "15000"), // open, odometer delta
            make_row("EF456GH", "20000"), // already closed
            make_row("XX000XX", "1"),     // no CRM counterpart
        ];

        let report = run_pipeline(&session, &rows, &config).await.unwrap();

        assert_eq!(report.summary.acquired, 3);
        assert_eq!(report.summary.success, 1);
        assert_eq!(report.summary.already_closed, 1);
        assert_eq!(report.summary.unmatched_feed, 1);
        assert_eq!(report.summary.unmatched_crm, 1); // R3 never in the feed
        assert_eq!(session.update_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_picklists_abort_before_any_write() {
        let mut session = StubSession::new(
            vec![make_crm("R1", "AB123CD", OrderStatus::Open)],
            vec!["Fine Contratto"],
        );
        session
            .picklists
            .push(make_picklist("fleet", &["Sinistro Totale"]));
        let config = RunConfig::default();

        let rows = vec![make_row("AB123CD", "15000")];
        let err = run_pipeline(&session, &rows, &config).await.unwrap_err();

        assert!(err.to_string().contains("record type 'fleet'"));
        // The run dies at validation: no snapshot fetch, no writes
        assert_eq!(session.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.update_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_persistent_failures_do_not_fail_the_run() {
        let mut session = StubSession::new(
            vec![make_crm("R1", "AB123CD", OrderStatus::Open)],
            vec!["Fine Contratto"],
        );
        session.reject_updates = true;
        let config = RunConfig::default();

        let rows = vec![make_row("AB123CD", "15000")];
        let report = run_pipeline(&session, &rows, &config).await.unwrap();

        // Failures surviving the retry ceiling are a terminal bucket,
        // not an error from the pipeline
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.success, 0);
        assert_eq!(report.summary.attempts, 3);
    }

    #[tokio::test]
    async fn test_invalid_reason_reported_but_not_blocking() {
        let session = StubSession::new(
            vec![make_crm("R1", "AB123CD", OrderStatus::Open)],
            vec!["Fine Contratto"],
        );
        let config = RunConfig::default();

        let mut row = make_row("AB123CD", "15000");
        row.reason = Some("sinistro totale".to_string());

        let report = run_pipeline(&session, &[row], &config).await.unwrap();

        // Title-cased value is not in the picklist: advisory bucket only
        assert_eq!(report.invalid_picklist.len(), 1);
        assert_eq!(
            report.invalid_picklist[0].termination_reason.as_deref(),
            Some("Sinistro Totale")
        );
        assert_eq!(report.summary.success, 1);
    }
}
