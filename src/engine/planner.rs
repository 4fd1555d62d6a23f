//! Diff & Update Planner.
//!
//! For every matched pair, decides whether the CRM record is already closed,
//! needs a write, or needs nothing beyond the forced close transition:
//!
//! - CRM status Closed -> no write planned (AlreadyClosed)
//! - otherwise the intent forces `Status = Closed`, then picks up exactly the
//!   business fields whose feed value is non-null and differs from the CRM's
//!   current value
//! - an intent whose field set is only the forced status means no business
//!   field changed: the record is Skipped with a synthetic success outcome
//!   and never reaches the executor
//!
//! The status field itself is never diffed, only forced.

use std::collections::BTreeMap;

use log::debug;

use crate::crm::records::{FieldKey, FieldValue, OrderStatus};

use super::matcher::MatchedPair;

/// Planned set of field writes for one record. Consumed by the executor and
/// discarded; rebuilt from scratch on every retry pass.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateIntent {
    /// CRM record identifier; always part of the write.
    pub id: String,
    /// Business key, carried for correlation and reporting only.
    pub registration: String,
    /// Field deltas. Always contains the forced `Status` key.
    pub fields: BTreeMap<FieldKey, FieldValue>,
}

impl UpdateIntent {
    /// True when the only planned key is the forced status transition,
    /// i.e. no business field changed. The literal skip boundary.
    pub fn is_status_only(&self) -> bool {
        self.fields.len() == 1 && self.fields.contains_key(&FieldKey::Status)
    }
}

/// One planning pass over the matched set. The three groups are disjoint and
/// cover every matched pair.
#[derive(Debug, Clone, Default)]
pub struct PlannedPass {
    /// Intents with at least one business-field delta, bound for the executor.
    pub writes: Vec<UpdateIntent>,
    /// Status-only intents: classified Skipped, not executed.
    pub skipped: Vec<UpdateIntent>,
    /// CRM ids already closed before this run; nothing planned.
    pub already_closed: Vec<String>,
    /// CRM ids for which a close transition was planned this pass
    /// (writes and skipped alike).
    pub closing: Vec<String>,
}

/// Plan one pass against the in-memory CRM snapshot.
pub fn plan_updates(matched: &[MatchedPair]) -> PlannedPass {
    let mut pass = PlannedPass::default();

    for pair in matched {
        if pair.crm.is_closed() {
            pass.already_closed.push(pair.crm.id.clone());
            continue;
        }

        let mut fields = BTreeMap::new();
        fields.insert(FieldKey::Status, FieldValue::Status(OrderStatus::Closed));

        for key in FieldKey::DIFFABLE {
            let Some(feed_value) = pair.external.value_of(key) else {
                continue;
            };
            if pair.crm.value_of(key).as_ref() != Some(&feed_value) {
                fields.insert(key, feed_value);
            }
        }

        let intent = UpdateIntent {
            id: pair.crm.id.clone(),
            registration: pair.crm.registration.clone(),
            fields,
        };

        pass.closing.push(intent.id.clone());
        if intent.is_status_only() {
            debug!("{} ({}): no field delta, skipping", intent.registration, intent.id);
            pass.skipped.push(intent);
        } else {
            debug!(
                "{} ({}): planning {} field writes",
                intent.registration,
                intent.id,
                intent.fields.len()
            );
            pass.writes.push(intent);
        }
    }

    log::info!(
        "Planned pass: {} writes, {} skipped, {} already closed",
        pass.writes.len(),
        pass.skipped.len(),
        pass.already_closed.len()
    );
    pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::records::CrmRecord;
    use crate::feed::normalize::ExternalRecord;
    use chrono::NaiveDate;

    fn make_pair() -> MatchedPair {
        MatchedPair {
            external: ExternalRecord {
                registration: "AB123CD".to_string(),
                lease_start: None,
                lease_end: None,
                return_date: Some(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()),
                odometer: Some(15000),
                renewed: true,
                termination_reason: Some("Incidente".to_string()),
                extra_costs: None,
            },
            crm: CrmRecord {
                id: "R1".to_string(),
                registration: "AB123CD".to_string(),
                status: OrderStatus::Open,
                return_date: None,
                odometer: None,
                renewed: Some(false),
                termination_reason: None,
                extra_costs: None,
            },
        }
    }

    #[test]
    fn test_open_record_with_deltas_is_planned_for_write() {
        let pass = plan_updates(&[make_pair()]);

        assert_eq!(pass.writes.len(), 1);
        assert!(pass.skipped.is_empty());
        assert!(pass.already_closed.is_empty());
        assert_eq!(pass.closing, vec!["R1".to_string()]);

        let intent = &pass.writes[0];
        assert_eq!(intent.id, "R1");
        assert_eq!(
            intent.fields.get(&FieldKey::Status),
            Some(&FieldValue::Status(OrderStatus::Closed))
        );
        assert_eq!(intent.fields.get(&FieldKey::Odometer), Some(&FieldValue::Int(15000)));
        assert_eq!(intent.fields.get(&FieldKey::Renewed), Some(&FieldValue::Bool(true)));
        assert_eq!(
            intent.fields.get(&FieldKey::TerminationReason),
            Some(&FieldValue::Text("Incidente".to_string()))
        );
        assert_eq!(
            intent.fields.get(&FieldKey::ReturnDate),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()))
        );
        // Null feed value never enters the intent
        assert!(!intent.fields.contains_key(&FieldKey::ExtraCosts));
    }

    #[test]
    fn test_closed_record_is_left_alone() {
        let mut pair = make_pair();
        pair.crm.status = OrderStatus::Closed;

        let pass = plan_updates(&[pair]);
        assert!(pass.writes.is_empty());
        assert!(pass.skipped.is_empty());
        assert!(pass.closing.is_empty());
        assert_eq!(pass.already_closed, vec!["R1".to_string()]);
    }

    #[test]
    fn test_no_delta_is_skipped_with_status_only_intent() {
        let mut pair = make_pair();
        // Mirror the feed values into the CRM record
        pair.crm.return_date = pair.external.return_date;
        pair.crm.odometer = pair.external.odometer;
        pair.crm.renewed = Some(pair.external.renewed);
        pair.crm.termination_reason = pair.external.termination_reason.clone();

        let pass = plan_updates(&[pair]);
        assert!(pass.writes.is_empty());
        assert_eq!(pass.skipped.len(), 1);
        assert!(pass.skipped[0].is_status_only());
        // A skipped record still counts as a close attempt
        assert_eq!(pass.closing, vec!["R1".to_string()]);
    }

    #[test]
    fn test_diff_minimality_equal_values_excluded() {
        let mut pair = make_pair();
        pair.crm.odometer = Some(15000);

        let pass = plan_updates(&[pair]);
        let intent = &pass.writes[0];
        assert!(!intent.fields.contains_key(&FieldKey::Odometer));
        assert!(intent.fields.contains_key(&FieldKey::Renewed));
    }

    #[test]
    fn test_skip_exactness_boundary() {
        // One differing field is enough to leave the skip path
        let mut pair = make_pair();
        pair.crm.return_date = pair.external.return_date;
        pair.crm.odometer = pair.external.odometer;
        pair.crm.renewed = Some(pair.external.renewed);
        pair.crm.termination_reason = Some("Furto".to_string());

        let pass = plan_updates(&[pair]);
        assert_eq!(pass.writes.len(), 1);
        let keys: Vec<FieldKey> = pass.writes[0].fields.keys().copied().collect();
        assert_eq!(keys, vec![FieldKey::TerminationReason, FieldKey::Status]);
    }
}
