//! Reconciliation engine: matching, picklist validation, diff planning,
//! bounded execution, whole-cycle retry, and outcome classification.

pub mod classify;
pub mod executor;
pub mod matcher;
pub mod picklist;
pub mod planner;
pub mod retry;

pub use classify::{classify_run, Bucket, ReportRow, RunReport, RunSummary};
pub use executor::{execute_pass, Outcome};
pub use matcher::{match_records, MatchPartition, MatchedPair};
pub use picklist::{invalid_reason_records, unified_allowed_values, PicklistError};
pub use planner::{plan_updates, PlannedPass, UpdateIntent};
pub use retry::{run_update_cycle, CycleResult};
