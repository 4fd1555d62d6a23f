//! Lease return reconciliation against a CRM.
//!
//! Takes the lessor's end-of-contract feed (an XLSX workbook), matches
//! each row to its CRM order by vehicle registration, plans the minimal
//! field updates plus the forced close transition, executes them with
//! bounded concurrency and whole-cycle retry, and emits an XLSX report
//! classifying every record.

pub mod config;
pub mod crm;
pub mod engine;
pub mod feed;
pub mod pipeline;
pub mod report;

pub use config::RunConfig;
pub use pipeline::run_pipeline;
