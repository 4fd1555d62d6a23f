//! Report output: the XLSX workbook and the run summary notification.

pub mod excel;
pub mod notify;

pub use excel::export_report;
pub use notify::{FileSystemSink, NotificationPayload, ReportSink};
