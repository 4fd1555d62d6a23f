//! Run summary notification.
//!
//! The engine produces a payload; where it goes is a deployment concern
//! behind `ReportSink`. The default sink drops the summary next to the
//! workbook so unattended runs leave a readable trail.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::engine::classify::RunSummary;

/// Human-readable run notification with the workbook attached by path.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub subject: String,
    pub body: String,
    pub attachment: PathBuf,
}

impl NotificationPayload {
    /// Render the standard summary notification for a finished run.
    pub fn from_summary(
        summary: &RunSummary,
        report_path: &Path,
        started_at: DateTime<Local>,
    ) -> Self {
        let finished_at = chrono::Local::now();
        let body = format!(
            "Lease return reconciliation finished.\n\
             \n\
             Started:                  {}\n\
             Finished:                 {}\n\
             \n\
             Feed records acquired:    {}\n\
             Updated successfully:     {}\n\
             Skipped (no changes):     {}\n\
             Update failures:          {}\n\
             Closed this run:          {}\n\
             Already closed:           {}\n\
             Unmatched feed records:   {}\n\
             CRM records not in feed:  {}\n\
             Renewal flag mismatches:  {}\n\
             Invalid picklist values:  {}\n\
             Update cycle attempts:    {}\n",
            started_at.format("%Y-%m-%d %H:%M:%S"),
            finished_at.format("%Y-%m-%d %H:%M:%S"),
            summary.acquired,
            summary.success,
            summary.skipped,
            summary.failed,
            summary.closed,
            summary.already_closed,
            summary.unmatched_feed,
            summary.unmatched_crm,
            summary.renewal_mismatch,
            summary.invalid_picklist_values,
            summary.attempts,
        );

        Self {
            subject: format!(
                "Lease return reconciliation {}",
                finished_at.format("%Y-%m-%d")
            ),
            body,
            attachment: report_path.to_path_buf(),
        }
    }

    /// Render the notification for an aborted run. Carries the triggering
    /// description so unattended runs surface why nothing was written.
    pub fn from_failure(description: &str, report_path: &Path) -> Self {
        let now = chrono::Local::now();
        Self {
            subject: format!("Lease return reconciliation FAILED {}", now.format("%Y-%m-%d")),
            body: format!(
                "Lease return reconciliation aborted {}.\n\nReason: {}\n",
                now.format("%Y-%m-%d %H:%M:%S"),
                description
            ),
            attachment: report_path.to_path_buf(),
        }
    }
}

/// Delivery channel for the run notification.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()>;
}

/// Writes the notification body as a text file beside the workbook.
pub struct FileSystemSink;

#[async_trait]
impl ReportSink for FileSystemSink {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()> {
        let path = payload.attachment.with_extension("summary.txt");
        tokio::fs::write(&path, format!("{}\n\n{}", payload.subject, payload.body))
            .await
            .with_context(|| format!("Failed to write run summary: {}", path.display()))?;
        log::info!("Run summary written to: {}", path.display());
        Ok(())
    }
}
