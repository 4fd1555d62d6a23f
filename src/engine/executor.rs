//! Update Executor: applies write-bound intents against the CRM with
//! bounded parallelism.
//!
//! Each intent is an independent, atomic per-record update. A semaphore
//! bounds how many calls are in flight; the fan-out blocks until every call
//! has drained, then hands the per-record outcomes back in one batch.
//! Ordering across records is not guaranteed; outcomes correlate by id.

use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::ExecutorConfig;
use crate::crm::session::CrmSession;

use super::planner::UpdateIntent;

/// Result of one update attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    /// CRM record identifier.
    pub id: String,
    /// 200 on an acknowledged write (or a synthetic skip), 400 otherwise.
    pub status_code: u16,
    pub description: String,
}

impl Outcome {
    pub fn success(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_code: 200,
            description: "Success".to_string(),
        }
    }

    /// Synthetic outcome for records skipped by the planner.
    pub fn skipped(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_code: 200,
            description: "Skipped".to_string(),
        }
    }

    pub fn failure(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_code: 400,
            description: description.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Execute one batch of intents. Per-record faults become failure outcomes;
/// they never interrupt sibling records.
pub async fn execute_pass(
    session: &dyn CrmSession,
    intents: &[UpdateIntent],
    config: &ExecutorConfig,
) -> Vec<Outcome> {
    if intents.is_empty() {
        return Vec::new();
    }

    let permits = if config.enabled {
        config.max_concurrent.max(1)
    } else {
        1
    };
    let semaphore = Arc::new(Semaphore::new(permits));

    debug!(
        "Dispatching {} updates across {} worker slots",
        intents.len(),
        permits
    );

    let tasks = intents.iter().map(|intent| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire_owned().await.unwrap();
            apply_one(session, intent).await
        }
    });

    let outcomes = join_all(tasks).await;

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        warn!("{}/{} updates failed this pass", failed, outcomes.len());
    }
    outcomes
}

async fn apply_one(session: &dyn CrmSession, intent: &UpdateIntent) -> Outcome {
    match session.update_record(&intent.id, &intent.fields).await {
        Ok(ack) if ack.success => Outcome::success(&intent.id),
        Ok(ack) => {
            let description = match (ack.status_code, ack.raw_response) {
                (Some(code), Some(body)) => format!("HTTP {}: {}", code, body),
                (Some(code), None) => format!("HTTP {}", code),
                (None, Some(body)) => body,
                (None, None) => "update rejected".to_string(),
            };
            Outcome::failure(&intent.id, description)
        }
        Err(e) => Outcome::failure(&intent.id, format!("{:#}", e)),
    }
}
