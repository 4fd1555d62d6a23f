//! Whole-cycle retry around planning and execution.
//!
//! The entire plan-and-execute pass is repeated, up to the configured
//! attempt ceiling, while any executed intent reports non-success. Attempts
//! never overlap. By default every attempt re-plans against the CRM snapshot
//! fetched at the start of the run (the source system's stale-snapshot
//! behavior, kept deliberately: re-reading would change observable
//! skip/close decisions); `retry.refresh_snapshot` opts into re-fetching
//! between attempts. Failures that survive the last attempt are accepted as
//! terminal Failed outcomes, not a run failure.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use rand::Rng;

use crate::config::{RetryConfig, RunConfig};
use crate::crm::session::CrmSession;

use super::executor::{execute_pass, Outcome};
use super::matcher::MatchedPair;
use super::planner::{plan_updates, PlannedPass};

/// Final state of the retry loop: the last pass's plan and the outcomes of
/// its executed writes.
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub pass: PlannedPass,
    /// Outcomes of the final attempt's executed intents only; skipped
    /// records get their synthetic outcomes during classification.
    pub outcomes: Vec<Outcome>,
    pub attempts: u32,
}

/// Delay before retry attempt `attempt` (2-based: the first retry).
fn delay_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
    if config.base_delay_ms == 0 {
        return Duration::ZERO;
    }
    let exponent = attempt.saturating_sub(2);
    let mut delay_ms =
        config.base_delay_ms as f64 * config.backoff_multiplier.powi(exponent as i32);
    if config.jitter {
        delay_ms *= rand::rng().random_range(0.5..1.5);
    }
    Duration::from_millis(delay_ms as u64)
}

/// Refresh the snapshot half of the matched pairs from the CRM.
async fn refresh_pairs(session: &dyn CrmSession, matched: &mut [MatchedPair]) -> Result<()> {
    let keys: Vec<String> = matched.iter().map(|p| p.crm.registration.clone()).collect();
    let fresh = session.fetch_records(&keys).await?;
    let mut by_key: HashMap<String, _> = fresh
        .into_iter()
        .map(|r| (r.registration.clone(), r))
        .collect();

    for pair in matched.iter_mut() {
        if let Some(record) = by_key.remove(&pair.crm.registration) {
            pair.crm = record;
        }
    }
    Ok(())
}

/// Run the plan-and-execute cycle with bounded retries.
pub async fn run_update_cycle(
    session: &dyn CrmSession,
    mut matched: Vec<MatchedPair>,
    config: &RunConfig,
) -> Result<CycleResult> {
    let max_attempts = config.retry.max_attempts.max(1);
    let mut pass = PlannedPass::default();
    let mut outcomes: Vec<Outcome> = Vec::new();
    let mut attempts_used = 0;

    for attempt in 1..=max_attempts {
        attempts_used = attempt;
        if attempt > 1 {
            let delay = delay_for_attempt(&config.retry, attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if config.retry.refresh_snapshot {
                refresh_pairs(session, &mut matched).await?;
            }
        }

        pass = plan_updates(&matched);
        if pass.writes.is_empty() {
            outcomes = Vec::new();
            break;
        }

        outcomes = execute_pass(session, &pass.writes, &config.executor).await;

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        if failed == 0 {
            info!("All {} updates succeeded on attempt {}", outcomes.len(), attempt);
            return Ok(CycleResult {
                pass,
                outcomes,
                attempts: attempt,
            });
        }

        if attempt < max_attempts {
            warn!(
                "{} updates failed on attempt {}/{}, retrying",
                failed, attempt, max_attempts
            );
        } else {
            warn!(
                "{} updates still failing after {} attempts, accepting as Failed",
                failed, max_attempts
            );
        }
    }

    Ok(CycleResult {
        pass,
        outcomes,
        attempts: attempts_used,
    })
}
