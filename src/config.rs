//! Run configuration: retry and concurrency knobs plus the external-column
//! to CRM-field mapping, loaded from a TOML file with sane defaults.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crm::records::FieldKey;

/// Top-level configuration for one reconciliation run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// CRM object the orders live on.
    pub object: String,
    /// Business keys per snapshot fetch request.
    pub chunk_size: usize,
    /// Feed token that marks a renewed lease (case-insensitive exact match).
    pub renewal_token: String,
    pub executor: ExecutorConfig,
    pub retry: RetryConfig,
    pub fields: FieldMap,
}

/// Bounded parallelism for the update fan-out.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum in-flight update calls.
    pub max_concurrent: usize,
    /// Disable to run updates strictly one at a time.
    pub enabled: bool,
}

/// Whole-cycle retry policy: the plan-and-execute pass is repeated while any
/// executed intent reports non-success.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Delay before each retry attempt, milliseconds. 0 matches the original
    /// brute-force loop.
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Re-fetch the CRM snapshot between attempts instead of re-planning
    /// against the stale first fetch. Off by default: the stale-snapshot
    /// behavior is a documented limitation of the source system and changing
    /// it changes observable skip/close decisions.
    pub refresh_snapshot: bool,
}

/// Maps the engine's logical field keys to CRM wire field names, and carries
/// the CRM's status vocabulary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub id: String,
    pub registration: String,
    pub status: String,
    /// Wire value meaning "still running".
    pub status_open: String,
    /// Wire value written by the forced close transition.
    pub status_closed: String,
    pub return_date: String,
    pub odometer: String,
    pub renewed: String,
    pub termination_reason: String,
    pub extra_costs: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            object: "order".to_string(),
            chunk_size: 200,
            renewal_token: "RINNOVATO".to_string(),
            executor: ExecutorConfig::default(),
            retry: RetryConfig::default(),
            fields: FieldMap::default(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            enabled: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 0,
            backoff_multiplier: 2.0,
            jitter: false,
            refresh_snapshot: false,
        }
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            id: "Id".to_string(),
            registration: "vehicle_registration".to_string(),
            status: "status".to_string(),
            status_open: "Open".to_string(),
            status_closed: "Closed".to_string(),
            return_date: "contract_end_date".to_string(),
            odometer: "return_odometer".to_string(),
            renewed: "renewed".to_string(),
            termination_reason: "termination_reason".to_string(),
            extra_costs: "extra_contract_costs".to_string(),
        }
    }
}

impl FieldMap {
    /// Wire field name for a logical key.
    pub fn wire_name(&self, key: FieldKey) -> &str {
        match key {
            FieldKey::ReturnDate => &self.return_date,
            FieldKey::Odometer => &self.odometer,
            FieldKey::Renewed => &self.renewed,
            FieldKey::TerminationReason => &self.termination_reason,
            FieldKey::ExtraCosts => &self.extra_costs,
            FieldKey::Status => &self.status,
        }
    }
}

impl RunConfig {
    /// Load from a TOML file; missing keys fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: RunConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}
