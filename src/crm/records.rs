//! CRM order record model and the typed field values exchanged with it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a CRM order record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order is still running and may be updated.
    Open,
    /// Order has been closed out; no further writes.
    Closed,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "Open"),
            OrderStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// Logical keys for the business fields carried by both the feed and the CRM.
///
/// Wire-level field names are a configuration concern (see `FieldMap`); the
/// engine only ever diffs and plans against these keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldKey {
    /// Date the vehicle was returned (written to the contract end date).
    ReturnDate,
    /// Odometer reading at return.
    Odometer,
    /// Whether the lease was renewed.
    Renewed,
    /// Free-text termination reason (picklist-backed in the CRM).
    TerminationReason,
    /// Extra out-of-contract costs, 2 decimal places.
    ExtraCosts,
    /// Order status; only ever written as the forced close transition.
    Status,
}

impl FieldKey {
    /// Business fields the planner diffs. Status is excluded: it is forced,
    /// never compared.
    pub const DIFFABLE: [FieldKey; 5] = [
        FieldKey::ReturnDate,
        FieldKey::Odometer,
        FieldKey::Renewed,
        FieldKey::TerminationReason,
        FieldKey::ExtraCosts,
    ];

    /// Stable lowercase name, used for logging and config lookup.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKey::ReturnDate => "return_date",
            FieldKey::Odometer => "odometer",
            FieldKey::Renewed => "renewed",
            FieldKey::TerminationReason => "termination_reason",
            FieldKey::ExtraCosts => "extra_costs",
            FieldKey::Status => "status",
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A typed field value as it flows through diffing and update intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Status(OrderStatus),
}

impl FieldValue {
    /// JSON representation for the update payload. Dates use the CRM's
    /// `YYYY-MM-DD` convention; status strings are substituted by the
    /// session's field map at the wire boundary.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::json!(*i),
            FieldValue::Float(f) => serde_json::json!(*f),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Status(s) => serde_json::Value::String(s.to_string()),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Status(s) => write!(f, "{}", s),
        }
    }
}

/// One order record fetched from the CRM. Immutable snapshot for the run;
/// the diff planner compares feed rows against exactly this state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmRecord {
    /// CRM-side unique record identifier.
    pub id: String,
    /// Vehicle registration, the business key (stored uppercased).
    pub registration: String,
    pub status: OrderStatus,
    pub return_date: Option<NaiveDate>,
    pub odometer: Option<i64>,
    pub renewed: Option<bool>,
    pub termination_reason: Option<String>,
    pub extra_costs: Option<f64>,
}

impl CrmRecord {
    /// Current CRM value for a business field, if set.
    pub fn value_of(&self, key: FieldKey) -> Option<FieldValue> {
        match key {
            FieldKey::ReturnDate => self.return_date.map(FieldValue::Date),
            FieldKey::Odometer => self.odometer.map(FieldValue::Int),
            FieldKey::Renewed => self.renewed.map(FieldValue::Bool),
            FieldKey::TerminationReason => {
                self.termination_reason.clone().map(FieldValue::Text)
            }
            FieldKey::ExtraCosts => self.extra_costs.map(FieldValue::Float),
            FieldKey::Status => Some(FieldValue::Status(self.status)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == OrderStatus::Closed
    }
}
