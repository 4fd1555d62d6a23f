//! Record Normalizer: turns raw string-typed feed rows into typed,
//! immutable `ExternalRecord`s.
//!
//! Coercion contract (matches the upstream feed semantics):
//! - business key uppercased, required per row
//! - date cells parse strictly; a present-but-malformed date aborts the batch
//! - odometer and money cells degrade to `None` when unparsable
//! - the renewal flag is a case-insensitive exact match against a known
//!   token, anything else (including null) is `false`
//! - the termination reason is title-cased

use chrono::NaiveDate;

use crate::crm::records::{FieldKey, FieldValue};

use super::reader::RawRow;

/// Malformed required input; aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// A required column is absent from the feed header row.
    MissingColumn { column: String },
    /// A data row carries no business key.
    MissingKey { row: usize },
    /// A date cell is present but does not match the expected format.
    BadDate {
        column: &'static str,
        value: String,
        row: usize,
    },
}

impl std::fmt::Display for NormalizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizationError::MissingColumn { column } => {
                write!(f, "feed is missing required column '{}'", column)
            }
            NormalizationError::MissingKey { row } => {
                write!(f, "feed row {} has no vehicle registration", row)
            }
            NormalizationError::BadDate { column, value, row } => {
                write!(
                    f,
                    "feed row {}: column '{}' holds unparsable date '{}'",
                    row, column, value
                )
            }
        }
    }
}

impl std::error::Error for NormalizationError {}

/// One normalized feed row. Immutable after construction; lives for the
/// duration of a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRecord {
    /// Vehicle registration, uppercased. The business key.
    pub registration: String,
    pub lease_start: Option<NaiveDate>,
    pub lease_end: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub odometer: Option<i64>,
    /// Derived boolean; never null.
    pub renewed: bool,
    /// Title-cased free text.
    pub termination_reason: Option<String>,
    /// Rounded to 2 decimal places.
    pub extra_costs: Option<f64>,
}

impl ExternalRecord {
    /// Feed-side value for a business field. Status never comes from the
    /// feed; the planner forces it.
    pub fn value_of(&self, key: FieldKey) -> Option<FieldValue> {
        match key {
            FieldKey::ReturnDate => self.return_date.map(FieldValue::Date),
            FieldKey::Odometer => self.odometer.map(FieldValue::Int),
            FieldKey::Renewed => Some(FieldValue::Bool(self.renewed)),
            FieldKey::TerminationReason => {
                self.termination_reason.clone().map(FieldValue::Text)
            }
            FieldKey::ExtraCosts => self.extra_costs.map(FieldValue::Float),
            FieldKey::Status => None,
        }
    }
}

/// Parse a feed date cell. The feed delivers `YYYY-MM-DD HH:MM:SS`; the
/// already-normalized `YYYY-MM-DD` form is accepted too so that
/// re-normalization is a fixed point.
fn parse_date(
    value: &str,
    column: &'static str,
    row: usize,
) -> Result<NaiveDate, NormalizationError> {
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.date());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| NormalizationError::BadDate {
        column,
        value: value.to_string(),
        row,
    })
}

/// Title-case free text: the first letter of every word upper, the rest
/// lower, with any non-alphabetic character acting as a word boundary.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// Round a monetary amount to 2 decimal places.
fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Normalize one raw row. `row` is the 1-based data row number, used in
/// error messages only.
pub fn normalize_row(
    raw: &RawRow,
    renewal_token: &str,
    row: usize,
) -> Result<ExternalRecord, NormalizationError> {
    let registration = raw
        .registration
        .as_deref()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or(NormalizationError::MissingKey { row })?;

    let lease_start = raw
        .lease_start
        .as_deref()
        .map(|v| parse_date(v, "LEASE_START", row))
        .transpose()?;
    let lease_end = raw
        .lease_end
        .as_deref()
        .map(|v| parse_date(v, "LEASE_END_DATE", row))
        .transpose()?;
    let return_date = raw
        .return_date
        .as_deref()
        .map(|v| parse_date(v, "RETURN_DATE", row))
        .transpose()?;

    // Degrades to None on garbage, never aborts
    let odometer = raw.odometer.as_deref().and_then(|v| v.trim().parse::<i64>().ok());
    let extra_costs = raw
        .extra_costs
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(round_currency);

    let renewed = raw
        .renewal
        .as_deref()
        .map(|v| v.trim().eq_ignore_ascii_case(renewal_token))
        .unwrap_or(false);

    let termination_reason = raw.reason.as_deref().map(title_case);

    Ok(ExternalRecord {
        registration,
        lease_start,
        lease_end,
        return_date,
        odometer,
        renewed,
        termination_reason,
        extra_costs,
    })
}

/// Normalize the whole batch. Any date-format or missing-key failure aborts.
pub fn normalize_rows(
    rows: &[RawRow],
    renewal_token: &str,
) -> Result<Vec<ExternalRecord>, NormalizationError> {
    rows.iter()
        .enumerate()
        .map(|(i, raw)| normalize_row(raw, renewal_token, i + 1))
        .collect()
}
