//! Reads the lessor's return feed from an XLSX workbook.
//!
//! The feed is string-typed tabular data with a fixed column set. Cells
//! holding one of the designated null markers (`NaN`, `ND`, `None`, empty)
//! come through as `None`. The engine is handed the resulting rows and never
//! learns where the file came from.

use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};

use super::normalize::NormalizationError;

/// Column headers expected in the feed (matched case-insensitively).
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "REGISTRATION",
    "LEASE_START",
    "LEASE_END_DATE",
    "RETURN_DATE",
    "RETURN_ODO",
    "RINNOVO",
    "COLLECTION_REASON_DESC",
    "EOC_TOTALE",
];

/// One raw feed row, still string-typed. Also used verbatim as the report's
/// input echo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub registration: Option<String>,
    pub lease_start: Option<String>,
    pub lease_end: Option<String>,
    pub return_date: Option<String>,
    pub odometer: Option<String>,
    pub renewal: Option<String>,
    pub reason: Option<String>,
    pub extra_costs: Option<String>,
}

impl RawRow {
    /// Cell values in `REQUIRED_COLUMNS` order, for the echo sheet.
    pub fn cells(&self) -> [Option<&str>; 8] {
        [
            self.registration.as_deref(),
            self.lease_start.as_deref(),
            self.lease_end.as_deref(),
            self.return_date.as_deref(),
            self.odometer.as_deref(),
            self.renewal.as_deref(),
            self.reason.as_deref(),
            self.extra_costs.as_deref(),
        ]
    }

    fn is_empty(&self) -> bool {
        self.cells().iter().all(Option::is_none)
    }
}

/// Markers the feed uses for "no value".
const NULL_MARKERS: [&str; 3] = ["NaN", "ND", "None"];

/// Render a cell to its string form, mapping null markers to `None`.
fn cell_to_string(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => format!("{}", dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => return None,
    };

    if text.is_empty() || NULL_MARKERS.iter().any(|m| *m == text) {
        None
    } else {
        Some(text)
    }
}

/// Read the first worksheet of the feed workbook into raw rows.
///
/// Fails with `NormalizationError::MissingColumn` when any required column
/// is absent from the header row.
pub fn read_feed<P: AsRef<Path>>(path: P) -> Result<Vec<RawRow>> {
    let path = path.as_ref();
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open feed file: {}", path.display()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("Feed workbook has no worksheets")?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet: {}", sheet_name))?;

    let rows: Vec<Vec<Data>> = range.rows().map(|r| r.to_vec()).collect();
    let Some(header_row) = rows.first() else {
        return Ok(Vec::new());
    };

    let headers: Vec<String> = header_row
        .iter()
        .map(|c| match c {
            Data::String(s) => s.trim().to_uppercase(),
            _ => String::new(),
        })
        .collect();

    let column_index = |name: &str| -> Result<usize, NormalizationError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| NormalizationError::MissingColumn {
                column: name.to_string(),
            })
    };

    let registration_col = column_index("REGISTRATION")?;
    let lease_start_col = column_index("LEASE_START")?;
    let lease_end_col = column_index("LEASE_END_DATE")?;
    let return_date_col = column_index("RETURN_DATE")?;
    let odometer_col = column_index("RETURN_ODO")?;
    let renewal_col = column_index("RINNOVO")?;
    let reason_col = column_index("COLLECTION_REASON_DESC")?;
    let extra_costs_col = column_index("EOC_TOTALE")?;

    let cell = |row: &[Data], idx: usize| row.get(idx).and_then(cell_to_string);

    let mut raw_rows = Vec::new();
    for row in rows.iter().skip(1) {
        let raw = RawRow {
            registration: cell(row, registration_col),
            lease_start: cell(row, lease_start_col),
            lease_end: cell(row, lease_end_col),
            return_date: cell(row, return_date_col),
            odometer: cell(row, odometer_col),
            renewal: cell(row, renewal_col),
            reason: cell(row, reason_col),
            extra_costs: cell(row, extra_costs_col),
        };
        if !raw.is_empty() {
            raw_rows.push(raw);
        }
    }

    log::info!(
        "Read {} feed rows from {} (sheet '{}')",
        raw_rows.len(),
        path.display(),
        sheet_name
    );
    Ok(raw_rows)
}
