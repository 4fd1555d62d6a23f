//! Excel report builder for a reconciliation run.
//!
//! Produces one workbook containing:
//! - Summary sheet with run counters
//! - One sheet per terminal bucket (Success, Skipped, Already Closed, Failed)
//! - The Closed roll-up: every record a close transition was attempted for
//! - Advisory sheets (Renewal Mismatch, Invalid Picklist)
//! - Unmatched records, both directions
//! - A verbatim echo of the input feed

use anyhow::{Context, Result};
use rust_xlsxwriter::*;

use crate::engine::classify::{RunReport, ReportRow};
use crate::feed::reader::{RawRow, REQUIRED_COLUMNS};

/// Columns shared by every bucket sheet.
const BUCKET_HEADERS: [&str; 8] = [
    "Record Id",
    "Registration",
    "Return Date",
    "Odometer",
    "Renewed",
    "Termination Reason",
    "Extra Costs",
    "Status",
];

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x4472C4))
        .set_font_color(Color::White)
}

/// Export the run report to an XLSX workbook at `file_path`.
pub fn export_report(report: &RunReport, input: &[RawRow], file_path: &str) -> Result<()> {
    let mut workbook = Workbook::new();

    create_summary_sheet(&mut workbook, report)?;
    create_bucket_sheet(&mut workbook, "Success", &report.success)?;
    create_bucket_sheet(&mut workbook, "Skipped", &report.skipped)?;
    create_bucket_sheet(&mut workbook, "Already Closed", &report.already_closed)?;
    create_bucket_sheet(&mut workbook, "Failed", &report.failed)?;
    create_bucket_sheet(&mut workbook, "Closed", &report.closed)?;
    create_renewal_sheet(&mut workbook, report)?;
    create_unmatched_sheets(&mut workbook, report)?;
    create_invalid_picklist_sheet(&mut workbook, report)?;
    create_input_sheet(&mut workbook, input)?;

    workbook
        .save(file_path)
        .with_context(|| format!("Failed to save Excel report: {}", file_path))?;

    log::info!("Run report exported to: {}", file_path);
    Ok(())
}

fn create_summary_sheet(workbook: &mut Workbook, report: &RunReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Summary")?;

    let header_format = header_format().set_font_size(14);
    let title_format = Format::new().set_bold().set_font_size(16);
    let bold_format = Format::new().set_bold();

    sheet.write_string_with_format(0, 0, "Lease Return Reconciliation Report", &title_format)?;
    sheet.write_string(
        1,
        0,
        &format!(
            "Generated: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ),
    )?;

    let mut row = 3u32;
    sheet.write_string_with_format(row, 0, "RUN SUMMARY", &header_format)?;
    row += 1;

    sheet.write_string_with_format(row, 0, "Metric", &bold_format)?;
    sheet.write_string_with_format(row, 1, "Value", &bold_format)?;
    row += 1;

    let s = &report.summary;
    let counters: [(&str, usize); 10] = [
        ("Feed Records Acquired", s.acquired),
        ("Updated Successfully", s.success),
        ("Skipped (no changes)", s.skipped),
        ("Update Failures", s.failed),
        ("Close Transitions Attempted", s.closed),
        ("Already Closed", s.already_closed),
        ("Feed Records Without CRM Match", s.unmatched_feed),
        ("CRM Records Not In Feed", s.unmatched_crm),
        ("Renewal Flag Mismatches", s.renewal_mismatch),
        ("Distinct Invalid Picklist Values", s.invalid_picklist_values),
    ];
    for (label, value) in counters {
        sheet.write_string(row, 0, label)?;
        sheet.write_number(row, 1, value as f64)?;
        row += 1;
    }

    sheet.write_string(row, 0, "Update Cycle Attempts")?;
    sheet.write_number(row, 1, s.attempts as f64)?;

    sheet.autofit();
    Ok(())
}

fn create_bucket_sheet(workbook: &mut Workbook, name: &str, rows: &[ReportRow]) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;

    let header = header_format();
    for (col, label) in BUCKET_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *label, &header)?;
    }

    let mut row = 1u32;
    if rows.is_empty() {
        sheet.write_string(row, 0, "No records")?;
    } else {
        for record in rows {
            let ext = &record.external;
            sheet.write_string(row, 0, &record.id)?;
            sheet.write_string(row, 1, &ext.registration)?;
            write_opt_date(sheet, row, 2, ext.return_date)?;
            write_opt_number(sheet, row, 3, ext.odometer.map(|v| v as f64))?;
            sheet.write_string(row, 4, if ext.renewed { "Yes" } else { "No" })?;
            sheet.write_string(row, 5, ext.termination_reason.as_deref().unwrap_or("-"))?;
            write_opt_number(sheet, row, 6, ext.extra_costs)?;
            sheet.write_string(row, 7, &record.status_description)?;
            row += 1;
        }
    }

    sheet.autofit();
    Ok(())
}

fn create_renewal_sheet(workbook: &mut Workbook, report: &RunReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Renewal Mismatch")?;

    let header = header_format();
    sheet.write_string_with_format(0, 0, "Record Id", &header)?;
    sheet.write_string_with_format(0, 1, "Registration", &header)?;
    sheet.write_string_with_format(0, 2, "Feed Renewed", &header)?;
    sheet.write_string_with_format(0, 3, "CRM Renewed", &header)?;

    let mut row = 1u32;
    if report.renewal_mismatch.is_empty() {
        sheet.write_string(row, 0, "No mismatches")?;
    } else {
        for mismatch in &report.renewal_mismatch {
            sheet.write_string(row, 0, &mismatch.id)?;
            sheet.write_string(row, 1, &mismatch.registration)?;
            sheet.write_string(row, 2, if mismatch.feed_renewed { "Yes" } else { "No" })?;
            let crm = match mismatch.crm_renewed {
                Some(true) => "Yes",
                Some(false) => "No",
                None => "-",
            };
            sheet.write_string(row, 3, crm)?;
            row += 1;
        }
    }

    sheet.autofit();
    Ok(())
}

fn create_unmatched_sheets(workbook: &mut Workbook, report: &RunReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Unmatched Feed")?;

    let header = header_format();
    sheet.write_string_with_format(0, 0, "Registration", &header)?;
    sheet.write_string_with_format(0, 1, "Return Date", &header)?;
    sheet.write_string_with_format(0, 2, "Odometer", &header)?;
    sheet.write_string_with_format(0, 3, "Termination Reason", &header)?;

    let mut row = 1u32;
    if report.unmatched_feed.is_empty() {
        sheet.write_string(row, 0, "No records")?;
    } else {
        for record in &report.unmatched_feed {
            sheet.write_string(row, 0, &record.registration)?;
            write_opt_date(sheet, row, 1, record.return_date)?;
            write_opt_number(sheet, row, 2, record.odometer.map(|v| v as f64))?;
            sheet.write_string(row, 3, record.termination_reason.as_deref().unwrap_or("-"))?;
            row += 1;
        }
    }
    sheet.autofit();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Unmatched CRM")?;

    sheet.write_string_with_format(0, 0, "Record Id", &header)?;
    sheet.write_string_with_format(0, 1, "Registration", &header)?;
    sheet.write_string_with_format(0, 2, "Status", &header)?;

    let mut row = 1u32;
    if report.unmatched_crm.is_empty() {
        sheet.write_string(row, 0, "No records")?;
    } else {
        for record in &report.unmatched_crm {
            sheet.write_string(row, 0, &record.id)?;
            sheet.write_string(row, 1, &record.registration)?;
            sheet.write_string(row, 2, &record.status.to_string())?;
            row += 1;
        }
    }

    sheet.autofit();
    Ok(())
}

fn create_invalid_picklist_sheet(workbook: &mut Workbook, report: &RunReport) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Invalid Picklist")?;

    let header = header_format();
    sheet.write_string_with_format(0, 0, "Registration", &header)?;
    sheet.write_string_with_format(0, 1, "Termination Reason", &header)?;

    let mut row = 1u32;
    if report.invalid_picklist.is_empty() {
        sheet.write_string(row, 0, "No invalid values")?;
    } else {
        for record in &report.invalid_picklist {
            sheet.write_string(row, 0, &record.registration)?;
            sheet.write_string(row, 1, record.termination_reason.as_deref().unwrap_or("-"))?;
            row += 1;
        }
    }

    sheet.autofit();
    Ok(())
}

/// Echo the raw feed rows so the report is self-contained.
fn create_input_sheet(workbook: &mut Workbook, input: &[RawRow]) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Input")?;

    let header = header_format();
    for (col, label) in REQUIRED_COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *label, &header)?;
    }

    for (idx, raw) in input.iter().enumerate() {
        let row = (idx + 1) as u32;
        for (col, cell) in raw.cells().iter().enumerate() {
            sheet.write_string(row, col as u16, cell.unwrap_or(""))?;
        }
    }

    sheet.autofit();
    Ok(())
}

fn write_opt_date(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<chrono::NaiveDate>,
) -> Result<()> {
    match value {
        Some(date) => sheet.write_string(row, col, &date.format("%Y-%m-%d").to_string())?,
        None => sheet.write_string(row, col, "-")?,
    };
    Ok(())
}

fn write_opt_number(sheet: &mut Worksheet, row: u32, col: u16, value: Option<f64>) -> Result<()> {
    match value {
        Some(n) => sheet.write_number(row, col, n)?,
        None => sheet.write_string(row, col, "-")?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::classify::{Bucket, RunSummary};
    use crate::feed::normalize::ExternalRecord;

    fn make_report() -> RunReport {
        let external = ExternalRecord {
            registration: "AB123CD".to_string(),
            lease_start: None,
            lease_end: None,
            return_date: None,
            odometer: Some(15000),
            renewed: false,
            termination_reason: Some("Fine Contratto".to_string()),
            extra_costs: Some(120.55),
        };
        let row = ReportRow {
            id: "R1".to_string(),
            bucket: Bucket::Success,
            external,
            status_description: "Success".to_string(),
        };
        RunReport {
            success: vec![row.clone()],
            skipped: vec![],
            closed: vec![row],
            already_closed: vec![],
            failed: vec![],
            renewal_mismatch: vec![],
            unmatched_feed: vec![],
            unmatched_crm: vec![],
            invalid_picklist: vec![],
            summary: RunSummary {
                acquired: 1,
                success: 1,
                closed: 1,
                attempts: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_all_bucket_sheets_exported() {
        use calamine::{open_workbook, Reader, Xlsx};

        let report = make_report();
        let path = std::env::temp_dir().join("lease-returns-sheets-test.xlsx");
        let path_str = path.to_string_lossy().to_string();
        export_report(&report, &[], &path_str).unwrap();

        let workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let names = workbook.sheet_names();
        for expected in [
            "Summary",
            "Success",
            "Skipped",
            "Already Closed",
            "Failed",
            "Closed",
            "Renewal Mismatch",
            "Unmatched Feed",
            "Unmatched CRM",
            "Invalid Picklist",
            "Input",
        ] {
            assert!(
                names.iter().any(|n| n == expected),
                "workbook is missing sheet '{}'",
                expected
            );
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_export_writes_workbook() {
        let report = make_report();
        let input = vec![RawRow {
            registration: Some("AB123CD".to_string()),
            ..Default::default()
        }];

        let path = std::env::temp_dir().join("lease-returns-report-test.xlsx");
        let path_str = path.to_string_lossy().to_string();
        export_report(&report, &input, &path_str).unwrap();

        let written = std::fs::metadata(&path).unwrap();
        assert!(written.len() > 0);
        let _ = std::fs::remove_file(&path);
    }
}
