//! Command-line entrypoint for the lease return reconciliation run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use lease_returns::config::RunConfig;
use lease_returns::crm::rest::RestCrmSession;
use lease_returns::feed::reader::read_feed;
use lease_returns::report::{export_report, FileSystemSink, NotificationPayload, ReportSink};

/// Reconcile a lessor's return feed against CRM orders.
#[derive(Parser)]
#[command(name = "lease-returns")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the XLSX return feed
    #[arg(long)]
    feed: PathBuf,

    /// Where to write the XLSX run report
    #[arg(long, default_value = "lease-returns-report.xlsx")]
    report: PathBuf,

    /// Optional TOML run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the run summary file next to the report
    #[arg(long)]
    no_summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let started_at = chrono::Local::now();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    let base_url =
        std::env::var("CRM_BASE_URL").context("CRM_BASE_URL environment variable not set")?;
    let token =
        std::env::var("CRM_API_TOKEN").context("CRM_API_TOKEN environment variable not set")?;

    let session = RestCrmSession::new(
        base_url,
        token,
        config.object.clone(),
        config.chunk_size,
        config.fields.clone(),
    );

    let raw_rows = read_feed(&cli.feed)?;
    let report = match lease_returns::run_pipeline(&session, &raw_rows, &config).await {
        Ok(report) => report,
        Err(e) => {
            log::error!("Run aborted: {:#}", e);
            if !cli.no_summary {
                let payload = NotificationPayload::from_failure(&format!("{:#}", e), &cli.report);
                FileSystemSink.deliver(&payload).await?;
            }
            return Err(e);
        }
    };

    let report_path = cli.report.to_string_lossy().to_string();
    export_report(&report, &raw_rows, &report_path)?;

    if !cli.no_summary {
        let payload = NotificationPayload::from_summary(&report.summary, &cli.report, started_at);
        FileSystemSink.deliver(&payload).await?;
    }

    // Records failing all retry attempts are a terminal classification,
    // not a run failure; only run-level aborts exit nonzero.
    if report.summary.failed > 0 {
        log::warn!("{} records failed to update", report.summary.failed);
    }
    Ok(())
}
