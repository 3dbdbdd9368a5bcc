// Orchestration layer: validates the run configuration and drives the
// DojoClient through the fixed upload sequence. Kept out of `main.rs` so
// tests can call it with a mock endpoint instead of real env vars.

use crate::api::DojoClient;
use anyhow::{bail, Context, Result};
use chrono::Local;
use reqwest::Url;
use std::path::PathBuf;

/// The one report file this tool uploads. Other files in the report
/// directory (e.g. the baseline scan) are deliberately ignored to avoid
/// duplicated findings.
pub const FULL_SCAN_REPORT: &str = "full_scan_report.xml";

/// Everything a run needs, resolved up front. Built from CLI args and
/// environment variables in `main`, or directly in tests.
pub struct RunConfig {
    pub report_dir: PathBuf,
    pub target_url: String,
    pub base_url: String,
    pub api_token: String,
}

/// Derive the DefectDojo product name from the scanned URL: a fixed prefix
/// plus the hostname with dots replaced by underscores, so one product
/// accumulates all scans of the same host.
pub fn product_name_for_target(target_url: &str) -> Result<String> {
    let url = Url::parse(target_url)
        .with_context(|| format!("Invalid target URL: {target_url}"))?;
    let host = url.host_str().unwrap_or_default().replace('.', "_");
    Ok(format!("Security_Assessment_{host}"))
}

/// Engagement names embed a second-resolution timestamp so every run is
/// distinguishable even though prior engagements get deleted.
pub fn engagement_name_now() -> String {
    format!(
        "OWASP_ZAP_Comprehensive_Scan_{}",
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Run the full upload sequence: connect, resolve the product, purge old
/// engagements, create a fresh one, import the scan. Any failure along the
/// path returns an error and the steps after it never execute.
pub fn run(cfg: &RunConfig) -> Result<()> {
    if !cfg.report_dir.exists() {
        bail!(
            "Report directory {} does not exist",
            cfg.report_dir.display()
        );
    }

    let client = DojoClient::new(&cfg.base_url, &cfg.api_token)?;

    if !client.test_connection() {
        bail!("DefectDojo API connection failed");
    }

    let product_name = product_name_for_target(&cfg.target_url)?;
    let product_id = client.get_or_create_product(&product_name, "Automated Security Assessment")?;

    client
        .delete_previous_engagements(product_id)
        .context("Failed to delete previous engagements")?;

    let engagement_name = engagement_name_now();
    let engagement_id = client.create_engagement(product_id, &engagement_name, &cfg.target_url)?;

    // Upload only the full-scan XML; uploading the baseline report as well
    // would double-count findings.
    let scan_file = cfg.report_dir.join(FULL_SCAN_REPORT);
    if !scan_file.exists() {
        println!("Full scan XML report not found at {}", scan_file.display());
        println!("Make sure the ZAP full scan generates XML with the -x parameter");
        bail!("Scan report {FULL_SCAN_REPORT} is missing");
    }

    client.import_scan(engagement_id, &scan_file, "ZAP Scan")?;

    println!();
    println!("Successfully uploaded ZAP scan to DefectDojo");
    println!("View results: {}/engagement/{engagement_id}", cfg.base_url);
    println!("Dashboard: {}/dashboard", cfg.base_url);
    Ok(())
}
