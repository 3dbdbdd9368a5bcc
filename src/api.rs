// API client module: contains a small blocking HTTP client that talks to
// the DefectDojo v2 REST API. It is intentionally small and synchronous:
// the upload flow is a fixed sequence of requests, so there is nothing to
// gain from an async runtime here.

use anyhow::{bail, Context, Result};
use chrono::Local;
use reqwest::blocking::{multipart, Client};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Blocking client for the DefectDojo API. Holds the base URL (trailing
/// slash stripped) and the Authorization header built once from the token.
pub struct DojoClient {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

/// Payload for creating a product. `prod_type` 1 is "Research and
/// Development"; both it and the criticality are fixed defaults.
#[derive(Serialize, Debug)]
struct ProductRequest<'a> {
    name: &'a str,
    description: &'a str,
    prod_type: i64,
    business_criticality: &'a str,
}

/// Payload for creating an engagement. Both dates are set to the
/// invocation date; the type/status strings are what DefectDojo expects
/// for a CI-driven run.
#[derive(Serialize, Debug)]
struct EngagementRequest<'a> {
    name: &'a str,
    product: i64,
    target_start: String,
    target_end: String,
    engagement_type: &'a str,
    status: &'a str,
    description: String,
}

/// The slice of an engagement record we actually read back when listing.
#[derive(Deserialize, Debug, Default)]
pub struct EngagementSummary {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Paginated list response. The server also sends `count` and page links,
/// but only the results themselves are used.
#[derive(Deserialize)]
struct ResultsPage<T> {
    #[serde(default)]
    results: Vec<T>,
}

#[derive(Deserialize, Default)]
struct IdResponse {
    id: i64,
}

/// Response from the import-scan endpoint. `test` is kept as a
/// serde_json::Value because the server returns an int but keeping it
/// flexible avoids parsing issues across DefectDojo versions.
#[derive(Deserialize)]
struct ImportScanResponse {
    test: Option<serde_json::Value>,
    #[serde(default)]
    findings_added: Vec<serde_json::Value>,
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

impl DojoClient {
    /// Create a client for the given base URL and API token.
    pub fn new(base_url: &str, api_token: &str) -> Result<Self> {
        // No client-side timeout: a hung server stalls the run until the
        // process is killed. reqwest's blocking client defaults to 30s,
        // which would silently change that contract.
        let client = Client::builder()
            .timeout(None)
            .build()
            .context("Failed to build HTTP client")?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            format!("Token {api_token}")
                .parse()
                .context("API token is not a valid header value")?,
        );
        Ok(DojoClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.base_url)
    }

    /// Probe the API by listing users. Returns true iff the server answered
    /// 200; network errors are reported on the console, never propagated.
    pub fn test_connection(&self) -> bool {
        let url = self.api_url("users/");
        debug!("GET {url}");
        match self.client.get(&url).headers(self.headers.clone()).send() {
            Ok(res) if res.status() == StatusCode::OK => {
                println!("DefectDojo API connection successful");
                true
            }
            Ok(res) => {
                println!("API connection failed: {}", res.status());
                false
            }
            Err(e) => {
                println!("Connection error: {e}");
                false
            }
        }
    }

    /// Look up a product by name and return its id, creating it if no
    /// product matches. When several products share the name the first
    /// result wins; the server's ordering is not disambiguated.
    pub fn get_or_create_product(&self, name: &str, description: &str) -> Result<i64> {
        let url = self.api_url("products/");
        debug!("GET {url}?name={name}");
        let res = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .query(&[("name", name)])
            .send()
            .context("Failed to send product lookup request")?;

        if res.status() == StatusCode::OK {
            let page: ResultsPage<IdResponse> = res.json().context("Parsing product list json")?;
            if let Some(product) = page.results.first() {
                println!("Using existing product: {name} (ID: {})", product.id);
                return Ok(product.id);
            }
        }

        let payload = ProductRequest {
            name,
            description,
            prod_type: 1,
            business_criticality: "medium",
        };
        debug!("POST {url}");
        let res = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .context("Failed to send product create request")?;
        if res.status() != StatusCode::CREATED {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            bail!("Failed to create product: {status} - {txt}");
        }
        let created: IdResponse = res.json().context("Parsing product create json")?;
        println!("Product created: {name} (ID: {})", created.id);
        Ok(created.id)
    }

    /// List all engagements belonging to a product. Any transport error or
    /// non-200 response degrades to an empty list.
    pub fn list_engagements(&self, product_id: i64) -> Vec<EngagementSummary> {
        let url = self.api_url("engagements/");
        debug!("GET {url}?product={product_id}");
        let res = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .query(&[("product", product_id.to_string())])
            .send();
        match res {
            Ok(res) if res.status() == StatusCode::OK => res
                .json::<ResultsPage<EngagementSummary>>()
                .map(|page| page.results)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Delete one engagement. True iff the server answered 204.
    pub fn delete_engagement(&self, engagement_id: i64) -> bool {
        let url = self.api_url(&format!("engagements/{engagement_id}/"));
        debug!("DELETE {url}");
        match self
            .client
            .delete(&url)
            .headers(self.headers.clone())
            .send()
        {
            Ok(res) => res.status() == StatusCode::NO_CONTENT,
            Err(_) => false,
        }
    }

    /// Delete every engagement under the product so a fresh one can be
    /// created without double-counting findings. The first failed delete
    /// aborts the run; engagements already removed stay removed (no
    /// compensating action, a known gap in the baseline contract).
    pub fn delete_previous_engagements(&self, product_id: i64) -> Result<()> {
        let engagements = self.list_engagements(product_id);
        if engagements.is_empty() {
            println!("No previous engagements to delete");
            return Ok(());
        }

        println!(
            "Found {} previous engagement(s) to delete...",
            engagements.len()
        );
        for engagement in &engagements {
            println!(
                "   Deleting engagement: {} (ID: {})",
                engagement.name, engagement.id
            );
            if self.delete_engagement(engagement.id) {
                println!("   Deleted engagement ID {}", engagement.id);
            } else {
                bail!("Failed to delete engagement ID {}", engagement.id);
            }
        }
        println!("All previous engagements deleted");
        Ok(())
    }

    /// Create an engagement under the product, dated today, typed for a
    /// CI/CD run. Returns the new engagement id.
    pub fn create_engagement(&self, product_id: i64, name: &str, target_url: &str) -> Result<i64> {
        let url = self.api_url("engagements/");
        let payload = EngagementRequest {
            name,
            product: product_id,
            target_start: today(),
            target_end: today(),
            engagement_type: "CI/CD",
            status: "In Progress",
            description: format!("Automated OWASP ZAP security scan for {target_url}"),
        };
        debug!("POST {url}");
        let res = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .context("Failed to send engagement create request")?;
        if res.status() != StatusCode::CREATED {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            bail!("Failed to create engagement: {status} - {txt}");
        }
        let created: IdResponse = res.json().context("Parsing engagement create json")?;
        println!("Engagement created: {name} (ID: {})", created.id);
        Ok(created.id)
    }

    /// Upload a scan report to be parsed server-side. `scan_type` selects
    /// the DefectDojo parser ("ZAP Scan" for our reports). A missing or
    /// unreadable file comes back as an error value, it does not panic.
    pub fn import_scan(&self, engagement_id: i64, scan_file: &Path, scan_type: &str) -> Result<()> {
        println!("Uploading {} as {scan_type}...", scan_file.display());

        let file = File::open(scan_file)
            .with_context(|| format!("Failed to open scan file {}", scan_file.display()))?;
        let file_name = scan_file
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("scan_report.xml");
        let part = multipart::Part::reader(file)
            .file_name(file_name.to_string())
            .mime_str("text/xml")
            .context("Building multipart file part")?;

        // DefectDojo reads these as form fields, so everything is text.
        let form = multipart::Form::new()
            .text("scan_type", scan_type.to_string())
            .text("engagement", engagement_id.to_string())
            .text("verified", "true")
            .text("active", "true")
            .text("scan_date", today())
            .text("minimum_severity", "Info")
            .text("close_old_findings", "true")
            .text("push_to_jira", "false")
            .text("skip_duplicates", "true")
            .text("do_not_reactivate", "false")
            .part("file", part);

        let url = self.api_url("import-scan/");
        debug!("POST {url}");
        let res = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .multipart(form)
            .send()
            .context("Failed to send import-scan request")?;
        if res.status() != StatusCode::CREATED {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            bail!("Failed to import scan: {status} - {txt}");
        }

        let import: ImportScanResponse = res.json().context("Parsing import-scan json")?;
        let test_id = import
            .test
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".into());
        println!("Scan imported successfully");
        println!("   Test ID: {test_id}");
        println!("   Findings imported: {}", import.findings_added.len());
        Ok(())
    }
}
