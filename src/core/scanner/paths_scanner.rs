// src/core/scanner/paths_scanner.rs

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::core::models::{
    Finding, FindingTarget, ProbeCategory, ProbeData, ProbeResult, SensitiveFilesData, Severity,
};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

pub const SENSITIVE_PATHS: &[&str] = &[
    "/robots.txt",
    "/.env",
    "/.git/config",
    "/wp-config.php",
    "/admin/",
    "/backup/",
    "/temp/",
    "/tmp/",
];

/// Body fragments that mark a soft-404 page served with status 200.
const NOT_FOUND_MARKERS: &[&str] = &["not found", "page not found"];

/// A path counts as found when it answers 200 and the body does not read like
/// an error page. Custom error pages can still slip through.
pub fn looks_found(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::OK {
        return false;
    }
    let lowered = body.to_lowercase();
    !NOT_FOUND_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn severity_for(path: &str) -> Severity {
    match path {
        "/.env" | "/.git/config" | "/wp-config.php" => Severity::Critical,
        "/robots.txt" => Severity::Info,
        _ => Severity::Warning,
    }
}

/// Requests each configured path relative to the target origin.
pub struct SensitivePathsProbe;

#[async_trait]
impl Probe for SensitivePathsProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::SensitivePaths
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        let base = ctx.target.base_url();
        info!(base = %base, "Starting sensitive path check.");

        let mut data = SensitiveFilesData::default();
        let mut findings = Vec::new();
        let mut last_error = None;

        for path in SENSITIVE_PATHS {
            let url = format!("{}{}", base, path);
            data.checked += 1;

            // Read the body too, the soft-404 check needs it.
            let outcome = match ctx.http.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    response.text().await.map(|body| (status, body))
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok((status, body)) => {
                    debug!(url = %url, %status, "Path probed.");
                    if looks_found(status, &body) {
                        info!(url = %url, "Sensitive path appears to be exposed.");
                        findings.push(
                            Finding::new(ProbeCategory::SensitivePaths, severity_for(path), FindingTarget::Path(path.to_string()))
                                .with_pattern("HTTP 200")
                                .with_evidence(url.clone()),
                        );
                        data.found.push(url);
                    }
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Path request failed.");
                    data.failed_requests += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        if data.failed_requests == data.checked {
            return Err(ProbeError::AllRequestsFailed {
                attempted: data.checked,
                last_error: last_error.unwrap_or_default(),
            });
        }

        info!(found = data.found.len(), failed = data.failed_requests, "Sensitive path check finished.");
        Ok(ProbeResult::completed(self.category(), ProbeData::SensitiveFiles(data), findings))
    }
}
