// src/core/scanner/headers_scanner.rs

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::core::models::{Finding, FindingTarget, ProbeCategory, ProbeData, ProbeResult, Severity};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

/// Response headers worth reporting, in canonical spelling.
pub const SECURITY_HEADERS: &[&str] = &[
    "Strict-Transport-Security",
    "Content-Security-Policy",
    "X-Content-Type-Options",
    "X-Frame-Options",
    "Referrer-Policy",
    "Permissions-Policy",
    "Cross-Origin-Embedder-Policy",
    "Cross-Origin-Opener-Policy",
    "Cross-Origin-Resource-Policy",
    "Feature-Policy",
    "X-XSS-Protection",
    "Server",
    "X-Powered-By",
];

pub const CORS_HEADERS: &[&str] = &[
    "Access-Control-Allow-Origin",
    "Access-Control-Allow-Methods",
    "Access-Control-Allow-Headers",
    "Access-Control-Allow-Credentials",
    "Access-Control-Max-Age",
    "Access-Control-Expose-Headers",
];

/// Picks the allow-listed headers present in `headers`.
///
/// Headers absent from the response are left out entirely, never defaulted.
/// Non-UTF-8 values are kept with a placeholder so their presence still shows.
pub fn extract_headers(headers: &HeaderMap, allow_list: &[&str]) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();
    for name in allow_list {
        if let Some(value) = headers.get(*name) {
            let value = match value.to_str() {
                Ok(s) => s.to_string(),
                Err(_) => {
                    warn!(header_name = name, "Header found but contained invalid UTF-8.");
                    "[Invalid UTF-8]".to_string()
                }
            };
            debug!(header_name = name, value = %value, "Header found.");
            found.insert(name.to_string(), value);
        }
    }
    found
}

/// Fetches the target with HEAD, falling back to GET when HEAD fails or is
/// refused.
async fn fetch_headers(ctx: &ScanContext) -> Result<HeaderMap, ProbeError> {
    let url = ctx.target.url.clone();
    match ctx.http.head(url.clone()).send().await {
        Ok(response)
            if response.status() != StatusCode::METHOD_NOT_ALLOWED
                && response.status() != StatusCode::NOT_IMPLEMENTED =>
        {
            info!(status = %response.status(), "Received HEAD response for headers scan.");
            return Ok(response.headers().clone());
        }
        Ok(response) => debug!(status = %response.status(), "HEAD refused, retrying with GET."),
        Err(e) => debug!(error = %e, "HEAD request failed, retrying with GET."),
    }

    let response = ctx.http.get(url).send().await?;
    info!(status = %response.status(), "Received GET response for headers scan.");
    Ok(response.headers().clone())
}

/// Extracts the security header allow-list from a HEAD (or GET) response.
pub struct SecurityHeadersProbe;

#[async_trait]
impl Probe for SecurityHeadersProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::Headers
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        info!(target = %ctx.target.url, "Starting headers scan.");
        let headers = fetch_headers(ctx).await?;
        let found = extract_headers(&headers, SECURITY_HEADERS);
        let findings = analyze_security_headers(&found, ctx.target.is_https());
        info!(present = found.len(), findings = findings.len(), "Headers scan finished.");
        Ok(ProbeResult::completed(self.category(), ProbeData::Headers(found), findings))
    }
}

/// Analyzes the extracted security headers for potential issues.
///
/// # Arguments
/// * `found` - The allow-listed headers present in the response.
/// * `is_https` - Whether the target was reached over TLS. HSTS is only
///   expected in that case.
///
/// # Returns
/// One finding per missing protective header, then one per header that
/// discloses server technology.
pub fn analyze_security_headers(found: &BTreeMap<String, String>, is_https: bool) -> Vec<Finding> {
    let missing = |name: &str, severity: Severity| {
        Finding::new(ProbeCategory::Headers, severity, FindingTarget::Header(name.to_string()))
            .with_pattern("missing")
    };

    let mut findings = Vec::new();

    // Check for missing HSTS header.
    if is_https && !found.contains_key("Strict-Transport-Security") {
        findings.push(missing("Strict-Transport-Security", Severity::Warning));
    }
    // Check for missing Content-Security-Policy.
    if !found.contains_key("Content-Security-Policy") {
        findings.push(missing("Content-Security-Policy", Severity::Warning));
    }
    // Check for missing X-Frame-Options (clickjacking).
    if !found.contains_key("X-Frame-Options") {
        findings.push(missing("X-Frame-Options", Severity::Warning));
    }
    // Check for missing X-Content-Type-Options.
    if !found.contains_key("X-Content-Type-Options") {
        findings.push(missing("X-Content-Type-Options", Severity::Info));
    }

    // Check for information disclosure headers.
    for name in ["Server", "X-Powered-By"] {
        if let Some(value) = found.get(name) {
            findings.push(
                Finding::new(ProbeCategory::Headers, Severity::Info, FindingTarget::Header(name.to_string()))
                    .with_pattern("technology disclosure")
                    .with_evidence(value.clone()),
            );
        }
    }
    findings
}

pub struct CorsProbe;

#[async_trait]
impl Probe for CorsProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::Cors
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        info!(target = %ctx.target.url, "Starting CORS policy check.");
        let response = ctx
            .http
            .request(Method::OPTIONS, ctx.target.url.clone())
            .send()
            .await?;
        debug!(status = %response.status(), "Received OPTIONS response.");

        let found = extract_headers(response.headers(), CORS_HEADERS);
        let findings = analyze_cors(&found);
        info!(present = found.len(), findings = findings.len(), "CORS policy check finished.");
        Ok(ProbeResult::completed(self.category(), ProbeData::Headers(found), findings))
    }
}

/// Rates the CORS headers of an OPTIONS response.
///
/// # Returns
/// A critical finding for a wildcard origin combined with credentials, a
/// warning for a bare wildcard origin, nothing otherwise.
pub fn analyze_cors(found: &BTreeMap<String, String>) -> Vec<Finding> {
    let origin = found.get("Access-Control-Allow-Origin").map(|v| v.trim());
    let credentials = found
        .get("Access-Control-Allow-Credentials")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    match origin {
        Some("*") if credentials => vec![
            Finding::new(
                ProbeCategory::Cors,
                Severity::Critical,
                FindingTarget::Header("Access-Control-Allow-Origin".to_string()),
            )
            .with_pattern("wildcard origin with credentials")
            .with_evidence("Access-Control-Allow-Origin: *; Access-Control-Allow-Credentials: true"),
        ],
        Some("*") => vec![
            Finding::new(
                ProbeCategory::Cors,
                Severity::Warning,
                FindingTarget::Header("Access-Control-Allow-Origin".to_string()),
            )
            .with_pattern("wildcard origin")
            .with_evidence("Access-Control-Allow-Origin: *"),
        ],
        _ => Vec::new(),
    }
}
