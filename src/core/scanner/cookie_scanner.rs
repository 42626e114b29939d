// src/core/scanner/cookie_scanner.rs

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::dom::SnapshotCookie;
use crate::core::models::{
    CookieAnalysis, Finding, FindingTarget, ProbeCategory, ProbeData, ProbeResult, Severity,
};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

/// Cookie values longer than this many bytes are flagged.
pub const MAX_COOKIE_VALUE_BYTES: usize = 4096;

/// Checks one cookie's security attributes.
///
/// # Arguments
/// * `cookie` - A cookie from the page snapshot.
///
/// # Returns
/// The cookie's attributes and its issues, in a fixed order: Secure,
/// HttpOnly, SameSite, size.
pub fn analyze_cookie(cookie: &SnapshotCookie) -> CookieAnalysis {
    let mut issues = Vec::new();

    // Check transport and script exposure flags.
    if !cookie.secure {
        issues.push("missing Secure flag".to_string());
    }
    if !cookie.http_only {
        issues.push("missing HttpOnly flag".to_string());
    }
    // An empty SameSite attribute counts as unset.
    let same_site = cookie.same_site.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if same_site.is_none() {
        issues.push("SameSite not set".to_string());
    }
    if cookie.value.len() > MAX_COOKIE_VALUE_BYTES {
        issues.push(format!("oversized value ({} bytes)", cookie.value.len()));
    }

    CookieAnalysis {
        name: cookie.name.clone(),
        domain: cookie.domain.clone(),
        secure: cookie.secure,
        http_only: cookie.http_only,
        same_site: same_site.map(String::from),
        value_length: cookie.value.len(),
        issues,
    }
}

fn severity_for(analysis: &CookieAnalysis) -> Severity {
    if !analysis.secure || !analysis.http_only {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// Rates every cookie of the page snapshot. Needs a DOM snapshot.
pub struct CookieProbe;

#[async_trait]
impl Probe for CookieProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::Cookies
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        let Some(dom) = ctx.dom.as_ref() else {
            return Ok(ProbeResult::skipped(self.category(), "no DOM snapshot supplied"));
        };
        info!(cookies = dom.cookies.len(), "Analyzing cookie security.");

        let analyses: Vec<CookieAnalysis> = dom.cookies.iter().map(analyze_cookie).collect();
        let findings = analyses
            .iter()
            .filter(|a| !a.issues.is_empty())
            .map(|a| {
                debug!(cookie = %a.name, issues = ?a.issues, "Cookie has security issues.");
                Finding::new(ProbeCategory::Cookies, severity_for(a), FindingTarget::Cookie(a.name.clone()))
                    .with_evidence(a.issues.join("; "))
            })
            .collect();

        Ok(ProbeResult::completed(self.category(), ProbeData::Cookies(analyses), findings))
    }
}
