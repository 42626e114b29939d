// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::core::target::Target;

// --- Core Data Models ---

// The severity level attached to a finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Every probe category the engine knows about.
///
/// The declaration order is the execution and report order:
/// headers, cors, http-methods, waf, sensitive-paths, sql-injection, xss,
/// port-scan, subdomain-enum, tls, cookies, csrf. `ScanReport` keys its
/// results by this enum, so the derived `Ord` keeps reports stable no matter
/// in which order parallel probes complete.
///
/// The serde name is the stable field name used in persisted records; the
/// strum name is the short name used on the command line and in config files
/// (both spellings are accepted when parsing).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum ProbeCategory {
    #[serde(rename = "security_headers", alias = "headers")]
    #[strum(to_string = "headers", serialize = "security_headers")]
    Headers,
    #[serde(rename = "cors_policy", alias = "cors")]
    #[strum(to_string = "cors", serialize = "cors_policy")]
    Cors,
    #[serde(rename = "http_methods", alias = "http-methods")]
    #[strum(to_string = "http-methods", serialize = "http_methods")]
    HttpMethods,
    #[serde(rename = "waf_detection", alias = "waf")]
    #[strum(to_string = "waf", serialize = "waf_detection")]
    Waf,
    #[serde(rename = "sensitive_files", alias = "sensitive-paths")]
    #[strum(to_string = "sensitive-paths", serialize = "sensitive_files")]
    SensitivePaths,
    #[serde(rename = "sql_injection", alias = "sql-injection")]
    #[strum(to_string = "sql-injection", serialize = "sql_injection")]
    SqlInjection,
    #[serde(rename = "xss_vulnerabilities", alias = "xss")]
    #[strum(to_string = "xss", serialize = "xss_vulnerabilities")]
    Xss,
    #[serde(rename = "open_ports", alias = "port-scan")]
    #[strum(to_string = "port-scan", serialize = "open_ports")]
    PortScan,
    #[serde(rename = "subdomains", alias = "subdomain-enum")]
    #[strum(to_string = "subdomain-enum", serialize = "subdomains")]
    SubdomainEnum,
    #[serde(rename = "ssl_analysis", alias = "tls")]
    #[strum(to_string = "tls", serialize = "ssl_analysis")]
    Tls,
    #[serde(rename = "cookie_analysis", alias = "cookies")]
    #[strum(to_string = "cookies", serialize = "cookie_analysis")]
    Cookies,
    #[serde(rename = "csrf_protection", alias = "csrf")]
    #[strum(to_string = "csrf", serialize = "csrf_protection")]
    Csrf,
}

impl ProbeCategory {
    /// All categories in execution order.
    pub fn all() -> Vec<ProbeCategory> {
        ProbeCategory::iter().collect()
    }

    /// DOM-dependent categories need a rendered-page snapshot to run.
    pub fn needs_dom(self) -> bool {
        matches!(self, ProbeCategory::Cookies | ProbeCategory::Csrf)
    }

    /// The field name this category occupies in a persisted record.
    pub fn record_key(self) -> &'static str {
        match self {
            ProbeCategory::Headers => "security_headers",
            ProbeCategory::Cors => "cors_policy",
            ProbeCategory::HttpMethods => "http_methods",
            ProbeCategory::Waf => "waf_detection",
            ProbeCategory::SensitivePaths => "sensitive_files",
            ProbeCategory::SqlInjection => "sql_injection",
            ProbeCategory::Xss => "xss_vulnerabilities",
            ProbeCategory::PortScan => "open_ports",
            ProbeCategory::SubdomainEnum => "subdomains",
            ProbeCategory::Tls => "ssl_analysis",
            ProbeCategory::Cookies => "cookie_analysis",
            ProbeCategory::Csrf => "csrf_protection",
        }
    }
}

/// What a finding points at.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum FindingTarget {
    Header(String),
    Method(String),
    Vendor(String),
    Path(String),
    Parameter(String),
    Port(u16),
    Host(String),
    Certificate(String),
    Cookie(String),
    Form(usize),
}

/// A heuristic signal produced by a probe. It is evidence, not a confirmed
/// vulnerability.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Finding {
    pub category: ProbeCategory,
    pub severity: Severity,
    pub target: FindingTarget,
    /// The attack string that triggered the signal, for injection probes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// The signature or rule that matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// A short raw excerpt backing the finding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// The full request URL that produced the signal, for injection probes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Finding {
    pub fn new(category: ProbeCategory, severity: Severity, target: FindingTarget) -> Self {
        Self {
            category,
            severity,
            target,
            payload: None,
            pattern: None,
            evidence: None,
            url: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

// --- Per-category payloads ---

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct HttpMethodsData {
    pub allowed: Vec<String>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct WafData {
    pub detected: bool,
    pub vendors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SensitiveFilesData {
    pub found: Vec<String>,
    pub checked: usize,
    pub failed_requests: usize,
}

/// Bookkeeping for a run over an injection payload matrix.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct InjectionData {
    pub matrix_version: String,
    pub requests_sent: usize,
    pub failed_requests: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PortScanData {
    pub open_ports: Vec<u16>,
    pub scanned: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Subdomain {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SubdomainData {
    pub domain: String,
    pub discovered: Vec<Subdomain>,
    pub checked: usize,
    /// Lookups that failed outright, as opposed to names that do not exist.
    pub lookup_errors: usize,
}

// Certificate details extracted from the leaf certificate.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject_name: String,
    pub issuer_name: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub subject_alt_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TlsData {
    pub protocol_version: String,
    pub cipher_suite: String,
    pub is_valid: bool,
    pub certificate: CertificateInfo,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CookieAnalysis {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub value_length: usize,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CsrfToken {
    pub form_index: usize,
    pub field_name: String,
    /// Length of the token value. The value itself is never recorded.
    pub value_length: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CsrfData {
    pub protection_detected: bool,
    pub forms_inspected: usize,
    pub tokens: Vec<CsrfToken>,
}

/// The typed payload carried by a completed probe, one variant per category.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ProbeData {
    /// Header name to value, only for headers actually present.
    Headers(BTreeMap<String, String>),
    HttpMethods(HttpMethodsData),
    Waf(WafData),
    SensitiveFiles(SensitiveFilesData),
    Injection(InjectionData),
    Ports(PortScanData),
    Subdomains(SubdomainData),
    Tls(TlsData),
    Cookies(Vec<CookieAnalysis>),
    Csrf(CsrfData),
}

// --- Probe Results ---

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Completed,
    Failed,
    Skipped,
}

/// The outcome of one attempted probe.
///
/// A `Failed` result never carries findings or data; use the constructors to
/// keep it that way.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProbeResult {
    #[serde(skip)]
    pub category: ProbeCategory,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProbeData>,
    pub findings: Vec<Finding>,
}

impl ProbeResult {
    pub fn completed(category: ProbeCategory, data: ProbeData, findings: Vec<Finding>) -> Self {
        Self {
            category,
            status: ProbeStatus::Completed,
            reason: None,
            data: Some(data),
            findings,
        }
    }

    pub fn failed(category: ProbeCategory, reason: impl Into<String>) -> Self {
        Self {
            category,
            status: ProbeStatus::Failed,
            reason: Some(reason.into()),
            data: None,
            findings: Vec::new(),
        }
    }

    pub fn skipped(category: ProbeCategory, reason: impl Into<String>) -> Self {
        Self {
            category,
            status: ProbeStatus::Skipped,
            reason: Some(reason.into()),
            data: None,
            findings: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ProbeStatus::Failed
    }
}

// --- Main Report ---

/// The per-category outcome of one orchestrated scan.
///
/// `results` is flattened on serialization so each category appears under its
/// record key (`security_headers`, `open_ports`, ...).
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub target: Target,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub results: BTreeMap<ProbeCategory, ProbeResult>,
}

impl ScanReport {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            timestamp: Utc::now(),
            results: BTreeMap::new(),
        }
    }

    pub fn get(&self, category: ProbeCategory) -> Option<&ProbeResult> {
        self.results.get(&category)
    }

    /// All findings across categories, in category order.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.results.values().flat_map(|r| r.findings.iter())
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings().filter(|f| f.severity == severity).count()
    }

    /// The report as a self-describing JSON value, ready to be merged into a
    /// stored record.
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn categories_iterate_in_execution_order() {
        let names: Vec<String> = ProbeCategory::all().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            names,
            [
                "headers",
                "cors",
                "http-methods",
                "waf",
                "sensitive-paths",
                "sql-injection",
                "xss",
                "port-scan",
                "subdomain-enum",
                "tls",
                "cookies",
                "csrf"
            ]
        );
    }

    #[test]
    fn category_parses_short_and_record_names() {
        assert_eq!(ProbeCategory::from_str("port-scan").unwrap(), ProbeCategory::PortScan);
        assert_eq!(ProbeCategory::from_str("open_ports").unwrap(), ProbeCategory::PortScan);
        assert!(ProbeCategory::from_str("nope").is_err());
    }

    #[test]
    fn serde_name_matches_record_key() {
        for category in ProbeCategory::all() {
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json, serde_json::Value::String(category.record_key().to_string()));
        }
    }

    #[test]
    fn failed_result_has_no_findings() {
        let result = ProbeResult::failed(ProbeCategory::Waf, "connection refused");
        assert!(result.is_failed());
        assert!(result.findings.is_empty());
        assert!(result.data.is_none());
    }
}
