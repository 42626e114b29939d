// src/core/scanner/waf_scanner.rs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use tracing::{debug, info};

use crate::core::models::{Finding, FindingTarget, ProbeCategory, ProbeData, ProbeResult, Severity, WafData};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

/// Where a WAF signature is looked for.
enum Check<'a> {
    /// Pattern in the value of a named response header.
    Header(&'a str, &'a Lazy<Regex>),
    /// A header whose mere presence identifies the vendor.
    HeaderPresent(&'a str),
    /// Pattern in the joined `Set-Cookie` headers.
    Cookie(&'a Lazy<Regex>),
    /// Pattern in the response body.
    Body(&'a Lazy<Regex>),
}

struct WafRule<'a> {
    vendor: &'a str,
    check: Check<'a>,
}

// Case-insensitive signatures, compiled once.
static RE_CLOUDFLARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)cloudflare").unwrap());
static RE_CF_COOKIE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)__cf(duid|_bm)").unwrap());
static RE_AKAMAI: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)akamai").unwrap());
static RE_AKAMAI_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)reference #[0-9a-f]+\.[0-9a-f]+").unwrap());
static RE_SUCURI: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)sucuri").unwrap());
static RE_INCAPSULA_COOKIE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(incap_ses|visid_incap)").unwrap());
static RE_INCAPSULA_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)incapsula incident id").unwrap());
static RE_AWS_COOKIE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)awsalb").unwrap());
static RE_AWS_SERVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)awselb").unwrap());
static RE_BIGIP_COOKIE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(bigipserver|ts[0-9a-f]{6,}=)").unwrap());
static RE_BIGIP_SERVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)big-?ip").unwrap());
static RE_MODSECURITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)mod_security|modsecurity").unwrap());
static RE_BARRACUDA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)barra_counter_session").unwrap());
static RE_FASTLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)fastly").unwrap());
static RE_WORDFENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)wordfence").unwrap());

/// The vendor signature table. A vendor may appear in several rules; it is
/// reported once.
static RULES: &[WafRule] = &[
    WafRule { vendor: "Cloudflare", check: Check::Header("server", &RE_CLOUDFLARE) },
    WafRule { vendor: "Cloudflare", check: Check::HeaderPresent("cf-ray") },
    WafRule { vendor: "Cloudflare", check: Check::Cookie(&RE_CF_COOKIE) },
    WafRule { vendor: "Akamai", check: Check::Header("server", &RE_AKAMAI) },
    WafRule { vendor: "Akamai", check: Check::HeaderPresent("x-akamai-transformed") },
    WafRule { vendor: "Akamai", check: Check::Body(&RE_AKAMAI_BODY) },
    WafRule { vendor: "Sucuri", check: Check::Header("server", &RE_SUCURI) },
    WafRule { vendor: "Sucuri", check: Check::HeaderPresent("x-sucuri-id") },
    WafRule { vendor: "Imperva Incapsula", check: Check::HeaderPresent("x-iinfo") },
    WafRule { vendor: "Imperva Incapsula", check: Check::Cookie(&RE_INCAPSULA_COOKIE) },
    WafRule { vendor: "Imperva Incapsula", check: Check::Body(&RE_INCAPSULA_BODY) },
    WafRule { vendor: "AWS WAF", check: Check::Cookie(&RE_AWS_COOKIE) },
    WafRule { vendor: "AWS WAF", check: Check::Header("server", &RE_AWS_SERVER) },
    WafRule { vendor: "AWS WAF", check: Check::HeaderPresent("x-amzn-waf-action") },
    WafRule { vendor: "F5 BIG-IP", check: Check::Cookie(&RE_BIGIP_COOKIE) },
    WafRule { vendor: "F5 BIG-IP", check: Check::Header("server", &RE_BIGIP_SERVER) },
    WafRule { vendor: "ModSecurity", check: Check::Header("server", &RE_MODSECURITY) },
    WafRule { vendor: "ModSecurity", check: Check::Body(&RE_MODSECURITY) },
    WafRule { vendor: "Barracuda", check: Check::Cookie(&RE_BARRACUDA) },
    WafRule { vendor: "Fastly", check: Check::HeaderPresent("x-fastly-request-id") },
    WafRule { vendor: "Fastly", check: Check::Header("via", &RE_FASTLY) },
    WafRule { vendor: "Wordfence", check: Check::Body(&RE_WORDFENCE) },
];

/// A vendor match together with the signature that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WafMatch {
    pub vendor: String,
    pub signature: String,
}

/// Applies the signature table to one response.
///
/// # Arguments
/// * `headers` - The response headers, including every `Set-Cookie`.
/// * `body` - The response body.
///
/// # Returns
/// One match per vendor, in table order. Several vendors may match at once.
pub fn detect_waf(headers: &HeaderMap, body: &str) -> Vec<WafMatch> {
    let cookies = headers
        .get_all("set-cookie")
        .into_iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");

    // First matching rule per vendor wins.
    let mut matches: Vec<WafMatch> = Vec::new();
    debug!(total_rules = %RULES.len(), "Applying WAF signature rules.");
    for rule in RULES {
        if matches.iter().any(|m| m.vendor == rule.vendor) {
            continue;
        }
        let signature = match &rule.check {
            Check::Header(name, re) => headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| re.is_match(v))
                .map(|v| format!("{}: {}", name, v)),
            Check::HeaderPresent(name) => headers.contains_key(*name).then(|| format!("{} header", name)),
            Check::Cookie(re) => re.find(&cookies).map(|m| format!("cookie {}", m.as_str())),
            Check::Body(re) => re.find(body).map(|m| format!("body '{}'", m.as_str())),
        };
        if let Some(signature) = signature {
            debug!(vendor = rule.vendor, signature = %signature, "WAF rule matched.");
            matches.push(WafMatch { vendor: rule.vendor.to_string(), signature });
        }
    }
    matches
}

pub struct WafProbe;

#[async_trait]
impl Probe for WafProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::Waf
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        info!(target = %ctx.target.url, "Starting WAF detection.");
        let response = ctx.http.get(ctx.target.url.clone()).send().await?;
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!(bytes = body.len(), "Read response body for WAF detection.");

        // One informational finding per detected vendor.
        let matches = detect_waf(&headers, &body);
        let findings = matches
            .iter()
            .map(|m| {
                Finding::new(ProbeCategory::Waf, Severity::Info, FindingTarget::Vendor(m.vendor.clone()))
                    .with_pattern(m.signature.clone())
            })
            .collect();
        let data = WafData {
            detected: !matches.is_empty(),
            vendors: matches.into_iter().map(|m| m.vendor).collect(),
        };

        info!(vendors = ?data.vendors, "WAF detection finished.");
        Ok(ProbeResult::completed(self.category(), ProbeData::Waf(data), findings))
    }
}
