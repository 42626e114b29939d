// src/core/scanner/mod.rs

// Declares every probe family and the orchestrator that runs them.
pub mod cookie_scanner;
pub mod csrf_scanner;
pub mod headers_scanner;
pub mod injection_scanner;
pub mod methods_scanner;
pub mod paths_scanner;
pub mod port_scanner;
pub mod ssl_scanner;
pub mod subdomain_scanner;
pub mod waf_scanner;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::core::dom::DomSnapshot;
use crate::core::models::{ProbeCategory, ProbeResult, ProbeStatus, ScanReport, Severity};
use crate::core::target::Target;
use crate::error::{ProbeError, ScanError};

use self::cookie_scanner::CookieProbe;
use self::csrf_scanner::CsrfProbe;
use self::headers_scanner::{CorsProbe, SecurityHeadersProbe};
use self::injection_scanner::{SqlInjectionProbe, XssProbe};
use self::methods_scanner::HttpMethodsProbe;
use self::paths_scanner::SensitivePathsProbe;
use self::port_scanner::PortScanProbe;
use self::ssl_scanner::TlsProbe;
use self::subdomain_scanner::SubdomainProbe;
use self::waf_scanner::WafProbe;

/// Shared, read-only state handed to every probe of one scan.
pub struct ScanContext {
    pub target: Target,
    pub dom: Option<DomSnapshot>,
    pub config: ScanConfig,
    pub http: reqwest::Client,
}

impl ScanContext {
    pub fn new(target: Target, dom: Option<DomSnapshot>, config: ScanConfig) -> Result<Self, ScanError> {
        let http = build_http_client(&config)?;
        Ok(Self { target, dom, config, http })
    }
}

/// Builds the HTTP client shared by all HTTP-based probes of a scan.
pub fn build_http_client(config: &ScanConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .build()
}

/// A single, independently failable unit of reconnaissance.
///
/// `run` returns `Err` for anything that prevents the probe from producing a
/// meaningful result; the orchestrator turns that into a `Failed` result and
/// carries on with the other probes.
#[async_trait]
pub trait Probe: Send + Sync {
    fn category(&self) -> ProbeCategory;

    fn needs_dom(&self) -> bool {
        self.category().needs_dom()
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError>;
}

/// The built-in probe table, one entry per category, in execution order.
pub fn default_probes() -> Vec<Arc<dyn Probe>> {
    vec![
        Arc::new(SecurityHeadersProbe),
        Arc::new(CorsProbe),
        Arc::new(HttpMethodsProbe),
        Arc::new(WafProbe),
        Arc::new(SensitivePathsProbe),
        Arc::new(SqlInjectionProbe),
        Arc::new(XssProbe),
        Arc::new(PortScanProbe),
        Arc::new(SubdomainProbe::default()),
        Arc::new(TlsProbe),
        Arc::new(CookieProbe),
        Arc::new(CsrfProbe),
    ]
}

/// Runs a registered set of probes against a target and assembles the report.
pub struct Orchestrator {
    probes: BTreeMap<ProbeCategory, Arc<dyn Probe>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::with_probes(default_probes())
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom probe table. A later probe for the same category
    /// replaces an earlier one.
    pub fn with_probes(probes: Vec<Arc<dyn Probe>>) -> Self {
        Self {
            probes: probes.into_iter().map(|p| (p.category(), p)).collect(),
        }
    }

    /// Runs every requested category and returns a report with exactly one
    /// result per category.
    ///
    /// Probes run on a worker pool of `max_parallel_probes` tasks, each under
    /// the per-probe timeout. When the overall deadline expires, unfinished
    /// probes are aborted and reported as failed.
    pub async fn run_scan(
        &self,
        target: Target,
        dom: Option<DomSnapshot>,
        config: ScanConfig,
    ) -> Result<ScanReport, ScanError> {
        config.validate()?;
        let requested = config.requested_categories();
        let deadline = Instant::now() + config.scan_deadline();
        let pool = Arc::new(Semaphore::new(config.max_parallel_probes));

        let ctx = Arc::new(ScanContext::new(target.clone(), dom, config)?);
        let mut report = ScanReport::new(target);
        info!(target = %report.target.url, probes = requested.len(), "Starting scan.");

        let mut pending = Vec::new();
        for category in requested {
            let Some(probe) = self.probes.get(&category).cloned() else {
                warn!(%category, "No probe registered for requested category.");
                report
                    .results
                    .insert(category, ProbeResult::failed(category, "no probe registered for this category"));
                continue;
            };

            if probe.needs_dom() && ctx.dom.is_none() {
                debug!(%category, "No DOM snapshot supplied, skipping probe.");
                report
                    .results
                    .insert(category, ProbeResult::skipped(category, "no DOM snapshot supplied"));
                continue;
            }

            let handle = tokio::spawn(run_probe(probe, Arc::clone(&ctx), Arc::clone(&pool)));
            pending.push((category, handle));
        }

        for (category, mut handle) in pending {
            let result = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => {
                    error!(%category, error = %join_error, "Probe task aborted.");
                    ProbeResult::failed(category, format!("probe task aborted: {}", join_error))
                }
                Err(_) => {
                    handle.abort();
                    warn!(%category, "Scan deadline exceeded, abandoning probe.");
                    ProbeResult::failed(category, "scan deadline exceeded")
                }
            };
            report.results.insert(category, result);
        }

        info!(
            critical = report.count_by_severity(Severity::Critical),
            warnings = report.count_by_severity(Severity::Warning),
            "Scan finished."
        );
        Ok(report)
    }
}

/// Runs one probe inside the worker pool and converts every failure mode into
/// a `ProbeResult`.
async fn run_probe(probe: Arc<dyn Probe>, ctx: Arc<ScanContext>, pool: Arc<Semaphore>) -> ProbeResult {
    let category = probe.category();
    let _permit = match pool.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return ProbeResult::failed(category, format!("worker pool closed: {}", e)),
    };

    let timeout = ctx.config.probe_timeout();
    debug!(%category, "Running probe.");
    match tokio::time::timeout(timeout, probe.run(&ctx)).await {
        Ok(Ok(mut result)) => {
            result.category = category;
            if result.status == ProbeStatus::Failed {
                result.findings.clear();
                result.data = None;
            }
            info!(%category, status = ?result.status, findings = result.findings.len(), "Probe finished.");
            result
        }
        Ok(Err(e)) => {
            error!(%category, error = %e, "Probe failed.");
            ProbeResult::failed(category, e.to_string())
        }
        Err(_) => {
            warn!(%category, ?timeout, "Probe timed out.");
            ProbeResult::failed(category, ProbeError::Timeout(timeout).to_string())
        }
    }
}

/// Convenience entry point: parses the URL, then runs every built-in probe the
/// config asks for.
pub async fn run_full_scan(
    url: &str,
    dom: Option<DomSnapshot>,
    config: ScanConfig,
) -> Result<ScanReport, ScanError> {
    let target = Target::parse(url)?;
    Orchestrator::default().run_scan(target, dom, config).await
}

/// Returns a short excerpt of `text` around a byte range, snapped to char
/// boundaries.
pub(crate) fn snippet(text: &str, start: usize, len: usize) -> String {
    const CONTEXT: usize = 60;
    let mut from = start.saturating_sub(CONTEXT);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (start + len + CONTEXT).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}
