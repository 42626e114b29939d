// src/core/scanner/injection_scanner.rs

//! SQL-injection and reflected-XSS heuristics.
//!
//! Both probes walk a static payload matrix, sending each (parameter, payload)
//! pair as a GET query parameter. Detection is naive: a database
//! error string or a verbatim reflection is a signal, nothing is executed or
//! confirmed. A failing request only skips its own pair; the probe fails only
//! when every pair in the matrix failed.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::models::{
    Finding, FindingTarget, InjectionData, ProbeCategory, ProbeData, ProbeResult, Severity,
};
use crate::core::payloads::{PayloadMatrix, SQLI_MATRIX, SQL_ERROR_SIGNATURES, XSS_MATRIX};
use crate::core::scanner::{snippet, Probe, ScanContext};
use crate::error::ProbeError;

/// Returns the first database error signature found in `body`, with its
/// offset in the lowercased body.
pub fn detect_sql_error(body: &str) -> Option<(&'static str, String)> {
    let lowered = body.to_lowercase();
    SQL_ERROR_SIGNATURES.iter().find_map(|signature| {
        lowered
            .find(signature)
            .map(|at| (*signature, snippet(&lowered, at, signature.len())))
    })
}

/// Returns an excerpt around the verbatim reflection of `payload`, if any.
pub fn detect_reflection(body: &str, payload: &str) -> Option<String> {
    body.find(payload).map(|at| snippet(body, at, payload.len()))
}

/// Sends one (parameter, payload) pair as a GET query parameter.
///
/// # Returns
/// The exact request URL and the response body.
async fn send_pair(ctx: &ScanContext, parameter: &str, payload: &str) -> Result<(String, String), reqwest::Error> {
    let request = ctx
        .http
        .get(ctx.target.url.clone())
        .query(&[(parameter, payload)])
        .build()?;
    let url = request.url().to_string();
    let response = ctx.http.execute(request).await?;
    Ok((url, response.text().await?))
}

/// Walks `matrix` against the target and applies `detect` to every response
/// body.
///
/// # Arguments
/// * `ctx` - The shared scan context; its injection limits cap the matrix.
/// * `matrix` - The payload matrix to send.
/// * `detect` - Maps `(parameter, payload, body)` to a finding, if any.
///
/// # Returns
/// The bookkeeping for the run and the findings, each carrying the request
/// URL that triggered it. Fails only when every request failed.
async fn run_matrix<F>(
    ctx: &ScanContext,
    matrix: &PayloadMatrix,
    detect: F,
) -> Result<(InjectionData, Vec<Finding>), ProbeError>
where
    F: Fn(&str, &str, &str) -> Option<Finding>,
{
    let limits = &ctx.config.injection;
    let pairs = matrix.pairs(limits);
    info!(
        category = %matrix.category,
        version = matrix.version,
        pairs = pairs.len(),
        concurrency = limits.concurrency,
        "Walking payload matrix."
    );

    // Every request start waits for the next tick, so consecutive requests are
    // at least `request_delay_ms` apart whatever the concurrency.
    let pacer = (limits.request_delay_ms > 0).then(|| {
        let mut ticks = time::interval(Duration::from_millis(limits.request_delay_ms));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Mutex::new(ticks)
    });
    let pacer = pacer.as_ref();

    let requests: Vec<_> = pairs
        .into_iter()
        .map(|(parameter, payload)| async move {
            if let Some(pacer) = pacer {
                pacer.lock().await.tick().await;
            }
            let outcome = send_pair(ctx, parameter, payload).await;
            (parameter, payload, outcome)
        })
        .collect();

    // `buffered` keeps responses in matrix order, so findings are reproducible.
    let outcomes: Vec<_> = stream::iter(requests).buffered(limits.concurrency.max(1)).collect().await;

    let mut data = InjectionData {
        matrix_version: matrix.version.to_string(),
        ..InjectionData::default()
    };
    let mut findings = Vec::new();
    let mut last_error = None;

    for (parameter, payload, outcome) in outcomes {
        data.requests_sent += 1;
        match outcome {
            Ok((url, body)) => {
                if let Some(finding) = detect(parameter, payload, &body) {
                    info!(parameter, payload, url = %url, "Injection signal detected.");
                    findings.push(finding.with_url(url));
                }
            }
            Err(e) => {
                warn!(parameter, payload, error = %e, "Matrix request failed, skipping pair.");
                data.failed_requests += 1;
                last_error = Some(e.to_string());
            }
        }
    }

    if data.requests_sent > 0 && data.failed_requests == data.requests_sent {
        return Err(ProbeError::AllRequestsFailed {
            attempted: data.requests_sent,
            last_error: last_error.unwrap_or_default(),
        });
    }

    debug!(sent = data.requests_sent, failed = data.failed_requests, "Payload matrix finished.");
    Ok((data, findings))
}

/// Error-based SQL injection heuristic over the SQLi matrix.
pub struct SqlInjectionProbe;

#[async_trait]
impl Probe for SqlInjectionProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::SqlInjection
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        info!(target = %ctx.target.url, "Testing SQL injection vulnerabilities.");
        let (data, findings) = run_matrix(ctx, &SQLI_MATRIX, |parameter, payload, body| {
            detect_sql_error(body).map(|(signature, excerpt)| {
                Finding::new(
                    ProbeCategory::SqlInjection,
                    Severity::Critical,
                    FindingTarget::Parameter(parameter.to_string()),
                )
                .with_payload(payload)
                .with_pattern(signature)
                .with_evidence(excerpt)
            })
        })
        .await?;

        info!(findings = findings.len(), "SQL injection testing finished.");
        Ok(ProbeResult::completed(self.category(), ProbeData::Injection(data), findings))
    }
}

pub struct XssProbe;

#[async_trait]
impl Probe for XssProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::Xss
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        info!(target = %ctx.target.url, "Testing XSS vulnerabilities.");
        let (data, findings) = run_matrix(ctx, &XSS_MATRIX, |parameter, payload, body| {
            detect_reflection(body, payload).map(|excerpt| {
                Finding::new(
                    ProbeCategory::Xss,
                    Severity::Warning,
                    FindingTarget::Parameter(parameter.to_string()),
                )
                .with_payload(payload)
                .with_pattern("Reflected")
                .with_evidence(excerpt)
            })
        })
        .await?;

        info!(findings = findings.len(), "XSS testing finished.");
        Ok(ProbeResult::completed(self.category(), ProbeData::Injection(data), findings))
    }
}
