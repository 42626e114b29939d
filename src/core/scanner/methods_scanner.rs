// src/core/scanner/methods_scanner.rs

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use tracing::{debug, info};

use crate::core::models::{
    Finding, FindingTarget, HttpMethodsData, ProbeCategory, ProbeData, ProbeResult, Severity,
};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

pub const HTTP_VERBS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD", "TRACE"];

/// Verbs worth flagging when a server accepts them.
const RISKY_VERBS: &[(&str, Severity)] = &[
    ("PUT", Severity::Warning),
    ("DELETE", Severity::Warning),
    ("TRACE", Severity::Warning),
];

/// A verb counts as allowed unless the server answers 405 or 501.
pub fn is_allowed(status: StatusCode) -> bool {
    status != StatusCode::METHOD_NOT_ALLOWED && status != StatusCode::NOT_IMPLEMENTED
}

/// Sends each configured verb once and sorts it into allowed or rejected.
pub struct HttpMethodsProbe;

#[async_trait]
impl Probe for HttpMethodsProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::HttpMethods
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        info!(target = %ctx.target.url, "Starting HTTP method enumeration.");
        let mut data = HttpMethodsData::default();

        for verb in HTTP_VERBS {
            let method = Method::from_bytes(verb.as_bytes()).unwrap_or(Method::GET);
            // One connection error fails the whole probe rather than leaving a partial verb list.
            let response = ctx.http.request(method, ctx.target.url.clone()).send().await?;
            let status = response.status();
            debug!(verb, %status, "Method probed.");
            if is_allowed(status) {
                data.allowed.push(verb.to_string());
            } else {
                data.rejected.push(verb.to_string());
            }
        }

        let findings = analyze_methods(&data);
        info!(allowed = data.allowed.len(), "HTTP method enumeration finished.");
        Ok(ProbeResult::completed(self.category(), ProbeData::HttpMethods(data), findings))
    }
}

/// Flags the allowed verbs that change or echo server state.
pub fn analyze_methods(data: &HttpMethodsData) -> Vec<Finding> {
    RISKY_VERBS
        .iter()
        .filter(|(verb, _)| data.allowed.iter().any(|a| a == verb))
        .map(|(verb, severity)| {
            Finding::new(ProbeCategory::HttpMethods, *severity, FindingTarget::Method(verb.to_string()))
                .with_pattern("method allowed")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_405_and_501_mean_rejected() {
        assert!(!is_allowed(StatusCode::METHOD_NOT_ALLOWED));
        assert!(!is_allowed(StatusCode::NOT_IMPLEMENTED));
        assert!(is_allowed(StatusCode::OK));
        assert!(is_allowed(StatusCode::FORBIDDEN));
        assert!(is_allowed(StatusCode::NOT_FOUND));
    }

    #[test]
    fn risky_verbs_are_flagged() {
        let data = HttpMethodsData {
            allowed: vec!["GET".into(), "TRACE".into(), "PUT".into()],
            rejected: vec!["DELETE".into()],
        };
        let flagged: Vec<FindingTarget> = analyze_methods(&data).into_iter().map(|f| f.target).collect();
        assert_eq!(
            flagged,
            vec![FindingTarget::Method("PUT".into()), FindingTarget::Method("TRACE".into())]
        );
    }
}
