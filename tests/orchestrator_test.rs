use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use vanguard_probe::config::ScanConfig;
use vanguard_probe::core::dom::{DomSnapshot, SnapshotCookie};
use vanguard_probe::core::models::{
    Finding, FindingTarget, ProbeCategory, ProbeData, ProbeResult, ProbeStatus, Severity,
};
use vanguard_probe::core::scanner::cookie_scanner::CookieProbe;
use vanguard_probe::core::scanner::csrf_scanner::CsrfProbe;
use vanguard_probe::core::scanner::{Orchestrator, Probe, ScanContext};
use vanguard_probe::core::target::Target;
use vanguard_probe::error::ProbeError;

enum Behavior {
    Complete,
    Fail,
    Panic,
    Sleep(Duration),
}

struct FakeProbe {
    category: ProbeCategory,
    behavior: Behavior,
}

impl FakeProbe {
    fn arc(category: ProbeCategory, behavior: Behavior) -> Arc<dyn Probe> {
        Arc::new(Self { category, behavior })
    }
}

#[async_trait]
impl Probe for FakeProbe {
    fn category(&self) -> ProbeCategory {
        self.category
    }

    async fn run(&self, _ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        match &self.behavior {
            Behavior::Complete => {}
            Behavior::Fail => return Err(ProbeError::Dns("no such host".to_string())),
            Behavior::Panic => panic!("probe blew up"),
            Behavior::Sleep(duration) => tokio::time::sleep(*duration).await,
        }
        let finding = Finding::new(self.category, Severity::Info, FindingTarget::Host("fake".to_string()));
        Ok(ProbeResult::completed(self.category, ProbeData::Cookies(Vec::new()), vec![finding]))
    }
}

fn target() -> Target {
    Target::parse("http://127.0.0.1:9").unwrap()
}

fn config(categories: Vec<ProbeCategory>) -> ScanConfig {
    ScanConfig {
        categories,
        probe_timeout_secs: 1,
        scan_deadline_secs: 30,
        ..ScanConfig::default()
    }
}

#[tokio::test]
async fn test_failing_probe_does_not_affect_siblings() {
    let orchestrator = Orchestrator::with_probes(vec![
        FakeProbe::arc(ProbeCategory::Headers, Behavior::Complete),
        FakeProbe::arc(ProbeCategory::Cors, Behavior::Fail),
        FakeProbe::arc(ProbeCategory::Waf, Behavior::Panic),
        FakeProbe::arc(ProbeCategory::Xss, Behavior::Complete),
    ]);
    let requested = vec![ProbeCategory::Xss, ProbeCategory::Waf, ProbeCategory::Cors, ProbeCategory::Headers];

    let report = orchestrator.run_scan(target(), None, config(requested)).await.unwrap();

    let keys: Vec<ProbeCategory> = report.results.keys().copied().collect();
    assert_eq!(
        keys,
        vec![ProbeCategory::Headers, ProbeCategory::Cors, ProbeCategory::Waf, ProbeCategory::Xss]
    );

    let cors = report.get(ProbeCategory::Cors).unwrap();
    assert_eq!(cors.status, ProbeStatus::Failed);
    assert!(cors.reason.as_deref().unwrap().contains("no such host"));
    assert!(cors.findings.is_empty());

    let waf = report.get(ProbeCategory::Waf).unwrap();
    assert_eq!(waf.status, ProbeStatus::Failed);
    assert!(waf.findings.is_empty());

    assert_eq!(report.get(ProbeCategory::Headers).unwrap().status, ProbeStatus::Completed);
    assert_eq!(report.get(ProbeCategory::Xss).unwrap().findings.len(), 1);
}

#[tokio::test]
async fn test_slow_probe_times_out() {
    let orchestrator = Orchestrator::with_probes(vec![
        FakeProbe::arc(ProbeCategory::PortScan, Behavior::Sleep(Duration::from_secs(10))),
        FakeProbe::arc(ProbeCategory::Headers, Behavior::Complete),
    ]);

    let report = orchestrator
        .run_scan(target(), None, config(vec![ProbeCategory::Headers, ProbeCategory::PortScan]))
        .await
        .unwrap();

    let ports = report.get(ProbeCategory::PortScan).unwrap();
    assert_eq!(ports.status, ProbeStatus::Failed);
    assert!(ports.reason.as_deref().unwrap().contains("timed out"));
    assert_eq!(report.get(ProbeCategory::Headers).unwrap().status, ProbeStatus::Completed);
}

#[tokio::test]
async fn test_scan_deadline_fails_unfinished_probes() {
    let orchestrator = Orchestrator::with_probes(vec![
        FakeProbe::arc(ProbeCategory::Headers, Behavior::Complete),
        FakeProbe::arc(ProbeCategory::SubdomainEnum, Behavior::Sleep(Duration::from_secs(30))),
    ]);
    let config = ScanConfig {
        categories: vec![ProbeCategory::Headers, ProbeCategory::SubdomainEnum],
        probe_timeout_secs: 60,
        scan_deadline_secs: 1,
        ..ScanConfig::default()
    };

    let started = std::time::Instant::now();
    let report = orchestrator.run_scan(target(), None, config).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    let subdomains = report.get(ProbeCategory::SubdomainEnum).unwrap();
    assert_eq!(subdomains.status, ProbeStatus::Failed);
    assert_eq!(subdomains.reason.as_deref(), Some("scan deadline exceeded"));
    assert_eq!(report.get(ProbeCategory::Headers).unwrap().status, ProbeStatus::Completed);
}

#[tokio::test]
async fn test_dom_probes_are_skipped_without_snapshot() {
    let orchestrator = Orchestrator::with_probes(vec![
        FakeProbe::arc(ProbeCategory::Headers, Behavior::Complete),
        Arc::new(CookieProbe),
        Arc::new(CsrfProbe),
    ]);

    let report = orchestrator
        .run_scan(
            target(),
            None,
            config(vec![ProbeCategory::Headers, ProbeCategory::Cookies, ProbeCategory::Csrf]),
        )
        .await
        .unwrap();

    for category in [ProbeCategory::Cookies, ProbeCategory::Csrf] {
        let result = report.get(category).unwrap();
        assert_eq!(result.status, ProbeStatus::Skipped);
        assert!(result.findings.is_empty());
    }
    assert_eq!(report.get(ProbeCategory::Headers).unwrap().status, ProbeStatus::Completed);
}

#[tokio::test]
async fn test_dom_probes_run_with_snapshot() {
    let orchestrator = Orchestrator::with_probes(vec![Arc::new(CookieProbe), Arc::new(CsrfProbe)]);
    let dom = DomSnapshot {
        cookies: vec![SnapshotCookie {
            name: "sid".to_string(),
            value: "abc".to_string(),
            same_site: Some("Lax".to_string()),
            ..SnapshotCookie::default()
        }],
        forms: Vec::new(),
    };

    let report = orchestrator
        .run_scan(target(), Some(dom), config(vec![ProbeCategory::Cookies, ProbeCategory::Csrf]))
        .await
        .unwrap();

    let cookies = report.get(ProbeCategory::Cookies).unwrap();
    assert_eq!(cookies.status, ProbeStatus::Completed);
    assert_eq!(cookies.findings.len(), 1);
    assert_eq!(
        cookies.findings[0].evidence.as_deref(),
        Some("missing Secure flag; missing HttpOnly flag")
    );

    let csrf = report.get(ProbeCategory::Csrf).unwrap();
    match csrf.data.as_ref().unwrap() {
        ProbeData::Csrf(data) => {
            assert!(!data.protection_detected);
            assert_eq!(data.forms_inspected, 0);
        }
        other => panic!("unexpected csrf data {:?}", other),
    }
}

#[tokio::test]
async fn test_unregistered_category_is_reported_failed() {
    let orchestrator = Orchestrator::with_probes(vec![FakeProbe::arc(ProbeCategory::Headers, Behavior::Complete)]);

    let report = orchestrator
        .run_scan(target(), None, config(vec![ProbeCategory::Headers, ProbeCategory::Tls]))
        .await
        .unwrap();

    assert_eq!(report.results.len(), 2);
    assert!(report.get(ProbeCategory::Tls).unwrap().is_failed());
}

#[tokio::test]
async fn test_report_serializes_under_record_keys() {
    let orchestrator = Orchestrator::with_probes(vec![
        FakeProbe::arc(ProbeCategory::Headers, Behavior::Complete),
        FakeProbe::arc(ProbeCategory::PortScan, Behavior::Fail),
    ]);

    let report = orchestrator
        .run_scan(target(), None, config(vec![ProbeCategory::Headers, ProbeCategory::PortScan]))
        .await
        .unwrap();
    let record = report.to_record();

    assert_eq!(record["security_headers"]["status"], "completed");
    assert_eq!(record["open_ports"]["status"], "failed");
    assert!(record["open_ports"].get("data").is_none());
    assert_eq!(record["target"]["host"], "127.0.0.1");
}

#[tokio::test]
async fn test_invalid_config_refuses_to_scan() {
    let config = ScanConfig {
        categories: Vec::new(),
        ..ScanConfig::default()
    };
    assert!(Orchestrator::default().run_scan(target(), None, config).await.is_err());
}
