use std::time::Duration;
use tokio::net::TcpListener;

use vanguard_probe::config::ScanConfig;
use vanguard_probe::core::models::ProbeStatus;
use vanguard_probe::core::scanner::port_scanner::{scan_ports, PortScanProbe};
use vanguard_probe::core::scanner::subdomain_scanner::SubdomainProbe;
use vanguard_probe::core::scanner::{Probe, ScanContext};
use vanguard_probe::core::target::Target;

#[tokio::test]
async fn test_scan_reports_only_listening_ports() {
    let open = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open_port = open.local_addr().unwrap().port();

    let closed_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let found = scan_ports("127.0.0.1", &[closed_port, open_port], Duration::from_millis(500), 4)
        .await
        .unwrap();

    assert_eq!(found, vec![open_port]);
}

#[tokio::test]
async fn test_scan_resolves_host_names() {
    let open = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open_port = open.local_addr().unwrap().port();

    let found = scan_ports("localhost", &[open_port], Duration::from_millis(500), 1)
        .await
        .unwrap();

    assert_eq!(found, vec![open_port]);
}

#[tokio::test]
async fn test_unresolvable_host_is_an_error() {
    let result = scan_ports("does-not-exist.invalid", &[80], Duration::from_millis(200), 1).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_literal_ip_targets_are_skipped() {
    for url in ["http://127.0.0.1:8080", "https://[::1]/"] {
        let ctx = ScanContext::new(Target::parse(url).unwrap(), None, ScanConfig::default()).unwrap();

        let ports = PortScanProbe.run(&ctx).await.unwrap();
        assert_eq!(ports.status, ProbeStatus::Skipped);

        let subdomains = SubdomainProbe::default().run(&ctx).await.unwrap();
        assert_eq!(subdomains.status, ProbeStatus::Skipped);
    }
}
