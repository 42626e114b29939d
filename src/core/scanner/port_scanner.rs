// src/core/scanner/port_scanner.rs

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tokio::time;
use tracing::{debug, info};

use crate::core::models::{
    Finding, FindingTarget, PortScanData, ProbeCategory, ProbeData, ProbeResult, Severity,
};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

/// Well-known service names for the default port list.
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        80 => "HTTP",
        110 => "POP3",
        143 => "IMAP",
        443 => "HTTPS",
        3306 => "MySQL",
        5432 => "PostgreSQL",
        6379 => "Redis",
        27017 => "MongoDB",
        _ => "Unknown",
    }
}

fn severity_for(port: u16) -> Severity {
    match port {
        80 | 443 => Severity::Info,
        23 | 3306 | 5432 | 6379 | 27017 => Severity::Critical,
        _ => Severity::Warning,
    }
}

/// Performs a TCP connect with an explicit timeout.
async fn connect(socket: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    time::timeout(timeout, async move { TcpStream::connect(socket).await }).await?
}

/// A port is open iff a connect to any of the host's addresses succeeds.
/// Refusals, timeouts and other errors all read as closed/filtered.
async fn is_open(addresses: &[SocketAddr], port: u16, timeout: Duration) -> bool {
    for address in addresses {
        let socket = SocketAddr::new(address.ip(), port);
        match connect(socket, timeout).await {
            Ok(stream) => {
                debug!(%socket, "Connection was successful, shutting down stream.");
                if let Err(e) = { stream }.shutdown().await {
                    debug!(error = %e, "Shutdown stream error.");
                }
                return true;
            }
            Err(e) => debug!(%socket, error = %e, "Port closed or filtered."),
        }
    }
    false
}

/// Scans a list of TCP ports on a host.
///
/// # Arguments
/// * `host` - A host name or IP address.
/// * `ports` - The ports to try, in any order.
/// * `timeout` - Connect timeout per address.
/// * `concurrency` - Maximum number of ports probed at once.
///
/// # Returns
/// The open ports in ascending order. Fails only when the host cannot be
/// resolved at all.
pub async fn scan_ports(
    host: &str,
    ports: &[u16],
    timeout: Duration,
    concurrency: usize,
) -> Result<Vec<u16>, ProbeError> {
    let addresses: Vec<SocketAddr> = lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::Dns(format!("could not resolve {}: {}", host, e)))?
        .collect();
    if addresses.is_empty() {
        return Err(ProbeError::Dns(format!("{} resolved to no addresses", host)));
    }
    debug!(host, addresses = ?addresses, "Resolved host for port scan.");

    // Try every port and keep the ones that accepted a connection.
    let addresses = &addresses;
    let mut open: Vec<u16> = stream::iter(ports.iter().copied())
        .map(|port| async move { is_open(addresses, port, timeout).await.then_some(port) })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|port| async move { port })
        .collect()
        .await;
    open.sort_unstable();
    Ok(open)
}

/// TCP connect scan of the configured port list.
pub struct PortScanProbe;

#[async_trait]
impl Probe for PortScanProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::PortScan
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        let host = &ctx.target.host;
        if ctx.target.host_is_ip() {
            info!(host = %host, "Skipping port scan for IP address.");
            return Ok(ProbeResult::skipped(
                self.category(),
                "target host is a literal IP address",
            ));
        }

        let config = &ctx.config.port_scan;
        let ports = config.effective_ports();
        info!(host = %host, ports = ports.len(), "Starting basic port scan.");

        let open = scan_ports(
            host,
            &ports,
            Duration::from_millis(config.connect_timeout_ms),
            config.concurrency,
        )
        .await?;

        let findings = open
            .iter()
            .map(|port| {
                Finding::new(ProbeCategory::PortScan, severity_for(*port), FindingTarget::Port(*port))
                    .with_pattern(service_name(*port))
                    .with_evidence(format!("{}:{} accepted a TCP connection", host, port))
            })
            .collect();

        info!(open = ?open, "Basic port scan finished.");
        let data = PortScanData { open_ports: open, scanned: ports.len() };
        Ok(ProbeResult::completed(self.category(), ProbeData::Ports(data), findings))
    }
}
