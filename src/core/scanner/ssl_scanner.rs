// src/core/scanner/ssl_scanner.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};
use x509_parser::prelude::*;

use crate::core::models::{
    CertificateInfo, Finding, FindingTarget, ProbeCategory, ProbeData, ProbeResult, Severity, TlsData,
};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

/// Handshakes with the target's own port and inspects the leaf certificate.
/// Plain http targets are skipped.
pub struct TlsProbe;

#[async_trait]
impl Probe for TlsProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::Tls
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        if !ctx.target.is_https() {
            info!(scheme = %ctx.target.scheme, "TLS analysis not applicable.");
            return Ok(ProbeResult::skipped(
                self.category(),
                format!("not applicable: target scheme is {}", ctx.target.scheme),
            ));
        }

        info!(host = %ctx.target.host, port = ctx.target.port, "Starting SSL/TLS scan.");
        let host = ctx.target.host.clone();
        let port = ctx.target.port;
        let timeout = ctx.config.request_timeout();

        debug!("Spawning blocking task for TLS connection.");
        let data = spawn_blocking(move || perform_tls_scan(&host, port, timeout))
            .await
            .map_err(|e| {
                error!(panic = %e, "Blocking SSL scan task panicked!");
                ProbeError::Task(e.to_string())
            })??;

        let findings = analyze_tls(&data);
        info!(findings = findings.len(), protocol = %data.protocol_version, "SSL/TLS scan finished.");
        Ok(ProbeResult::completed(self.category(), ProbeData::Tls(data), findings))
    }
}

fn client_config() -> Result<ClientConfig, ProbeError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(format!("TLS config error: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

/// Handshakes with `host:port` and reads the negotiated parameters and the
/// leaf certificate. An untrusted chain or expired certificate fails the
/// handshake and comes back as an error.
fn perform_tls_scan(host: &str, port: u16, timeout: Duration) -> Result<TlsData, ProbeError> {
    debug!(host, port, "Performing TLS connection and handshake.");

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ProbeError::Tls(format!("invalid server name {}: {}", host, e)))?;
    let mut conn = ClientConnection::new(Arc::new(client_config()?), server_name)
        .map_err(|e| ProbeError::Tls(format!("TLS setup error: {}", e)))?;

    let address = (host, port)
        .to_socket_addrs()
        .map_err(|e| ProbeError::Dns(format!("could not resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| ProbeError::Dns(format!("{} resolved to no addresses", host)))?;

    debug!(%address, "Connecting TCP stream.");
    let mut sock = TcpStream::connect_timeout(&address, timeout).map_err(|e| {
        error!(error = %e, "TCP connection failed");
        ProbeError::Io(e)
    })?;
    sock.set_read_timeout(Some(timeout))?;
    sock.set_write_timeout(Some(timeout))?;

    debug!(host, "Performing TLS handshake.");
    while conn.is_handshaking() {
        conn.complete_io(&mut sock).map_err(|e| {
            error!(error = %e, "TLS handshake failed");
            ProbeError::Tls(format!("TLS Handshake Error: {}", e))
        })?;
    }

    let protocol_version = conn
        .protocol_version()
        .map(|v| format!("{:?}", v).replace('_', "."))
        .unwrap_or_else(|| "unknown".to_string());
    let cipher_suite = conn
        .negotiated_cipher_suite()
        .map(|s| format!("{:?}", s.suite()))
        .unwrap_or_else(|| "unknown".to_string());

    let leaf = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| ProbeError::Certificate("Server did not provide a certificate.".to_string()))?;

    let (_, x509) = parse_x509_certificate(leaf.as_ref()).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        ProbeError::Certificate(format!("X.509 Parse Error: {}", e))
    })?;

    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let validity = x509.validity();
    let not_after = asn1_time_to_chrono_utc(&validity.not_after);
    let not_before = asn1_time_to_chrono_utc(&validity.not_before);
    let now = Utc::now();
    let days_until_expiry = not_after.signed_duration_since(now).num_days();
    let is_valid = now > not_before && now < not_after;

    let subject_alt_names = match x509.subject_alternative_name() {
        Ok(Some(ext)) => ext.value.general_names.iter().map(general_name_to_string).collect(),
        _ => Vec::new(),
    };

    Ok(TlsData {
        protocol_version,
        cipher_suite,
        is_valid,
        certificate: CertificateInfo {
            subject_name: x509.subject().to_string(),
            issuer_name: x509.issuer().to_string(),
            not_before,
            not_after,
            days_until_expiry,
            subject_alt_names,
        },
    })
}

fn general_name_to_string(name: &GeneralName) -> String {
    match name {
        GeneralName::DNSName(dns) => dns.to_string(),
        GeneralName::IPAddress(bytes) => ip_from_bytes(bytes)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| format!("{:?}", bytes)),
        other => format!("{:?}", other),
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

/// Analyzes the negotiated TLS parameters and the leaf certificate.
///
/// # Arguments
/// * `data` - The result of a completed handshake.
///
/// # Returns
/// A critical finding when the certificate is outside its validity window and
/// a warning when it expires within 30 days.
pub fn analyze_tls(data: &TlsData) -> Vec<Finding> {
    debug!("Analyzing SSL scan results.");
    let subject = FindingTarget::Certificate(data.certificate.subject_name.clone());
    let mut findings = Vec::new();

    // Check the validity window.
    if !data.is_valid {
        debug!(expiry_date = %data.certificate.not_after, "Certificate is outside its validity window.");
        findings.push(
            Finding::new(ProbeCategory::Tls, Severity::Critical, subject.clone())
                .with_pattern("certificate not valid")
                .with_evidence(format!(
                    "valid {} to {}",
                    data.certificate.not_before, data.certificate.not_after
                )),
        );
    }

    // Check for upcoming expiry.
    let days_left = data.certificate.days_until_expiry;
    if (0..=30).contains(&days_left) {
        debug!(days_left, "Certificate is expiring soon.");
        findings.push(
            Finding::new(ProbeCategory::Tls, Severity::Warning, subject)
                .with_pattern("certificate expiring soon")
                .with_evidence(format!("{} days until expiry", days_left)),
        );
    }

    findings
}
