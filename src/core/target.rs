// src/core/target.rs

use serde::Serialize;
use std::net::IpAddr;
use tracing::debug;
use url::{Host, Url};

use crate::error::TargetError;

/// The parsed URL under test.
///
/// A `Target` can only be built from a well-formed http(s) URL with a host,
/// so every probe can rely on `host` and `port` being present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub url: Url,
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

/// True when `input` starts with `scheme://`. A `://` inside a path or query
/// string does not count.
fn has_scheme(input: &str) -> bool {
    match input.find("://") {
        Some(end) => {
            let scheme = &input[..end];
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

impl Target {
    /// Parses a target URL. A bare host such as `example.com` is read as
    /// `https://example.com`.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let trimmed = input.trim();
        let with_scheme = if has_scheme(trimmed) {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let url = Url::parse(&with_scheme).map_err(|source| TargetError::Malformed {
            input: input.to_string(),
            source,
        })?;

        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(TargetError::UnsupportedScheme(scheme));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(TargetError::MissingHost(input.to_string())),
        };

        let port = url
            .port_or_known_default()
            .ok_or_else(|| TargetError::MissingHost(input.to_string()))?;

        debug!(%url, host = %host, port, "Parsed target.");
        Ok(Self { url, scheme, host, port })
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// The literal IP address of the host, if the URL names one.
    pub fn ip_literal(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    pub fn host_is_ip(&self) -> bool {
        self.ip_literal().is_some()
    }

    /// The registrable-looking domain: the host with a leading `www.` removed.
    pub fn domain(&self) -> &str {
        self.host.strip_prefix("www.").unwrap_or(&self.host)
    }

    /// `scheme://host[:port]` with no path, used to resolve absolute paths.
    pub fn base_url(&self) -> String {
        let host = match self.ip_literal() {
            Some(IpAddr::V6(_)) => format!("[{}]", self.host),
            _ => self.host.clone(),
        };
        match self.url.port() {
            Some(port) => format!("{}://{}:{}", self.scheme, host, port),
            None => format!("{}://{}", self.scheme, host),
        }
    }

    /// The host as it should appear in a record file name.
    pub fn record_domain(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}
