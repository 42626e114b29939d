// src/config.rs

use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::models::ProbeCategory;
use crate::error::ConfigError;

const DEFAULT_PORTS: &[u16] = &[80, 443, 22, 21, 23, 25, 110, 143, 3306, 5432, 6379, 27017];

const DEFAULT_SUBDOMAIN_LABELS: &[&str] = &[
    "www", "mail", "ftp", "admin", "api", "dev", "staging", "test", "blog", "shop", "portal",
    "vpn", "cdn", "m", "app",
];

/// Caps applied to the injection payload matrices.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InjectionLimits {
    pub max_parameters: Option<usize>,
    pub max_payloads: Option<usize>,
    /// Maximum number of (parameter, payload) requests in flight.
    pub concurrency: usize,
    /// Politeness delay before each matrix request.
    pub request_delay_ms: u64,
}

impl Default for InjectionLimits {
    fn default() -> Self {
        Self {
            max_parameters: None,
            max_payloads: None,
            concurrency: 4,
            request_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortScanConfig {
    pub ports: Vec<u16>,
    pub connect_timeout_ms: u64,
    pub max_ports: usize,
    pub concurrency: usize,
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PORTS.to_vec(),
            connect_timeout_ms: 1_000,
            max_ports: 1_024,
            concurrency: 32,
        }
    }
}

impl PortScanConfig {
    /// The ports to scan: deduplicated, in the configured order, capped at
    /// `max_ports`.
    pub fn effective_ports(&self) -> Vec<u16> {
        let mut seen = std::collections::HashSet::new();
        self.ports
            .iter()
            .copied()
            .filter(|port| seen.insert(*port))
            .take(self.max_ports)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubdomainConfig {
    pub labels: Vec<String>,
    pub concurrency: usize,
}

impl Default for SubdomainConfig {
    fn default() -> Self {
        Self {
            labels: DEFAULT_SUBDOMAIN_LABELS.iter().map(|s| s.to_string()).collect(),
            concurrency: 8,
        }
    }
}

/// Everything a single scan needs to know.
///
/// # Format
///
/// ```toml
/// categories = ["headers", "cors", "port-scan"]
/// probe_timeout_secs = 90
/// scan_deadline_secs = 300
///
/// [injection]
/// max_parameters = 3
/// concurrency = 2
///
/// [port_scan]
/// ports = [80, 443, 8080]
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    pub categories: Vec<ProbeCategory>,
    pub probe_timeout_secs: u64,
    pub scan_deadline_secs: u64,
    pub request_timeout_secs: u64,
    pub max_parallel_probes: usize,
    pub user_agent: String,
    pub injection: InjectionLimits,
    pub port_scan: PortScanConfig,
    pub subdomains: SubdomainConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            categories: ProbeCategory::all(),
            probe_timeout_secs: 90,
            scan_deadline_secs: 300,
            request_timeout_secs: 5,
            max_parallel_probes: 4,
            user_agent: format!("VanguardProbe/{}", env!("CARGO_PKG_VERSION")),
            injection: InjectionLimits::default(),
            port_scan: PortScanConfig::default(),
            subdomains: SubdomainConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Reads a TOML config file. A missing file yields the defaults.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults.");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "Loaded scan configuration.");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.categories.is_empty(), "at least one probe category must be requested"),
            (self.probe_timeout_secs == 0, "probe_timeout_secs must be positive"),
            (self.scan_deadline_secs == 0, "scan_deadline_secs must be positive"),
            (self.request_timeout_secs == 0, "request_timeout_secs must be positive"),
            (self.max_parallel_probes == 0, "max_parallel_probes must be positive"),
            (self.injection.concurrency == 0, "injection.concurrency must be positive"),
            (self.port_scan.concurrency == 0, "port_scan.concurrency must be positive"),
            (self.port_scan.connect_timeout_ms == 0, "port_scan.connect_timeout_ms must be positive"),
            (self.subdomains.concurrency == 0, "subdomains.concurrency must be positive"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }

    /// Requested categories, deduplicated and in execution order.
    pub fn requested_categories(&self) -> Vec<ProbeCategory> {
        let mut categories = self.categories.clone();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Constructs the default path to the config file.
pub fn default_config_path() -> PathBuf {
    match ProjectDirs::from("com", "vanguard-rs", env!("CARGO_PKG_NAME")) {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ScanConfig::from_toml("").unwrap();
        assert_eq!(config, ScanConfig::default());
        assert_eq!(config.categories.len(), 12);
    }

    #[test]
    fn parses_short_and_record_category_names() {
        let config = ScanConfig::from_toml(
            r#"
categories = ["csrf", "security_headers", "port-scan", "headers"]

[port_scan]
ports = [8080, 80, 8080]
"#,
        )
        .unwrap();
        assert_eq!(
            config.requested_categories(),
            vec![ProbeCategory::Headers, ProbeCategory::PortScan, ProbeCategory::Csrf]
        );
        assert_eq!(config.port_scan.effective_ports(), vec![8080, 80]);
        assert_eq!(config.port_scan.connect_timeout_ms, 1_000);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = ScanConfig::from_toml("[injection]\nconcurrency = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_category() {
        assert!(ScanConfig::from_toml("categories = [\"telepathy\"]").is_err());
    }

    #[test]
    fn read_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"request_timeout_secs = 9\n[injection]\nmax_payloads = 2\n")?;
        let config = ScanConfig::read(file.path())?;
        assert_eq!(config.request_timeout_secs, 9);
        assert_eq!(config.injection.max_payloads, Some(2));
        Ok(())
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = ScanConfig::read(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn max_ports_caps_the_list() {
        let config = PortScanConfig { ports: (1..=10).collect(), max_ports: 3, ..PortScanConfig::default() };
        assert_eq!(config.effective_ports(), vec![1, 2, 3]);
    }
}
