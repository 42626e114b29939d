// src/error.rs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Raised while turning a user-supplied URL into a `Target`. A scan never
/// starts when this happens.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("malformed target URL '{input}': {source}")]
    Malformed {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported scheme '{0}', only http and https targets can be scanned")]
    UnsupportedScheme(String),

    #[error("target URL '{0}' has no host")]
    MissingHost(String),
}

/// Errors raised inside a probe. They never leave the orchestrator: each one
/// becomes the `reason` of a `Failed` probe result.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("all {attempted} requests failed, last error: {last_error}")]
    AllRequestsFailed { attempted: usize, last_error: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Reasons a scan could not be started at all.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Persistence failures. Kept apart from scan failures so that callers can
/// still use the in-memory report when the write fails.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record {path} is not valid JSON: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {0} is not a JSON object")]
    NotAnObject(PathBuf),

    #[error("no stored record found for domain '{0}'")]
    NoRecord(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unknown probe category '{0}'")]
    UnknownCategory(String),
}
