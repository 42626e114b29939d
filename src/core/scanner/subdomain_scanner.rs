// src/core/scanner/subdomain_scanner.rs

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use once_cell::sync::OnceCell;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::models::{
    Finding, FindingTarget, ProbeCategory, ProbeData, ProbeResult, Severity, Subdomain, SubdomainData,
};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

/// Name resolution used by subdomain enumeration.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Returns the addresses `name` resolves to.
    ///
    /// # Returns
    /// `Ok` with an empty list when the name does not exist, `Err` when the
    /// lookup itself failed (resolver unreachable, timeout, ...).
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, String>;
}

/// Resolution through hickory with the default resolver configuration.
/// The resolver is built on first use, inside the runtime.
#[derive(Default)]
pub struct HickoryResolver {
    resolver: OnceCell<TokioAsyncResolver>,
}

#[async_trait]
impl NameResolver for HickoryResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, String> {
        let resolver = self
            .resolver
            .get_or_init(|| TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()));
        match resolver.lookup_ip(name).await {
            Ok(lookup) => Ok(lookup.iter().collect()),
            // NXDOMAIN and empty answers are a negative, not a failure.
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(format!("DNS Error: {}", e)),
        }
    }
}

/// The outcome of resolving a label list against one domain.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub discovered: Vec<Subdomain>,
    pub lookup_errors: usize,
    pub last_error: Option<String>,
}

/// Resolves `label.domain` for each label and keeps the names that resolve.
///
/// # Arguments
/// * `resolver` - The name resolution backend.
/// * `domain` - The parent domain, without a leading `www.`.
/// * `labels` - The candidate labels, in report order.
/// * `concurrency` - Maximum number of lookups in flight.
///
/// # Returns
/// The resolved names in label order, plus a count of lookups that errored.
pub async fn enumerate_subdomains(
    resolver: &dyn NameResolver,
    domain: &str,
    labels: &[String],
    concurrency: usize,
) -> Enumeration {
    let lookups: Vec<_> = labels
        .iter()
        .map(|label| {
            let name = format!("{}.{}", label, domain);
            async move {
                let outcome = resolver.resolve(&name).await;
                (name, outcome)
            }
        })
        .collect();
    let outcomes: Vec<_> = stream::iter(lookups).buffered(concurrency.max(1)).collect().await;

    let mut enumeration = Enumeration::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(addresses) if !addresses.is_empty() => {
                debug!(name = %name, addresses = ?addresses, "Subdomain resolved.");
                enumeration.discovered.push(Subdomain { name, addresses });
            }
            Ok(_) => debug!(name = %name, "Subdomain does not exist."),
            Err(e) => {
                warn!(name = %name, error = %e, "Subdomain lookup failed.");
                enumeration.lookup_errors += 1;
                enumeration.last_error = Some(e);
            }
        }
    }
    enumeration
}

/// Wordlist subdomain enumeration against the target's domain.
pub struct SubdomainProbe {
    resolver: Arc<dyn NameResolver>,
}

impl Default for SubdomainProbe {
    fn default() -> Self {
        Self::with_resolver(Arc::new(HickoryResolver::default()))
    }
}

impl SubdomainProbe {
    pub fn with_resolver(resolver: Arc<dyn NameResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Probe for SubdomainProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::SubdomainEnum
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        if ctx.target.host_is_ip() {
            info!(host = %ctx.target.host, "Skipping subdomain enumeration for IP address.");
            return Ok(ProbeResult::skipped(
                self.category(),
                "target host is a literal IP address",
            ));
        }

        let domain = ctx.target.domain().to_string();
        let labels = &ctx.config.subdomains.labels;
        info!(domain = %domain, labels = labels.len(), "Starting subdomain enumeration.");

        let Enumeration { discovered, lookup_errors, last_error } =
            enumerate_subdomains(self.resolver.as_ref(), &domain, labels, ctx.config.subdomains.concurrency)
                .await;

        // A resolver that fails every lookup says nothing about the domain.
        if !labels.is_empty() && lookup_errors == labels.len() {
            return Err(ProbeError::Dns(format!(
                "all {} lookups failed, last error: {}",
                lookup_errors,
                last_error.unwrap_or_default()
            )));
        }

        let findings = discovered
            .iter()
            .map(|sub| {
                let addresses: Vec<String> = sub.addresses.iter().map(|a| a.to_string()).collect();
                Finding::new(ProbeCategory::SubdomainEnum, Severity::Info, FindingTarget::Host(sub.name.clone()))
                    .with_pattern("resolves")
                    .with_evidence(addresses.join(", "))
            })
            .collect();

        info!(count = discovered.len(), "Subdomain enumeration finished.");
        let data = SubdomainData { domain, discovered, checked: labels.len(), lookup_errors };
        Ok(ProbeResult::completed(self.category(), ProbeData::Subdomains(data), findings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::core::target::Target;
    use std::collections::HashMap;

    struct FixedResolver(HashMap<String, Vec<IpAddr>>);

    #[async_trait]
    impl NameResolver for FixedResolver {
        async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, String> {
            Ok(self.0.get(name).cloned().unwrap_or_default())
        }
    }

    struct BrokenResolver;

    #[async_trait]
    impl NameResolver for BrokenResolver {
        async fn resolve(&self, _name: &str) -> Result<Vec<IpAddr>, String> {
            Err("request timed out".to_string())
        }
    }

    fn context() -> ScanContext {
        ScanContext::new(Target::parse("https://www.example.com").unwrap(), None, ScanConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn only_resolving_labels_are_reported() {
        let mut records = HashMap::new();
        records.insert("api.example.com".to_string(), vec!["10.0.0.1".parse().unwrap()]);
        records.insert("mail.example.com".to_string(), vec!["10.0.0.2".parse().unwrap()]);
        records.insert("ghost.example.com".to_string(), Vec::new());
        let resolver = FixedResolver(records);

        let labels: Vec<String> = ["mail", "www", "api", "ghost"].iter().map(|s| s.to_string()).collect();
        let found = enumerate_subdomains(&resolver, "example.com", &labels, 2).await;

        let names: Vec<&str> = found.discovered.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["mail.example.com", "api.example.com"]);
        assert_eq!(found.lookup_errors, 0);
    }

    #[tokio::test]
    async fn broken_resolver_fails_instead_of_reporting_nothing() {
        let enumerator = SubdomainProbe::with_resolver(Arc::new(BrokenResolver));
        let err = enumerator.run(&context()).await.unwrap_err();
        assert!(err.to_string().contains("request timed out"));
    }

    #[tokio::test]
    async fn nonexistent_labels_complete_with_no_findings() {
        let enumerator = SubdomainProbe::with_resolver(Arc::new(FixedResolver(HashMap::new())));
        let result = enumerator.run(&context()).await.unwrap();
        assert!(result.findings.is_empty());
        let Some(ProbeData::Subdomains(data)) = result.data else {
            panic!("expected subdomain data");
        };
        assert_eq!(data.domain, "example.com");
        assert_eq!(data.lookup_errors, 0);
    }
}
