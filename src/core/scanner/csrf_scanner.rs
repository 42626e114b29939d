// src/core/scanner/csrf_scanner.rs

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::dom::SnapshotForm;
use crate::core::models::{
    CsrfData, CsrfToken, Finding, FindingTarget, ProbeCategory, ProbeData, ProbeResult, Severity,
};
use crate::core::scanner::{Probe, ScanContext};
use crate::error::ProbeError;

const TOKEN_MARKERS: &[&str] = &["csrf", "token", "_token"];

/// Field names containing `csrf` or `token`, case-insensitively.
pub fn is_token_field(name: &str) -> bool {
    let lowered = name.to_lowercase();
    TOKEN_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Inspects every form for anti-CSRF token fields.
///
/// # Arguments
/// * `forms` - The forms of the page snapshot, in document order.
///
/// # Returns
/// The token summary, keeping only field names and value lengths, and one
/// finding per form without a token field.
pub fn analyze_forms(forms: &[SnapshotForm]) -> (CsrfData, Vec<Finding>) {
    let mut data = CsrfData {
        forms_inspected: forms.len(),
        ..CsrfData::default()
    };
    let mut findings = Vec::new();

    for (index, form) in forms.iter().enumerate() {
        let before = data.tokens.len();
        for input in &form.inputs {
            let Some(name) = input.name.as_deref() else { continue };
            if is_token_field(name) {
                data.tokens.push(CsrfToken {
                    form_index: index,
                    field_name: name.to_string(),
                    value_length: input.value.as_deref().map_or(0, str::len),
                });
            }
        }

        if data.tokens.len() == before {
            debug!(form = index, action = ?form.action, "Form has no anti-CSRF token.");
            let mut finding = Finding::new(ProbeCategory::Csrf, Severity::Warning, FindingTarget::Form(index))
                .with_pattern("no anti-CSRF token field");
            if let Some(action) = &form.action {
                finding = finding.with_evidence(format!(
                    "{} {}",
                    form.method.as_deref().unwrap_or("GET").to_uppercase(),
                    action
                ));
            }
            findings.push(finding);
        }
    }

    data.protection_detected = !data.tokens.is_empty();
    (data, findings)
}

/// Looks for anti-CSRF token fields in the snapshot's forms.
pub struct CsrfProbe;

#[async_trait]
impl Probe for CsrfProbe {
    fn category(&self) -> ProbeCategory {
        ProbeCategory::Csrf
    }

    async fn run(&self, ctx: &ScanContext) -> Result<ProbeResult, ProbeError> {
        let Some(dom) = ctx.dom.as_ref() else {
            return Ok(ProbeResult::skipped(self.category(), "no DOM snapshot supplied"));
        };

        let (data, findings) = analyze_forms(&dom.forms);
        info!(
            forms = data.forms_inspected,
            tokens = data.tokens.len(),
            protected = data.protection_detected,
            "CSRF check finished."
        );
        Ok(ProbeResult::completed(self.category(), ProbeData::Csrf(data), findings))
    }
}
