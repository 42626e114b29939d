// src/core/dom.rs

//! Rendered-page data consumed by the DOM-dependent probes.
//!
//! The engine does not render pages. A snapshot normally comes from the
//! browser-automation side as JSON; `DomSnapshot::from_html` is a static
//! fallback that reads forms out of raw HTML and cookies out of `Set-Cookie`
//! headers.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormInput {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub input_type: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnapshotForm {
    pub action: Option<String>,
    pub method: Option<String>,
    pub inputs: Vec<FormInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DomSnapshot {
    pub cookies: Vec<SnapshotCookie>,
    pub forms: Vec<SnapshotForm>,
}

impl DomSnapshot {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Builds a snapshot from a fetched page without running a browser.
    pub fn from_html(html: &str, set_cookie_headers: &[&str]) -> Self {
        let document = Html::parse_document(html);
        let forms = parse_forms(&document);
        let cookies: Vec<SnapshotCookie> = set_cookie_headers
            .iter()
            .filter_map(|header| parse_set_cookie(header))
            .collect();
        debug!(forms = forms.len(), cookies = cookies.len(), "Built static DOM snapshot.");
        Self { cookies, forms }
    }
}

fn parse_forms(document: &Html) -> Vec<SnapshotForm> {
    let (Ok(form_selector), Ok(field_selector)) = (
        Selector::parse("form"),
        Selector::parse("input, textarea, select"),
    ) else {
        return Vec::new();
    };

    document
        .select(&form_selector)
        .map(|form| SnapshotForm {
            action: form.value().attr("action").map(String::from),
            method: form.value().attr("method").map(String::from),
            inputs: form
                .select(&field_selector)
                .map(|field| FormInput {
                    name: field.value().attr("name").map(String::from),
                    input_type: field.value().attr("type").map(String::from),
                    value: field.value().attr("value").map(String::from),
                })
                .collect(),
        })
        .collect()
}

/// Parses one `Set-Cookie` header value. Returns `None` when there is no
/// `name=value` pair.
pub fn parse_set_cookie(header: &str) -> Option<SnapshotCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = SnapshotCookie {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        ..SnapshotCookie::default()
    };

    for attribute in parts {
        let (key, val) = match attribute.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attribute.trim(), None),
        };
        match key.to_ascii_lowercase().as_str() {
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "samesite" => cookie.same_site = val.map(String::from),
            "domain" => cookie.domain = val.map(String::from),
            "path" => cookie.path = val.map(String::from),
            _ => {}
        }
    }
    Some(cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_browser_snapshot() {
        let snapshot = DomSnapshot::from_json(
            r#"{
                "cookies": [{"name": "sid", "value": "abc", "domain": ".example.com",
                             "secure": true, "httpOnly": true, "sameSite": "Lax"}],
                "forms": [{"action": "/login", "inputs": [{"name": "csrf_token", "type": "hidden", "value": "xyz"}]}]
            }"#,
        )
        .unwrap();
        assert!(snapshot.cookies[0].http_only);
        assert_eq!(snapshot.cookies[0].same_site.as_deref(), Some("Lax"));
        assert_eq!(snapshot.forms[0].inputs[0].input_type.as_deref(), Some("hidden"));
    }

    #[test]
    fn parses_set_cookie_attributes() {
        let cookie = parse_set_cookie("session=\"42\"; Path=/; Secure; HttpOnly; SameSite=Strict").unwrap();
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "42");
        assert!(cookie.secure && cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("Strict"));
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert!(parse_set_cookie("garbage").is_none());
    }

    #[test]
    fn extracts_forms_from_html() {
        let html = r#"
            <html><body>
              <form action="/search" method="get"><input name="q"></form>
              <form action="/post" method="post">
                <input type="hidden" name="_token" value="secret">
                <textarea name="comment"></textarea>
              </form>
            </body></html>"#;
        let snapshot = DomSnapshot::from_html(html, &["a=b; Secure"]);
        assert_eq!(snapshot.forms.len(), 2);
        assert_eq!(snapshot.forms[1].inputs.len(), 2);
        assert_eq!(snapshot.forms[1].inputs[0].name.as_deref(), Some("_token"));
        assert_eq!(snapshot.cookies.len(), 1);
    }
}
