//! Browser-extension cookie import.
//!
//! Parses the JSON array exported by common cookie-editor extensions and
//! injects it into a live CDP page with `Network.setCookies`, so the export
//! can skip the interactive login.

use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("No cookies provided")]
    Empty,

    #[error("Invalid cookie format: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Cookies must be a JSON array")]
    NotAnArray,

    #[error("Cookie missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Cookie rejected by the browser: {0}")]
    Rejected(String),
}

/// One cookie as exported by the extension. Only the fields the browser
/// needs are kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(rename = "expirationDate", default)]
    pub expiration_date: Option<f64>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(rename = "httpOnly", default)]
    pub http_only: Option<bool>,
}

fn default_path() -> String {
    "/".to_string()
}

const REQUIRED_FIELDS: [&str; 3] = ["name", "value", "domain"];

impl SessionCookie {
    /// Convert into the CDP parameter. Expiry is truncated to whole seconds.
    pub fn to_cookie_param(&self) -> Result<CookieParam, CookieError> {
        let mut raw = json!({
            "name": self.name,
            "value": self.value,
            "domain": self.domain,
            "path": self.path,
        });
        if let Some(exp) = self.expiration_date {
            raw["expires"] = json!(exp.trunc());
        }
        if let Some(secure) = self.secure {
            raw["secure"] = json!(secure);
        }
        if let Some(http_only) = self.http_only {
            raw["httpOnly"] = json!(http_only);
        }
        serde_json::from_value(raw).map_err(|e| CookieError::Rejected(e.to_string()))
    }
}

/// Parse and validate an exported cookie array.
///
/// The whole import fails on the first cookie missing a required field, so a
/// half-applied session never reaches the browser.
pub fn parse_cookies(input: &str) -> Result<Vec<SessionCookie>, CookieError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CookieError::Empty);
    }
    let value: Value = serde_json::from_str(input)?;
    let Value::Array(items) = value else {
        return Err(CookieError::NotAnArray);
    };

    let mut cookies = Vec::with_capacity(items.len());
    for item in items {
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| item.get(**f).is_none())
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CookieError::MissingFields(missing));
        }
        cookies.push(serde_json::from_value(item)?);
    }
    if cookies.is_empty() {
        return Err(CookieError::Empty);
    }
    Ok(cookies)
}

/// Inject parsed cookies into the page. Call before reloading.
pub async fn inject_into_page(
    page: &chromiumoxide::Page,
    cookies: &[SessionCookie],
) -> Result<usize, CookieError> {
    let params = cookies
        .iter()
        .map(SessionCookie::to_cookie_param)
        .collect::<Result<Vec<_>, _>>()?;
    let count = params.len();
    page.execute(SetCookiesParams::new(params))
        .await
        .map_err(|e| CookieError::Rejected(e.to_string()))?;
    info!("cookies: 💉 injected {} cookies into CDP page", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extension_export() {
        let raw = r#"[
            {"name": "c_user", "value": "100", "domain": ".facebook.com",
             "expirationDate": 1767225600.75, "secure": true, "httpOnly": false},
            {"name": "xs", "value": "abc", "domain": ".facebook.com", "path": "/x"}
        ]"#;
        let cookies = parse_cookies(raw).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].path, "/");
        assert_eq!(cookies[0].secure, Some(true));
        assert_eq!(cookies[1].path, "/x");
        assert_eq!(cookies[1].expiration_date, None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse_cookies("   "), Err(CookieError::Empty)));
        assert!(matches!(parse_cookies("[]"), Err(CookieError::Empty)));
        assert!(matches!(parse_cookies("{not json"), Err(CookieError::InvalidJson(_))));
        assert!(matches!(parse_cookies(r#"{"name": "a"}"#), Err(CookieError::NotAnArray)));
    }

    #[test]
    fn missing_fields_are_listed() {
        let err = parse_cookies(r#"[{"name": "a"}]"#).unwrap_err();
        assert_eq!(err.to_string(), "Cookie missing required fields: value, domain");
    }

    #[test]
    fn converts_to_cdp_param_with_whole_second_expiry() {
        let cookie = SessionCookie {
            name: "xs".into(),
            value: "abc".into(),
            domain: ".facebook.com".into(),
            path: "/".into(),
            expiration_date: Some(1767225600.75),
            secure: Some(true),
            http_only: Some(true),
        };
        let param = cookie.to_cookie_param().unwrap();
        let back = serde_json::to_value(&param).unwrap();
        assert_eq!(back["name"], "xs");
        assert_eq!(back["domain"], ".facebook.com");
        assert_eq!(back["expires"].as_f64(), Some(1767225600.0));
        assert_eq!(back["httpOnly"], true);
    }
}
