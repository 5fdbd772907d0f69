//! Console configuration: backend location and both panels

use crate::error::{Result, SessionError};
use crate::panel::PanelConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable checked first for the backend URL
pub const API_URL_ENV: &str = "API_URL";

/// Fallback environment variable for the backend URL
pub const PUBLIC_API_URL_ENV: &str = "NEXT_PUBLIC_API_URL";

/// Default HTTP request timeout (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleConfig {
    /// Backend base URL, normalized by [`normalize_api_url`]
    pub api_url: String,
    pub request_timeout_ms: u64,
    pub admin: PanelConfig,
    pub investor: PanelConfig,
}

/// File layout; panel tables only list the settings they override
#[derive(Debug, Deserialize)]
struct ConsoleFile {
    api_url: String,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    #[serde(default)]
    admin: toml::Table,
    #[serde(default)]
    investor: toml::Table,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl ConsoleConfig {
    pub fn new(api_url: &str) -> Result<Self> {
        Ok(Self {
            api_url: normalize_api_url(api_url)?,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            admin: PanelConfig::admin(),
            investor: PanelConfig::investor(),
        })
    }

    /// Build from `API_URL`, falling back to `NEXT_PUBLIC_API_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = [API_URL_ENV, PUBLIC_API_URL_ENV]
            .into_iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                SessionError::Configuration(format!(
                    "Missing {API_URL_ENV} (or {PUBLIC_API_URL_ENV}) for the console API client"
                ))
            })?;
        Self::new(&raw)
    }

    /// Load a TOML file; omitted panel settings take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| {
            SessionError::Configuration(format!("{}: {e}", path.display()))
        })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let file: ConsoleFile = toml::from_str(text)
            .map_err(|e| SessionError::Configuration(format!("invalid console config: {e}")))?;
        Ok(Self {
            api_url: normalize_api_url(&file.api_url)?,
            request_timeout_ms: file.request_timeout_ms,
            admin: overlay_panel(PanelConfig::admin(), file.admin)?,
            investor: overlay_panel(PanelConfig::investor(), file.investor)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Apply the keys present in `overrides` on top of a preset
fn overlay_panel(preset: PanelConfig, overrides: toml::Table) -> Result<PanelConfig> {
    let invalid = |e: &dyn std::fmt::Display| {
        SessionError::Configuration(format!("invalid `{}` panel config: {e}", preset.name))
    };
    let mut merged = match toml::Value::try_from(&preset).map_err(|e| invalid(&e))? {
        toml::Value::Table(table) => table,
        _ => return Err(invalid(&"panel preset is not a table")),
    };
    merged.extend(overrides);
    let panel: PanelConfig = toml::Value::Table(merged)
        .try_into()
        .map_err(|e| invalid(&e))?;
    panel.validate()?;
    Ok(panel)
}

/// Prefix `http://` when no scheme is given and strip trailing slashes
pub fn normalize_api_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SessionError::Configuration("API URL is empty".to_string()));
    }

    let normalized = if has_scheme(raw) {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    Ok(normalized.trim_end_matches('/').to_string())
}

/// `scheme://` where scheme is a letter followed by letters, digits, `+`, `-` or `.`
fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_api_url() {
        assert_eq!(
            normalize_api_url("api.example.com/").unwrap(),
            "http://api.example.com"
        );
        assert_eq!(
            normalize_api_url("https://api.example.com///").unwrap(),
            "https://api.example.com"
        );
        assert_eq!(
            normalize_api_url("localhost:8080").unwrap(),
            "http://localhost:8080"
        );
        assert!(normalize_api_url("  ").is_err());
    }

    #[test]
    fn test_env_lookup_prefers_api_url() {
        let config = ConsoleConfig::from_lookup(|name| match name {
            API_URL_ENV => Some("https://private.example.com/".to_string()),
            PUBLIC_API_URL_ENV => Some("https://public.example.com".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.api_url, "https://private.example.com");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_env_lookup_falls_back_to_public_url() {
        let config = ConsoleConfig::from_lookup(|name| {
            (name == PUBLIC_API_URL_ENV).then(|| "public.example.com".to_string())
        })
        .unwrap();
        assert_eq!(config.api_url, "http://public.example.com");
    }

    #[test]
    fn test_env_lookup_missing_url_is_error() {
        let err = ConsoleConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn test_toml_overrides_keep_defaults() {
        let config = ConsoleConfig::from_toml(
            r#"
            api_url = "backend.internal:9000/"

            [investor]
            storage_namespace = "investor-v2"
            check_interval_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.api_url, "http://backend.internal:9000");
        assert_eq!(config.admin, PanelConfig::admin());
        assert_eq!(config.investor.storage_namespace, "investor-v2");
        assert_eq!(config.investor.check_interval_ms, 5000);
        assert_eq!(config.investor.sign_in_path, "/investor/signin");
        assert_eq!(config.investor.access_ttl_ms, crate::panel::ACCESS_TOKEN_TTL_MS);
    }

    #[test]
    fn test_toml_rejects_mistyped_panel_setting() {
        let err = ConsoleConfig::from_toml(
            r#"
            api_url = "http://backend"

            [admin]
            check_interval_ms = "often"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn test_toml_rejects_zero_check_interval() {
        let err = ConsoleConfig::from_toml(
            r#"
            api_url = "http://backend"

            [admin]
            check_interval_ms = 0
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, SessionError::Configuration(_)));
        assert!(err.to_string().contains("check_interval_ms"));
    }
}
