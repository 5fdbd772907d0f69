//! Per-panel configuration
//!
//! The admin and investor panels run the same session lifecycle against
//! different storage namespaces, routes and auth endpoints.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Access tokens live for 15 minutes
pub const ACCESS_TOKEN_TTL_MS: u64 = 15 * 60 * 1000;

/// Refresh tokens live for 30 days from sign-in
pub const REFRESH_TOKEN_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Renewal starts this long before the access token expires
pub const REFRESH_BUFFER_MS: u64 = 60 * 1000;

/// Background expiry check period
pub const REFRESH_CHECK_INTERVAL_MS: u64 = 30 * 1000;

/// Configuration for one panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Panel name used in logs
    pub name: String,
    /// Storage key prefix
    pub storage_namespace: String,
    /// Route of the sign-in page; every other route is protected
    pub sign_in_path: String,
    /// Route to land on once signed in
    pub home_path: String,
    /// Backend path accepting username/password
    pub sign_in_endpoint: String,
    /// Backend path exchanging a refresh token for an access token
    pub refresh_endpoint: String,
    pub access_ttl_ms: u64,
    pub refresh_ttl_ms: u64,
    pub refresh_buffer_ms: u64,
    pub check_interval_ms: u64,
}

impl PanelConfig {
    /// Build a panel whose routes and endpoints hang off `/<name>`
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            storage_namespace: name.to_string(),
            sign_in_path: format!("/{name}/signin"),
            home_path: format!("/{name}"),
            sign_in_endpoint: format!("/{name}/auth/signin"),
            refresh_endpoint: format!("/{name}/auth/refresh"),
            access_ttl_ms: ACCESS_TOKEN_TTL_MS,
            refresh_ttl_ms: REFRESH_TOKEN_TTL_MS,
            refresh_buffer_ms: REFRESH_BUFFER_MS,
            check_interval_ms: REFRESH_CHECK_INTERVAL_MS,
        }
    }

    pub fn admin() -> Self {
        Self::named("admin")
    }

    pub fn investor() -> Self {
        Self::named("investor")
    }

    /// Every route except the sign-in page needs an authorized session
    pub fn is_protected_path(&self, pathname: &str) -> bool {
        pathname != self.sign_in_path
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_millis(self.access_ttl_ms)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_millis(self.refresh_ttl_ms)
    }

    pub fn refresh_buffer_ms(&self) -> i64 {
        i64::try_from(self.refresh_buffer_ms).unwrap_or(i64::MAX)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Reject settings the session lifecycle cannot run with
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("access_ttl_ms", self.access_ttl_ms),
            ("refresh_ttl_ms", self.refresh_ttl_ms),
            ("check_interval_ms", self.check_interval_ms),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        match zero {
            Some((field, _)) => Err(SessionError::Configuration(format!(
                "`{}` panel: {field} must be greater than zero",
                self.name
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let admin = PanelConfig::admin();
        assert_eq!(admin.storage_namespace, "admin");
        assert_eq!(admin.sign_in_path, "/admin/signin");
        assert_eq!(admin.home_path, "/admin");
        assert_eq!(admin.refresh_endpoint, "/admin/auth/refresh");

        let investor = PanelConfig::investor();
        assert_eq!(investor.sign_in_endpoint, "/investor/auth/signin");
        assert_eq!(investor.home_path, "/investor");
        assert_ne!(admin.storage_namespace, investor.storage_namespace);
    }

    #[test]
    fn test_protected_paths() {
        let admin = PanelConfig::admin();
        assert!(!admin.is_protected_path("/admin/signin"));
        assert!(admin.is_protected_path("/admin"));
        assert!(admin.is_protected_path("/admin/users/42"));
    }

    #[test]
    fn test_durations() {
        let admin = PanelConfig::admin();
        assert_eq!(admin.access_ttl(), Duration::from_secs(900));
        assert_eq!(admin.refresh_ttl(), Duration::from_secs(2_592_000));
        assert_eq!(admin.refresh_buffer_ms(), 60_000);
        assert_eq!(admin.check_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_periods() {
        assert!(PanelConfig::admin().validate().is_ok());

        let config = PanelConfig {
            check_interval_ms: 0,
            ..PanelConfig::investor()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SessionError::Configuration(ref msg) if msg.contains("check_interval_ms")));

        let config = PanelConfig {
            access_ttl_ms: 0,
            ..PanelConfig::admin()
        };
        assert!(config.validate().is_err());
    }
}
