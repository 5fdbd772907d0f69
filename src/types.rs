//! Type definitions for panel sessions

use serde::{Deserialize, Serialize};

/// Default renewal buffer ahead of access token expiry (60 seconds)
pub const DEFAULT_REFRESH_BUFFER_MS: i64 = 60 * 1000;

/// Snapshot of the four persisted session fields
///
/// Any field may be missing: storage is read field by field and malformed
/// expiry values come back as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<i64>,
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<i64>,
}

impl StoredSession {
    /// Check if the access token can no longer be used
    ///
    /// True without a token, without a recorded expiry, or once
    /// `now_ms >= expires_at - buffer_ms`.
    pub fn is_access_token_expired(&self, now_ms: i64, buffer_ms: i64) -> bool {
        if self.access_token.is_none() {
            return true;
        }

        match self.access_token_expires_at {
            Some(expires_at) => now_ms >= expires_at.saturating_sub(buffer_ms),
            None => true,
        }
    }

    /// Check if the refresh token can no longer mint access tokens
    ///
    /// A refresh token without a recorded expiry never expires. Older sessions
    /// were stored without one and must keep working.
    pub fn is_refresh_token_expired(&self, now_ms: i64) -> bool {
        if self.refresh_token.is_none() {
            return true;
        }

        match self.refresh_token_expires_at {
            Some(expires_at) => now_ms >= expires_at,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Gate state for one mounted route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Checking,
    Authorized,
    Unauthorized,
}

/// Credentials posted to a panel sign-in endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Tokens returned by a panel sign-in endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SignInResponse {
    pub auth_token: String,
    pub refresh_token: String,
    /// Only the investor panel reports this
    #[serde(default)]
    pub investor_id: Option<String>,
}

/// Access token returned by a panel refresh endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub auth_token: String,
    #[serde(default)]
    pub investor_id: Option<String>,
}
