//! Panel-scoped persistence of the four session fields

use crate::error::Result;
use crate::storage::KeyValueStorage;
use crate::types::StoredSession;
use std::sync::Arc;
use std::time::Duration;

const AUTH_TOKEN: &str = "auth_token";
const AUTH_TOKEN_EXPIRES_AT: &str = "auth_token_expires_at";
const REFRESH_TOKEN: &str = "refresh_token";
const REFRESH_TOKEN_EXPIRES_AT: &str = "refresh_token_expires_at";

/// One of the persisted session fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    AccessToken,
    AccessTokenExpiresAt,
    RefreshToken,
    RefreshTokenExpiresAt,
}

impl SessionField {
    pub const ALL: [SessionField; 4] = [
        SessionField::AccessToken,
        SessionField::AccessTokenExpiresAt,
        SessionField::RefreshToken,
        SessionField::RefreshTokenExpiresAt,
    ];

    fn suffix(self) -> &'static str {
        match self {
            SessionField::AccessToken => AUTH_TOKEN,
            SessionField::AccessTokenExpiresAt => AUTH_TOKEN_EXPIRES_AT,
            SessionField::RefreshToken => REFRESH_TOKEN,
            SessionField::RefreshTokenExpiresAt => REFRESH_TOKEN_EXPIRES_AT,
        }
    }
}

/// Token store for a single panel
///
/// Keys are namespaced (`<namespace>.auth_token`, ...) so several panels can
/// share one storage backend without colliding.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    namespace: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenStore {
    /// Create a token store over `storage`
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        namespace: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Storage key for a field
    pub fn key(&self, field: SessionField) -> String {
        format!("{}.{}", self.namespace, field.suffix())
    }

    /// Get the raw stored value of a field
    pub fn get(&self, field: SessionField) -> Option<String> {
        self.storage.get_item(&self.key(field))
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(SessionField::AccessToken).filter(|v| !v.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get(SessionField::RefreshToken).filter(|v| !v.is_empty())
    }

    pub fn access_token_expires_at(&self) -> Option<i64> {
        self.read_millis(SessionField::AccessTokenExpiresAt)
    }

    pub fn refresh_token_expires_at(&self) -> Option<i64> {
        self.read_millis(SessionField::RefreshTokenExpiresAt)
    }

    /// Read all four fields
    pub fn snapshot(&self) -> StoredSession {
        StoredSession {
            access_token: self.access_token(),
            access_token_expires_at: self.access_token_expires_at(),
            refresh_token: self.refresh_token(),
            refresh_token_expires_at: self.refresh_token_expires_at(),
        }
    }

    /// Store a freshly signed-in session, replacing any previous one
    pub fn set_session(&self, access_token: &str, refresh_token: &str, now_ms: i64) -> Result<()> {
        self.set(SessionField::AccessToken, access_token)?;
        self.set(
            SessionField::AccessTokenExpiresAt,
            &(now_ms + ttl_millis(self.access_ttl)).to_string(),
        )?;
        self.set(SessionField::RefreshToken, refresh_token)?;
        self.set(
            SessionField::RefreshTokenExpiresAt,
            &(now_ms + ttl_millis(self.refresh_ttl)).to_string(),
        )?;
        Ok(())
    }

    /// Store a refreshed access token; refresh token fields stay as they are
    pub fn set_refreshed_access_token(&self, access_token: &str, now_ms: i64) -> Result<()> {
        self.set(SessionField::AccessToken, access_token)?;
        self.set(
            SessionField::AccessTokenExpiresAt,
            &(now_ms + ttl_millis(self.access_ttl)).to_string(),
        )?;
        Ok(())
    }

    /// Remove all four fields
    ///
    /// Every field is attempted even if an earlier removal fails.
    pub fn clear(&self) -> Result<()> {
        let mut first_error = None;
        for field in SessionField::ALL {
            if let Err(e) = self.storage.remove_item(&self.key(field)) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn set(&self, field: SessionField, value: &str) -> Result<()> {
        self.storage.set_item(&self.key(field), value)
    }

    /// Parse a stored millisecond timestamp; zero or anything non-numeric
    /// reads as absent
    fn read_millis(&self, field: SessionField) -> Option<i64> {
        let raw = self.get(field)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value = match trimmed.parse::<i64>() {
            Ok(value) => value,
            Err(_) => trimmed
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(|value| value as i64)?,
        };
        (value != 0).then_some(value)
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}
