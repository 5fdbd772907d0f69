//! Single-flight access token refresh

use crate::auth_client::AuthBackend;
use crate::clock::Clock;
use crate::error::SessionError;
use crate::token_store::TokenStore;
use async_singleflight::Group;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exchanges the stored refresh token for a new access token
///
/// At most one refresh request per panel is in flight; callers arriving while
/// one is pending wait for it and get its outcome.
pub struct RefreshCoordinator<B: AuthBackend> {
    store: TokenStore,
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    /// One refresh at a time for this panel; joiners receive the outcome,
    /// failures as their display text
    refresh_singleflight: Group<String, String>,
}

impl<B: AuthBackend> RefreshCoordinator<B> {
    pub fn new(store: TokenStore, backend: Arc<B>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            backend,
            clock,
            refresh_singleflight: Group::new(),
        }
    }

    /// Refresh the access token, returning whether a valid one is now stored
    ///
    /// Without a live refresh token the session is cleared and no request is
    /// made. Any refresh failure also clears the session; there is no retry.
    pub async fn refresh(&self) -> bool {
        let snapshot = self.store.snapshot();
        let refresh_token = match snapshot.refresh_token.clone() {
            Some(token) if !snapshot.is_refresh_token_expired(self.clock.now_ms()) => token,
            _ => {
                debug!(panel = %self.store.namespace(), "No live refresh token, clearing session");
                self.invalidate();
                return false;
            }
        };

        let key = self.store.namespace().to_string();
        let (success_opt, error_opt, shared) = self
            .refresh_singleflight
            .work(&key, async {
                match self.do_refresh(&refresh_token).await {
                    Ok(access_token) => Ok(access_token),
                    Err(e) => {
                        let err_msg = e.to_string();
                        warn!(panel = %key, error = %err_msg, "Access token refresh failed");
                        self.invalidate();
                        Err(err_msg)
                    }
                }
            })
            .await;

        if shared {
            debug!(panel = %key, "Joined in-flight refresh");
        }

        matches!((success_opt, error_opt), (Some(_), None))
    }

    async fn do_refresh(&self, refresh_token: &str) -> Result<String, SessionError> {
        let response = self.backend.refresh(refresh_token).await?;
        if response.auth_token.is_empty() {
            return Err(SessionError::InvalidResponse(
                "refresh response carried an empty auth_token".to_string(),
            ));
        }

        self.store
            .set_refreshed_access_token(&response.auth_token, self.clock.now_ms())?;
        self.backend.set_bearer_token(Some(response.auth_token.clone()));
        info!(panel = %self.store.namespace(), "Access token refreshed successfully");

        Ok(response.auth_token)
    }

    /// Clear the stored session and drop the bearer token
    pub fn invalidate(&self) {
        if let Err(e) = self.store.clear() {
            warn!(panel = %self.store.namespace(), error = %e, "Failed to clear stored session");
        }
        self.backend.set_bearer_token(None);
    }
}
