//! Session lifecycle manager: one instance per panel

use crate::auth_client::{AuthBackend, PanelHttpClient};
use crate::cache::RequestCache;
use crate::clock::{Clock, SystemClock};
use crate::config::ConsoleConfig;
use crate::error::Result;
use crate::gate::{GateHandle, Navigator, Visibility};
use crate::panel::PanelConfig;
use crate::refresh::RefreshCoordinator;
use crate::storage::KeyValueStorage;
use crate::token_store::TokenStore;
use crate::types::StoredSession;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Owns one panel's session: token store, backend and refresh coordinator
///
/// Nothing else writes the panel's token store. The admin and investor
/// panels are two instances of this type with different [`PanelConfig`]s.
pub struct SessionManager<B: AuthBackend> {
    config: PanelConfig,
    store: TokenStore,
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    coordinator: RefreshCoordinator<B>,
    cache: RequestCache,
}

impl<B: AuthBackend> SessionManager<B> {
    pub fn new(
        config: PanelConfig,
        storage: Arc<dyn KeyValueStorage>,
        backend: Arc<B>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let store = TokenStore::new(
            storage,
            config.storage_namespace.clone(),
            config.access_ttl(),
            config.refresh_ttl(),
        );
        let coordinator = RefreshCoordinator::new(store.clone(), backend.clone(), clock.clone());
        let cache = RequestCache::new(clock.clone());

        Arc::new(Self {
            config,
            store,
            backend,
            clock,
            coordinator,
            cache,
        })
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Request cache for this panel's API reads
    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn snapshot(&self) -> StoredSession {
        self.store.snapshot()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    pub fn is_access_token_expired(&self) -> bool {
        self.snapshot()
            .is_access_token_expired(self.now_ms(), self.config.refresh_buffer_ms())
    }

    pub fn is_refresh_token_expired(&self) -> bool {
        self.snapshot().is_refresh_token_expired(self.now_ms())
    }

    /// A usable access token or a live refresh token is stored
    pub fn has_active_session(&self) -> bool {
        let snapshot = self.snapshot();
        let now = self.now_ms();
        (snapshot.access_token.is_some()
            && !snapshot.is_access_token_expired(now, self.config.refresh_buffer_ms()))
            || (snapshot.refresh_token.is_some() && !snapshot.is_refresh_token_expired(now))
    }

    /// Exchange credentials for a session
    ///
    /// A rejected sign-in clears whatever session was stored before and
    /// returns the backend's message for display.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<()> {
        match self.backend.sign_in(username, password).await {
            Ok(response) => self.store_sign_in(&response.auth_token, &response.refresh_token),
            Err(e) => {
                warn!(panel = %self.config.name, error = %e, "Sign-in failed");
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Store tokens obtained from a sign-in and start using the access token
    pub fn store_sign_in(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.store
            .set_session(access_token, refresh_token, self.now_ms())?;
        self.backend.set_bearer_token(Some(access_token.to_string()));
        self.cache.clear();
        info!(panel = %self.config.name, "Signed in");
        Ok(())
    }

    /// Refresh the access token through the single-flight coordinator
    pub async fn refresh(&self) -> bool {
        self.coordinator.refresh().await
    }

    /// Clear the stored session and the bearer token
    pub fn invalidate(&self) {
        self.coordinator.invalidate();
        self.cache.clear();
    }

    /// Sign out and send the user to the sign-in page
    pub fn logout(&self, navigator: &dyn Navigator) {
        self.invalidate();
        info!(panel = %self.config.name, "Logged out");
        navigator.replace(&self.config.sign_in_path);
    }

    /// Mount a session gate on `pathname`
    ///
    /// `visibility` delivers tab visibility changes; pass `None` when there is
    /// no such signal and rely on the interval check alone.
    pub fn mount(
        self: &Arc<Self>,
        pathname: &str,
        navigator: Arc<dyn Navigator>,
        visibility: Option<watch::Receiver<Visibility>>,
    ) -> GateHandle<B> {
        GateHandle::mount(Arc::clone(self), pathname, navigator, visibility)
    }
}

impl SessionManager<PanelHttpClient> {
    /// Manager talking to the configured backend over HTTP
    pub fn connect(
        console: &ConsoleConfig,
        panel: PanelConfig,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Arc<Self>> {
        panel.validate()?;
        let backend = Arc::new(PanelHttpClient::new(console, &panel)?);
        Ok(Self::new(panel, storage, backend, Arc::new(SystemClock)))
    }
}

/// Both console panels over one shared storage backend
pub struct ConsolePanels {
    pub admin: Arc<SessionManager<PanelHttpClient>>,
    pub investor: Arc<SessionManager<PanelHttpClient>>,
}

impl ConsolePanels {
    pub fn new(console: &ConsoleConfig, storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        Ok(Self {
            admin: SessionManager::connect(console, console.admin.clone(), storage.clone())?,
            investor: SessionManager::connect(console, console.investor.clone(), storage)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SessionError;
    use crate::refresh::tests::FakeBackend;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    fn manager(clock: &Arc<ManualClock>) -> Arc<SessionManager<FakeBackend>> {
        SessionManager::new(
            PanelConfig::admin(),
            Arc::new(MemoryStorage::new()),
            Arc::new(FakeBackend::new()),
            clock.clone(),
        )
    }

    #[tokio::test]
    async fn test_sign_in_stores_session() {
        let clock = Arc::new(ManualClock::new(5_000));
        let manager = manager(&clock);

        manager.sign_in("admin", "secret").await.unwrap();

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.access_token.as_deref(), Some("A1"));
        assert_eq!(snapshot.refresh_token.as_deref(), Some("R1"));
        assert_eq!(snapshot.access_token_expires_at, Some(905_000));
        assert_eq!(manager.backend().bearer_token().as_deref(), Some("A1"));
        assert_eq!(manager.backend().sign_in_calls.load(Ordering::SeqCst), 1);
        assert!(manager.has_active_session());
    }

    #[tokio::test]
    async fn test_rejected_sign_in_surfaces_message_and_clears() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = manager(&clock);
        manager.store_sign_in("OLD", "OLD-R").unwrap();

        let err = manager.sign_in("admin", "wrong").await.unwrap_err();

        assert!(matches!(err, SessionError::Credentials(ref msg) if msg == "Invalid credentials"));
        assert!(manager.snapshot().is_empty());
        assert_eq!(manager.backend().bearer_token(), None);
    }

    #[test]
    fn test_active_session_rules() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = manager(&clock);
        assert!(!manager.has_active_session());

        manager.store_sign_in("A1", "R1").unwrap();
        clock.set(900_000);
        assert!(manager.is_access_token_expired());
        assert!(manager.has_active_session());

        clock.set(2_592_000_000);
        assert!(manager.is_refresh_token_expired());
        assert!(!manager.has_active_session());
    }

    #[test]
    fn test_logout_clears_and_redirects() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = manager(&clock);
        manager.store_sign_in("A1", "R1").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        manager.logout(&tx);

        assert!(manager.snapshot().is_empty());
        assert_eq!(manager.backend().bearer_token(), None);
        assert!(manager.is_refresh_token_expired());
        assert_eq!(rx.try_recv().unwrap(), "/admin/signin");
    }

    #[test]
    fn test_panels_share_storage_without_sharing_sessions() {
        let clock = Arc::new(ManualClock::new(0));
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let admin = SessionManager::new(
            PanelConfig::admin(),
            storage.clone(),
            Arc::new(FakeBackend::new()),
            clock.clone(),
        );
        let investor = SessionManager::new(
            PanelConfig::investor(),
            storage,
            Arc::new(FakeBackend::new()),
            clock.clone(),
        );

        admin.store_sign_in("A1", "R1").unwrap();

        assert!(admin.has_active_session());
        assert!(!investor.has_active_session());
        assert_eq!(investor.backend().bearer_token(), None);

        investor.logout(&mpsc::unbounded_channel::<String>().0);
        assert!(admin.has_active_session());
    }

    #[test]
    fn test_connect_builds_both_panels() {
        let console = ConsoleConfig::new("localhost:8080").unwrap();
        let panels = ConsolePanels::new(&console, Arc::new(MemoryStorage::new())).unwrap();

        assert_eq!(panels.admin.config().storage_namespace, "admin");
        assert_eq!(panels.investor.config().storage_namespace, "investor");
        assert_eq!(panels.admin.backend().base_url(), "http://localhost:8080");
    }
}
