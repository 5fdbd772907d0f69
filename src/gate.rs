//! Route gate: decides whether a mounted route may render
//!
//! On mount and on every pathname change the gate runs a bootstrap check:
//! 1. no live refresh token: clear the session, redirect protected routes to
//!    sign-in, become `Unauthorized`
//! 2. load the stored access token into the backend
//! 3. stale access token: refresh; on failure redirect protected routes to
//!    sign-in and become `Unauthorized`
//! 4. become `Authorized`; the sign-in route redirects home instead
//!
//! While authorized, a background task re-checks the access token on a fixed
//! interval and whenever the tab becomes visible.

use crate::auth_client::AuthBackend;
use crate::manager::SessionManager;
use crate::panel::{PanelConfig, REFRESH_CHECK_INTERVAL_MS};
use crate::types::AuthState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Loading text on the sign-in route
pub const CHECKING_SESSION_MESSAGE: &str = "Checking session...";

/// Loading text on protected routes
pub const AUTHORIZING_MESSAGE: &str = "Authorizing...";

/// Client-side router used for redirects
pub trait Navigator: Send + Sync + 'static {
    /// Replace the current route with `path`
    fn replace(&self, path: &str);
}

impl Navigator for mpsc::UnboundedSender<String> {
    fn replace(&self, path: &str) {
        let _ = self.send(path.to_string());
    }
}

/// Tab visibility as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// What the gate shows in place of its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateView {
    Loading(&'static str),
    Children,
}

/// Map gate state to what should be rendered on `pathname`
pub fn render(config: &PanelConfig, pathname: &str, state: AuthState) -> GateView {
    if !config.is_protected_path(pathname) {
        return match state {
            AuthState::Checking | AuthState::Authorized => {
                GateView::Loading(CHECKING_SESSION_MESSAGE)
            }
            AuthState::Unauthorized => GateView::Children,
        };
    }

    match state {
        AuthState::Authorized => GateView::Children,
        AuthState::Checking | AuthState::Unauthorized => GateView::Loading(AUTHORIZING_MESSAGE),
    }
}

/// Run the bootstrap check for `pathname` and return the resulting state
pub async fn bootstrap<B: AuthBackend>(
    manager: &SessionManager<B>,
    pathname: &str,
    navigator: &dyn Navigator,
) -> AuthState {
    let config = manager.config();
    let protected = config.is_protected_path(pathname);

    if manager.is_refresh_token_expired() {
        manager.invalidate();
        if protected {
            redirect(config, navigator, &config.sign_in_path);
        }
        return AuthState::Unauthorized;
    }

    if let Some(access_token) = manager.access_token() {
        manager.backend().set_bearer_token(Some(access_token));
    }

    if manager.is_access_token_expired() && !manager.refresh().await {
        if protected {
            redirect(config, navigator, &config.sign_in_path);
        }
        return AuthState::Unauthorized;
    }

    if !protected {
        redirect(config, navigator, &config.home_path);
    }
    AuthState::Authorized
}

fn redirect(config: &PanelConfig, navigator: &dyn Navigator, path: &str) {
    info!(panel = %config.name, path = %path, "Redirecting");
    navigator.replace(path);
}

struct GateContext<B: AuthBackend> {
    manager: Arc<SessionManager<B>>,
    navigator: Arc<dyn Navigator>,
    pathname: String,
    state: Arc<watch::Sender<AuthState>>,
}

impl<B: AuthBackend> Clone for GateContext<B> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            navigator: Arc::clone(&self.navigator),
            pathname: self.pathname.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

/// A mounted gate
///
/// Dropping the handle unmounts it.
pub struct GateHandle<B: AuthBackend> {
    ctx: GateContext<B>,
    visibility: Option<watch::Receiver<Visibility>>,
    cancel: CancellationToken,
}

impl<B: AuthBackend> GateHandle<B> {
    pub(crate) fn mount(
        manager: Arc<SessionManager<B>>,
        pathname: &str,
        navigator: Arc<dyn Navigator>,
        visibility: Option<watch::Receiver<Visibility>>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Checking);
        let handle = Self {
            ctx: GateContext {
                manager,
                navigator,
                pathname: pathname.to_string(),
                state: Arc::new(state),
            },
            visibility,
            cancel: CancellationToken::new(),
        };
        handle.launch();
        handle
    }

    pub fn state(&self) -> AuthState {
        *self.ctx.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.ctx.state.subscribe()
    }

    pub fn pathname(&self) -> &str {
        &self.ctx.pathname
    }

    pub fn view(&self) -> GateView {
        render(self.ctx.manager.config(), &self.ctx.pathname, self.state())
    }

    /// Follow a pathname change: restart the check from `Checking`
    pub fn navigate(&mut self, pathname: &str) {
        if pathname == self.ctx.pathname {
            return;
        }

        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.ctx.pathname = pathname.to_string();
        self.ctx.state.send_replace(AuthState::Checking);
        self.launch();
    }

    /// Tear down timers and listeners; a pending check keeps running but its
    /// state update is dropped
    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    fn launch(&self) {
        let ctx = self.ctx.clone();
        let cancel = self.cancel.clone();
        let visibility = self.visibility.clone();

        tokio::spawn(async move {
            let outcome = bootstrap(&ctx.manager, &ctx.pathname, ctx.navigator.as_ref()).await;
            if cancel.is_cancelled() {
                debug!(path = %ctx.pathname, "Gate unmounted before bootstrap finished");
                return;
            }

            debug!(path = %ctx.pathname, state = ?outcome, "Gate bootstrap finished");
            ctx.state.send_replace(outcome);

            if outcome == AuthState::Authorized {
                maintain(ctx, cancel, visibility).await;
            }
        });
    }
}

impl<B: AuthBackend> Drop for GateHandle<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Trigger {
    Stop,
    Interval,
    Visible,
    Hidden,
    VisibilityClosed,
}

/// Background expiry checks while authorized
async fn maintain<B: AuthBackend>(
    ctx: GateContext<B>,
    cancel: CancellationToken,
    mut visibility: Option<watch::Receiver<Visibility>>,
) {
    // Cancelled on unmount, or by a check that lost the session.
    let active = cancel.child_token();
    let period = match ctx.manager.config().check_interval() {
        period if period.is_zero() => {
            warn!(panel = %ctx.manager.config().name, "Zero check interval, using the default");
            Duration::from_millis(REFRESH_CHECK_INTERVAL_MS)
        }
        period => period,
    };
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if let Some(rx) = visibility.as_mut() {
        rx.borrow_and_update();
    }

    loop {
        let trigger = tokio::select! {
            _ = active.cancelled() => Trigger::Stop,
            _ = interval.tick() => Trigger::Interval,
            trigger = next_visibility(&mut visibility) => trigger,
        };

        match trigger {
            Trigger::Stop => break,
            Trigger::Hidden => continue,
            Trigger::VisibilityClosed => {
                visibility = None;
                continue;
            }
            Trigger::Interval | Trigger::Visible => {
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                let active = active.clone();
                tokio::spawn(async move { check_and_refresh(&ctx, &cancel, &active).await });
            }
        }
    }
}

async fn next_visibility(visibility: &mut Option<watch::Receiver<Visibility>>) -> Trigger {
    let Some(rx) = visibility.as_mut() else {
        return std::future::pending().await;
    };

    match rx.changed().await {
        Ok(()) if *rx.borrow_and_update() == Visibility::Visible => Trigger::Visible,
        Ok(()) => Trigger::Hidden,
        Err(_) => Trigger::VisibilityClosed,
    }
}

/// Refresh a stale access token; a failed refresh ends the session
async fn check_and_refresh<B: AuthBackend>(
    ctx: &GateContext<B>,
    cancel: &CancellationToken,
    active: &CancellationToken,
) {
    if active.is_cancelled() {
        return;
    }

    let manager = &ctx.manager;
    if manager.token_store().refresh_token().is_none() || !manager.is_access_token_expired() {
        return;
    }

    debug!(path = %ctx.pathname, "Access token stale, refreshing in background");
    let refreshed = manager.refresh().await;
    let config = manager.config();
    if refreshed || !config.is_protected_path(&ctx.pathname) || active.is_cancelled() {
        return;
    }

    active.cancel();
    if !cancel.is_cancelled() {
        ctx.state.send_replace(AuthState::Unauthorized);
    }
    redirect(config, ctx.navigator.as_ref(), &config.sign_in_path);
}
