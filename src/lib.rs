//! Panel session manager
//!
//! Keeps the admin and investor console panels signed in against their REST
//! backend: persisted access/refresh tokens, single-flight token refresh, and
//! a route gate that decides whether a page may render, needs a refresh, or
//! must redirect to sign-in.

pub mod auth_client;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod manager;
pub mod panel;
pub mod refresh;
pub mod storage;
pub mod token_store;
pub mod types;

pub use auth_client::{AuthBackend, PanelHttpClient};
pub use cache::RequestCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ConsoleConfig;
pub use error::{Result, SessionError};
pub use gate::{GateHandle, GateView, Navigator, Visibility};
pub use manager::{ConsolePanels, SessionManager};
pub use panel::PanelConfig;
pub use refresh::RefreshCoordinator;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use token_store::{SessionField, TokenStore};
pub use types::{AuthState, RefreshResponse, SignInResponse, StoredSession};
