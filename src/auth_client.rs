//! Panel HTTP client: auth endpoints plus bearer-decorated REST calls

use crate::config::ConsoleConfig;
use crate::error::{Result, SessionError};
use crate::panel::PanelConfig;
use crate::types::{RefreshResponse, SignInRequest, SignInResponse};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the refresh token on refresh requests
pub const REFRESH_TOKEN_HEADER: &str = "X-Refresh-Token";

/// Shown when a rejected sign-in carries no usable message
pub const DEFAULT_SIGN_IN_ERROR: &str = "Sign in failed. Check your credentials and try again.";

/// Turn a non-success response into an error, keeping the backend message
macro_rules! check_response {
    ($response:expr) => {
        if !$response.status().is_success() {
            let status = $response.status().as_u16();
            let text = $response.text().await.unwrap_or_default();
            return Err(SessionError::Status {
                status,
                message: error_message(&text).unwrap_or(text),
            });
        }
    };
}

/// Auth backend of one panel
///
/// Owns the bearer token attached to outgoing API requests; the session
/// manager keeps it in step with the token store.
pub trait AuthBackend: Send + Sync + 'static {
    /// Exchange username/password for an access + refresh token pair
    fn sign_in(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<SignInResponse>> + Send;

    /// Exchange a refresh token for a new access token
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<RefreshResponse>> + Send;

    /// Replace the bearer token used for API requests (`None` drops it)
    fn set_bearer_token(&self, token: Option<String>);

    fn bearer_token(&self) -> Option<String>;
}

/// reqwest-backed client for one panel
pub struct PanelHttpClient {
    base_url: String,
    sign_in_endpoint: String,
    refresh_endpoint: String,
    http_client: Client,
    bearer_token: RwLock<Option<String>>,
}

impl PanelHttpClient {
    /// Create a client for `panel` against the configured backend
    pub fn new(console: &ConsoleConfig, panel: &PanelConfig) -> Result<Self> {
        Self::with_timeout(&console.api_url, panel, console.request_timeout())
    }

    /// Create a client with an explicit base URL and request timeout
    pub fn with_timeout(base_url: &str, panel: &PanelConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            sign_in_endpoint: panel.sign_in_endpoint.clone(),
            refresh_endpoint: panel.refresh_endpoint.clone(),
            http_client,
            bearer_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Start a request, attaching the current bearer token if there is one
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http_client.request(method, self.url(path));
        match self.bearer_token() {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(self.request(Method::GET, path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(self.request(Method::DELETE, path)).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        check_response!(response);
        parse_json(response).await
    }
}

impl AuthBackend for PanelHttpClient {
    async fn sign_in(&self, username: &str, password: &str) -> Result<SignInResponse> {
        let rejected = || SessionError::Credentials(DEFAULT_SIGN_IN_ERROR.to_string());
        let response = self
            .http_client
            .post(self.url(&self.sign_in_endpoint))
            .json(&SignInRequest { username, password })
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.sign_in_endpoint, error = %e, "Sign-in request failed");
                rejected()
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(endpoint = %self.sign_in_endpoint, status = %status, "Sign-in rejected");
            return Err(error_message(&text)
                .map(SessionError::Credentials)
                .unwrap_or_else(rejected));
        }

        parse_json(response).await.map_err(|e| {
            warn!(endpoint = %self.sign_in_endpoint, error = %e, "Unusable sign-in response");
            rejected()
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        debug!(endpoint = %self.refresh_endpoint, "Requesting access token refresh");
        let response = self
            .http_client
            .post(self.url(&self.refresh_endpoint))
            .header(REFRESH_TOKEN_HEADER, refresh_token)
            .send()
            .await?;

        check_response!(response);
        parse_json(response).await
    }

    fn set_bearer_token(&self, token: Option<String>) {
        match self.bearer_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn bearer_token(&self) -> Option<String> {
        match self.bearer_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Decode a JSON body; a body of the wrong shape is an invalid response
async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::InvalidResponse(format!("unexpected response body: {e}")))
}

/// Pull a human-readable message out of a backend error body
///
/// Accepts `{"message": "..."}` and `{"error": {"message": "..."}}`.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| {
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
        })
        .map(str::to_string)
}
