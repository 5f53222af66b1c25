//! Session transport: cookies, the CSRF token cache and the re-authentication
//! state machine.
//!
//! Every domain operation goes through [`WillysClient::execute`]. Protected
//! requests carry the anti-forgery token; an unauthorized response triggers a
//! token refresh, then at most one full re-login per call, bounded across
//! calls by [`MAX_AUTH_RETRY_ATTEMPTS`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::{DEFAULT_TIMEOUT, WillysConfig};
use crate::endpoints;
use crate::error::WillysError;

/// Re-logins allowed before unauthorized responses become terminal.
pub const MAX_AUTH_RETRY_ATTEMPTS: u32 = 2;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT: &str = "application/json, text/plain, */*";
const ACCEPT_LANGUAGE: &str = "sv-SE,sv;q=0.9,en;q=0.8";
const MAX_IDLE_PER_HOST: usize = 10;
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Account credentials used for (re-)authentication.
///
/// Implements `Debug` manually to redact both fields.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Authenticated client for willys.se.
///
/// Cheap to clone: clones share one cookie store, token cache and
/// re-authentication counter.
#[derive(Clone)]
pub struct WillysClient {
    inner: Arc<ClientInner>,
    cancel: Option<CancellationToken>,
}

struct ClientInner {
    http: reqwest::Client,
    cookies: Arc<Jar>,
    /// Base URL without a trailing slash, prefixed to every path.
    base: String,
    base_url: Url,
    session: RwLock<SessionState>,
    auth_attempts: AtomicU32,
}

/// Mutable session state, guarded by one reader/writer lock.
#[derive(Default)]
pub(crate) struct SessionState {
    csrf_token: Option<SecretString>,
    credentials: Option<Credentials>,
}

impl SessionState {
    pub(crate) fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenBody {
    Bare(String),
    Wrapped { token: String },
}

impl TokenBody {
    fn into_token(self) -> String {
        match self {
            Self::Bare(token) | Self::Wrapped { token } => token,
        }
    }
}

impl WillysClient {
    /// Create a client without stored credentials.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty, unparseable or non-HTTP base URL.
    pub fn new(base_url: &str) -> Result<Self, WillysError> {
        Self::with_options(base_url, DEFAULT_TIMEOUT, None)
    }

    /// Create a client from loaded configuration, storing its credentials
    /// for automatic re-authentication.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid base URL.
    pub fn from_config(config: &WillysConfig) -> Result<Self, WillysError> {
        Self::with_options(
            &config.base_url,
            config.timeout,
            Some(Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            }),
        )
    }

    /// Create a client with an explicit request timeout and optional credentials.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid base URL, or an API error if
    /// the HTTP client cannot be built.
    pub fn with_options(
        base_url: &str,
        timeout: Duration,
        credentials: Option<Credentials>,
    ) -> Result<Self, WillysError> {
        let base_url = parse_base_url(base_url)?;
        let base = base_url.as_str().trim_end_matches('/').to_string();
        let cookies = Arc::new(Jar::default());

        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .default_headers(browser_headers(&base)?)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(IDLE_TIMEOUT)
            .gzip(true)
            .build()
            .map_err(|e| WillysError::api_with(None, &base, "failed to build HTTP client", e))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                cookies,
                base,
                base_url,
                session: RwLock::new(SessionState {
                    csrf_token: None,
                    credentials,
                }),
                auth_attempts: AtomicU32::new(0),
            }),
            cancel: None,
        })
    }

    /// A handle on the same session whose requests check `token` before
    /// being dispatched.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cancel: Some(token),
        }
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base
    }

    pub(crate) fn base(&self) -> &Url {
        &self.inner.base_url
    }

    pub(crate) fn cookie_jar(&self) -> &Jar {
        &self.inner.cookies
    }

    /// `Cookie` header value the store would currently send to the base URL.
    pub(crate) fn cookie_header(&self) -> Option<String> {
        self.inner
            .cookies
            .cookies(&self.inner.base_url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    /// Number of re-logins performed since the last successful login.
    #[must_use]
    pub fn auth_attempts(&self) -> u32 {
        self.inner.auth_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_auth_attempts(&self) {
        self.inner.auth_attempts.store(0, Ordering::SeqCst);
    }

    pub(crate) async fn lock_session(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.session.write().await
    }

    // =========================================================================
    // CSRF token
    // =========================================================================

    /// Return the cached anti-forgery token, fetching it if absent.
    ///
    /// Concurrent callers that find the cache empty serialize on the session
    /// lock; only the first one fetches.
    ///
    /// # Errors
    ///
    /// Returns an API error if the token endpoint fails or returns an empty token.
    pub async fn csrf_token(&self) -> Result<SecretString, WillysError> {
        let cached = self.inner.session.read().await.csrf_token.clone();
        if let Some(token) = cached {
            return Ok(token);
        }

        let mut session = self.inner.session.write().await;
        if let Some(token) = &session.csrf_token {
            debug!("CSRF token populated by a concurrent caller");
            return Ok(token.clone());
        }
        self.fetch_csrf_token_locked(&mut session).await
    }

    /// Discard the cached token and fetch a new one.
    ///
    /// # Errors
    ///
    /// Returns an API error if the token endpoint fails or returns an empty token.
    pub async fn refresh_csrf_token(&self) -> Result<SecretString, WillysError> {
        let mut session = self.inner.session.write().await;
        session.csrf_token = None;
        self.fetch_csrf_token_locked(&mut session).await
    }

    pub(crate) async fn fetch_csrf_token_locked(
        &self,
        session: &mut SessionState,
    ) -> Result<SecretString, WillysError> {
        let endpoint = endpoints::CSRF_TOKEN;
        let response = self.dispatch(Method::GET, endpoint, None, None).await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(WillysError::api(status, endpoint, "CSRF token request failed"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| {
                WillysError::api_with(Some(status), endpoint, "failed to read CSRF token", e)
            })?;
        let token = serde_json::from_str::<TokenBody>(&body)
            .map_err(|e| {
                WillysError::api_with(Some(status), endpoint, "failed to parse CSRF token", e)
            })?
            .into_token();

        if token.is_empty() {
            return Err(WillysError::api(status, endpoint, "empty CSRF token"));
        }

        debug!("fetched CSRF token");
        let token = SecretString::from(token);
        session.csrf_token = Some(token.clone());
        Ok(token)
    }

    // =========================================================================
    // Request execution
    // =========================================================================

    /// Execute a request against the store.
    ///
    /// Protected requests carry the CSRF token. On `401 Unauthorized` the
    /// token is refreshed and the request retried; if that also fails and
    /// credentials are held, the client logs in again and retries a final
    /// time. The returned response may have any status except that a
    /// protected request never returns `401` after a re-login.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if the cancellation token fired before a dispatch
    /// - `Api` with no status on transport failures
    /// - `Authentication` if the token cannot be obtained, re-login fails, or
    ///   the re-authentication budget is exhausted
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        protected: bool,
    ) -> Result<Response, WillysError> {
        if !protected {
            return self.dispatch(method, path, body, None).await;
        }

        let token = self
            .csrf_token()
            .await
            .map_err(|e| e.into_auth("failed to get CSRF token"))?;
        let response = self
            .dispatch(method.clone(), path, body, Some(&token))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(endpoint = path, "unauthorized, refreshing CSRF token");
        let token = self
            .refresh_csrf_token()
            .await
            .map_err(|e| e.into_auth("failed to refresh CSRF token"))?;
        let response = self
            .dispatch(method.clone(), path, body, Some(&token))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let attempts = self.inner.auth_attempts.load(Ordering::SeqCst);
        if attempts >= MAX_AUTH_RETRY_ATTEMPTS {
            warn!(endpoint = path, attempts, "re-authentication budget exhausted");
            return Err(WillysError::auth(
                "maximum authentication retry attempts exceeded",
            ));
        }

        let credentials = self.inner.session.read().await.credentials.clone();
        let Some(credentials) = credentials.filter(|c| {
            !c.username.is_empty() && !c.password.expose_secret().is_empty()
        }) else {
            return Ok(response);
        };

        self.inner.auth_attempts.fetch_add(1, Ordering::SeqCst);
        warn!(endpoint = path, attempt = attempts + 1, "session expired, logging in again");

        self.login(&credentials.username, &credentials.password)
            .await
            .map_err(|e| e.into_auth("failed to re-authenticate"))?;

        let token = self
            .csrf_token()
            .await
            .map_err(|e| e.into_auth("failed to get CSRF token after re-authentication"))?;
        let response = self.dispatch(method, path, body, Some(&token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(WillysError::auth("still unauthorized after re-authentication"));
        }
        Ok(response)
    }

    /// Send one request. Checks cancellation first; never retries.
    pub(crate) async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        csrf_token: Option<&SecretString>,
    ) -> Result<Response, WillysError> {
        if let Some(cancel) = &self.cancel
            && cancel.is_cancelled()
        {
            return Err(WillysError::Cancelled {
                endpoint: path.to_string(),
            });
        }

        let mut request = self
            .inner
            .http
            .request(method, format!("{}{path}", self.inner.base));
        if let Some(token) = csrf_token {
            request = request.header(endpoints::CSRF_HEADER, token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| WillysError::api_with(None, path, "request failed", e))
    }
}

/// Validate and parse the base URL.
fn parse_base_url(base_url: &str) -> Result<Url, WillysError> {
    if base_url.trim().is_empty() {
        return Err(WillysError::validation("base_url", "base URL cannot be empty"));
    }
    let url = Url::parse(base_url)
        .map_err(|_| WillysError::validation("base_url", "invalid base URL format"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(WillysError::validation(
            "base_url",
            "base URL must use http or https scheme",
        ));
    }
    Ok(url)
}

/// Browser-like headers sent with every request.
///
/// Origin and referer point at the store itself so requests pass its
/// same-origin filtering.
pub(crate) fn browser_headers(base: &str) -> Result<HeaderMap, WillysError> {
    let origin = HeaderValue::from_str(base)
        .map_err(|_| WillysError::validation("base_url", "invalid base URL format"))?;
    let referer = HeaderValue::from_str(&format!("{base}/"))
        .map_err(|_| WillysError::validation("base_url", "invalid base URL format"))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));
    headers.insert(header::ORIGIN, origin);
    headers.insert(header::REFERER, referer);
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(HeaderName::from_static("sec-fetch-dest"), HeaderValue::from_static("empty"));
    headers.insert(HeaderName::from_static("sec-fetch-mode"), HeaderValue::from_static("cors"));
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );
    Ok(headers)
}

// =============================================================================
// Response helpers
// =============================================================================

pub(crate) const MAX_ERROR_BODY: usize = 500;

/// Pass `response` through if its status is in `accepted`.
///
/// Otherwise logs the (truncated) body and returns an `Api` error, or
/// `Authentication` for `401`.
pub(crate) async fn expect_status(
    response: Response,
    accepted: &[StatusCode],
    endpoint: &str,
    message: &str,
) -> Result<Response, WillysError> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(WillysError::auth(format!("{message}: not authenticated")));
    }

    let body = response.text().await.unwrap_or_default();
    let truncated: String = body.chars().take(MAX_ERROR_BODY).collect();
    error!(status = %status, endpoint, body = %truncated, "{message}");
    Err(WillysError::api(status, endpoint, message))
}

/// Decode a JSON body, mapping failures to an `Api` error with the cause.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: Response,
    endpoint: &str,
    message: &str,
) -> Result<T, WillysError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| WillysError::api_with(Some(status), endpoint, "failed to read response", e))?;
    serde_json::from_slice(&body)
        .map_err(|e| WillysError::api_with(Some(status), endpoint, message, e))
}
