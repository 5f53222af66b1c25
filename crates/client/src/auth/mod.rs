//! Session bootstrap and direct login.
//!
//! The store's login dialog needs a full page context, so the first session
//! is normally produced by a [`SessionBootstrap`] implementation (a headless
//! browser by default) that hands back cookies. Re-authentication mid-session
//! uses the lighter [`WillysClient::login`], which posts credentials directly.

#[cfg(feature = "browser")]
mod browser;

use std::future::Future;
use std::time::Duration;

use cookie::{Cookie, SameSite};
use reqwest::cookie::CookieStore;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument};
use url::Url;
use willys_core::CustomerInfo;

#[cfg(feature = "browser")]
pub use browser::BrowserBootstrap;

use crate::config::DEFAULT_TIMEOUT;
use crate::endpoints;
use crate::error::WillysError;
use crate::session::{Credentials, MAX_ERROR_BODY, WillysClient};

const MIN_PASSWORD_LENGTH: usize = 6;

/// A cookie handed over by a bootstrap, independent of where it came from.
///
/// Implements `Debug` manually to redact the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    /// Cookie domain; a leading dot is ignored. Empty means the store host.
    pub domain: String,
    pub path: String,
    /// Expiry as Unix seconds. `None` or non-positive means a session cookie.
    pub expires: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expires", &self.expires)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .finish()
    }
}

/// Produces the initial cookie set for an account.
///
/// Implementations only obtain cookies; importing them, storing the
/// credentials and fetching the first CSRF token is done by
/// [`WillysClient::bootstrap`].
pub trait SessionBootstrap: Send + Sync {
    /// Log in as `username` against `base_url` and return the resulting cookies.
    fn obtain_cookies(
        &self,
        base_url: &Url,
        username: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<Vec<SessionCookie>, WillysError>> + Send;
}

/// Bootstrap through the direct HTTP login, for hosts without a browser.
#[derive(Debug, Clone)]
pub struct HttpLoginBootstrap {
    timeout: Duration,
}

impl HttpLoginBootstrap {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpLoginBootstrap {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl SessionBootstrap for HttpLoginBootstrap {
    async fn obtain_cookies(
        &self,
        base_url: &Url,
        username: &str,
        password: &SecretString,
    ) -> Result<Vec<SessionCookie>, WillysError> {
        let scratch = WillysClient::with_options(base_url.as_str(), self.timeout, None)?;
        scratch.submit_login(username, password).await?;
        Ok(scratch.session_cookies())
    }
}

/// Check credentials before anything touches the network.
///
/// # Errors
///
/// Returns a validation error for an empty username or a password shorter
/// than six characters.
pub fn validate_credentials(username: &str, password: &SecretString) -> Result<(), WillysError> {
    if username.trim().is_empty() {
        return Err(WillysError::validation("username", "username cannot be empty"));
    }
    let password = password.expose_secret();
    if password.is_empty() {
        return Err(WillysError::validation("password", "password cannot be empty"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(WillysError::validation(
            "password",
            format!("password must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }
    Ok(())
}

impl WillysClient {
    /// Log in with a direct HTTP request.
    ///
    /// Seeds session cookies from the front page, posts the credentials,
    /// stores them for later re-authentication, resets the re-authentication
    /// counter and fetches a fresh CSRF token. Holds the session lock
    /// throughout, so concurrent token reads wait for the new session.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed credentials
    /// - `Authentication` if the session cannot be seeded, the credentials are
    ///   rejected or no CSRF token can be fetched afterwards
    /// - `Api` for other non-success login responses
    #[instrument(skip_all)]
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), WillysError> {
        validate_credentials(username, password)?;

        let mut session = self.lock_session().await;
        self.submit_login(username, password).await?;

        session.set_credentials(Credentials {
            username: username.to_string(),
            password: password.clone(),
        });
        self.reset_auth_attempts();

        self.fetch_csrf_token_locked(&mut session)
            .await
            .map_err(|e| e.into_auth("failed to fetch CSRF token after login"))?;

        info!("logged in");
        Ok(())
    }

    /// GET the front page for cookies, then POST the credentials.
    async fn submit_login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<(), WillysError> {
        let response = self
            .dispatch(Method::GET, "/", None, None)
            .await
            .map_err(|e| e.into_auth("failed to initialize session"))?;
        if response.status() != StatusCode::OK {
            return Err(WillysError::auth_with(
                "failed to initialize session",
                format!("unexpected status code {}", response.status().as_u16()),
            ));
        }

        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });
        let response = self
            .dispatch(Method::POST, endpoints::LOGIN, Some(&body), None)
            .await
            .map_err(|e| e.into_auth("login request failed"))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(WillysError::auth("invalid username or password"));
        }
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.trim().chars().take(MAX_ERROR_BODY).collect();
            error!(status = %status, body = %detail, "login returned non-success status");
            let detail = if detail.is_empty() {
                "no additional details provided".to_string()
            } else {
                detail
            };
            return Err(WillysError::api(
                status,
                endpoints::LOGIN,
                format!("login failed - {detail}"),
            ));
        }
        Ok(())
    }

    /// Establish the session with `bootstrapper`.
    ///
    /// Imports the cookies it returns, stores the credentials, resets the
    /// re-authentication counter and fetches the first CSRF token. A session
    /// without a working token is treated as a failed bootstrap.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed credentials (checked before any I/O)
    /// - whatever the bootstrapper returns
    /// - `Authentication` if no CSRF token can be fetched afterwards
    #[instrument(skip_all)]
    pub async fn bootstrap<B: SessionBootstrap>(
        &self,
        bootstrapper: &B,
        username: &str,
        password: &SecretString,
    ) -> Result<(), WillysError> {
        validate_credentials(username, password)?;

        let cookies = bootstrapper
            .obtain_cookies(self.base(), username, password)
            .await?;
        let imported = self.import_cookies(&cookies);
        debug!(received = cookies.len(), imported, "imported session cookies");

        let mut session = self.lock_session().await;
        session.set_credentials(Credentials {
            username: username.to_string(),
            password: password.clone(),
        });
        self.reset_auth_attempts();

        self.fetch_csrf_token_locked(&mut session)
            .await
            .map_err(|e| e.into_auth("failed to fetch CSRF token after login"))?;

        info!("session established");
        Ok(())
    }

    /// Copy cookies into the session's store, scoped to the base URL.
    ///
    /// Cookies for other domains are skipped. Every imported cookie gets
    /// `SameSite=None`. Returns the number imported.
    pub fn import_cookies(&self, cookies: &[SessionCookie]) -> usize {
        let host = self.base().host_str().unwrap_or_default().to_ascii_lowercase();
        let mut imported = 0;

        for session_cookie in cookies {
            let Some(set_cookie) = to_set_cookie(session_cookie, &host) else {
                debug!(
                    name = %session_cookie.name,
                    domain = %session_cookie.domain,
                    "skipping foreign cookie"
                );
                continue;
            };
            self.cookie_jar().add_cookie_str(&set_cookie, self.base());
            imported += 1;
        }
        imported
    }

    /// Cookies currently sent to the base URL, as name/value pairs.
    fn session_cookies(&self) -> Vec<SessionCookie> {
        let host = self.base().host_str().unwrap_or_default().to_string();
        let secure = self.base().scheme() == "https";
        self.cookie_header()
            .map(|header| {
                header
                    .split(';')
                    .filter_map(|pair| pair.trim().split_once('='))
                    .map(|(name, value)| SessionCookie {
                        name: name.to_string(),
                        value: value.to_string(),
                        domain: host.clone(),
                        path: "/".to_string(),
                        expires: None,
                        secure,
                        http_only: false,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns `true` if the cookie store holds any cookie for the base URL.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.cookie_jar()
            .cookies(self.base())
            .is_some_and(|header| !header.is_empty())
    }

    /// Fetch the logged-in customer's profile.
    ///
    /// # Errors
    ///
    /// Returns `Authentication` when not logged in, `Api` otherwise.
    #[instrument(skip(self))]
    pub async fn customer_info(&self) -> Result<CustomerInfo, WillysError> {
        let endpoint = endpoints::CUSTOMER;
        let response = self.execute(Method::GET, endpoint, None, false).await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(WillysError::auth("not authenticated"));
        }
        if status != StatusCode::OK {
            return Err(WillysError::api(status, endpoint, "get customer info failed"));
        }

        response
            .json::<CustomerInfo>()
            .await
            .map_err(|e| {
                WillysError::api_with(Some(status), endpoint, "failed to decode customer info", e)
            })
    }
}

/// Render a [`SessionCookie`] as a `Set-Cookie` value for `host`.
///
/// Returns `None` if the cookie belongs to an unrelated domain.
fn to_set_cookie(session_cookie: &SessionCookie, host: &str) -> Option<String> {
    let domain = session_cookie
        .domain
        .trim_start_matches('.')
        .to_ascii_lowercase();
    let parent_domain = if domain.is_empty() || domain == host {
        None
    } else if host.ends_with(&format!(".{domain}")) {
        Some(domain)
    } else {
        return None;
    };

    let path = if session_cookie.path.is_empty() {
        "/".to_string()
    } else {
        session_cookie.path.clone()
    };

    let mut builder = Cookie::build((session_cookie.name.clone(), session_cookie.value.clone()))
        .path(path)
        .secure(session_cookie.secure)
        .http_only(session_cookie.http_only)
        .same_site(SameSite::None);
    if let Some(domain) = parent_domain {
        builder = builder.domain(domain);
    }
    if let Some(expires) = session_cookie
        .expires
        .filter(|secs| *secs > 0)
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
    {
        builder = builder.expires(expires);
    }

    Some(builder.build().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cookie(name: &str, domain: &str) -> SessionCookie {
        SessionCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: domain.to_string(),
            path: "/".to_string(),
            expires: None,
            secure: false,
            http_only: true,
        }
    }

    #[test]
    fn test_validate_credentials() {
        let ok = SecretString::from("hunter22");
        assert!(validate_credentials("user", &ok).is_ok());

        let err = validate_credentials("", &ok).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().starts_with("username"));

        let err = validate_credentials("user", &SecretString::from("")).unwrap_err();
        assert_eq!(err.to_string(), "password: password cannot be empty");

        let err = validate_credentials("user", &SecretString::from("12345")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "password: password must be at least 6 characters"
        );
    }

    #[test]
    fn test_set_cookie_host_only() {
        let rendered =
            to_set_cookie(&cookie("JSESSIONID", "www.willys.se"), "www.willys.se").unwrap();
        let parsed = Cookie::parse(rendered).unwrap();
        assert_eq!(parsed.name(), "JSESSIONID");
        assert_eq!(parsed.domain(), None);
        assert_eq!(parsed.same_site(), Some(SameSite::None));
        assert_eq!(parsed.http_only(), Some(true));
        assert_eq!(parsed.path(), Some("/"));
    }

    #[test]
    fn test_set_cookie_parent_domain() {
        let rendered = to_set_cookie(&cookie("AWSALB", ".willys.se"), "www.willys.se").unwrap();
        let parsed = Cookie::parse(rendered).unwrap();
        assert_eq!(parsed.domain(), Some("willys.se"));
    }

    #[test]
    fn test_set_cookie_foreign_domain_skipped() {
        assert!(to_set_cookie(&cookie("_ga", ".google.com"), "www.willys.se").is_none());
        assert!(to_set_cookie(&cookie("x", "notwillys.se"), "willys.se").is_none());
    }

    #[test]
    fn test_set_cookie_expiry() {
        let mut session = cookie("s", "");
        session.expires = Some(0);
        let parsed = Cookie::parse(to_set_cookie(&session, "www.willys.se").unwrap()).unwrap();
        assert!(parsed.expires().is_none());

        session.expires = Some(4_102_444_800);
        let parsed = Cookie::parse(to_set_cookie(&session, "www.willys.se").unwrap()).unwrap();
        assert!(parsed.expires_datetime().is_some());
    }

    #[test]
    fn test_import_and_is_authenticated() {
        let client = WillysClient::new("https://www.willys.se").unwrap();
        assert!(!client.is_authenticated());

        let imported = client.import_cookies(&[
            cookie("JSESSIONID", "www.willys.se"),
            cookie("_ga", ".google.com"),
        ]);
        assert_eq!(imported, 1);
        assert!(client.is_authenticated());
        assert_eq!(client.session_cookies().len(), 1);
    }

    #[test]
    fn test_session_cookie_debug_redacts_value() {
        let mut c = cookie("JSESSIONID", "www.willys.se");
        c.value = "supersecretvalue".to_string();
        assert!(!format!("{c:?}").contains("supersecretvalue"));
    }
}
