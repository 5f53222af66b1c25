//! Headless-browser login.
//!
//! Walks the store's login dialog in Chrome/Chromium via the DevTools
//! protocol and returns the resulting cookies. The page rarely signals when
//! elements are ready, so every step polls with a short deadline.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::Cookie;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument};
use url::Url;

use super::{SessionBootstrap, SessionCookie};
use crate::config::BrowserSettings;
use crate::error::WillysError;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);
const CONSENT_TIMEOUT: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SETTLE_DELAY: Duration = Duration::from_secs(2);

const CONSENT_BUTTON_TEXT: &str = "Acceptera";
const LOGIN_TEXT: &str = "Logga in";
const DIALOG_SELECTOR: &str = "dialog, [role='dialog']";
const USERNAME_SELECTOR: &str = "input[type='text']";
const PASSWORD_SELECTOR: &str = "input[type='password']";
const ERROR_SELECTORS: [&str; 2] = ["*[class*='error']", "*[class*='Error']"];

/// [`SessionBootstrap`] backed by a headless Chrome/Chromium instance.
#[derive(Debug, Clone, Default)]
pub struct BrowserBootstrap {
    settings: BrowserSettings,
}

impl BrowserBootstrap {
    #[must_use]
    pub const fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> Result<BrowserConfig, WillysError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(STEP_TIMEOUT * 2)
            .launch_timeout(Duration::from_secs(20));
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable.clone());
        }
        builder
            .build()
            .map_err(|e| WillysError::auth_with("failed to configure browser", e))
    }
}

impl SessionBootstrap for BrowserBootstrap {
    #[instrument(skip_all, fields(headless = self.settings.headless))]
    async fn obtain_cookies(
        &self,
        base_url: &Url,
        username: &str,
        password: &SecretString,
    ) -> Result<Vec<SessionCookie>, WillysError> {
        let config = self.browser_config()?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| WillysError::auth_with("failed to launch browser", e))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let outcome = timeout(
            self.settings.login_timeout,
            login_in_new_page(&browser, base_url, username, password),
        )
        .await;

        if let Err(e) = browser.close().await {
            debug!(error = %e, "failed to close browser");
        }
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "failed to reap browser process");
        }
        events.abort();

        let cookies = outcome.map_err(|_| WillysError::auth("browser login timed out"))??;
        info!(count = cookies.len(), "browser login succeeded");
        Ok(cookies)
    }
}

async fn login_in_new_page(
    browser: &Browser,
    base_url: &Url,
    username: &str,
    password: &SecretString,
) -> Result<Vec<SessionCookie>, WillysError> {
    let page = browser
        .new_page(base_url.as_str())
        .await
        .map_err(|e| WillysError::auth_with("failed to create page", e))?;

    let result = drive_login(&page, username, password).await;

    if let Err(e) = page.close().await {
        debug!(error = %e, "failed to close page");
    }
    result
}

async fn drive_login(
    page: &Page,
    username: &str,
    password: &SecretString,
) -> Result<Vec<SessionCookie>, WillysError> {
    page.wait_for_navigation()
        .await
        .map_err(|e| WillysError::auth_with("page failed to load", e))?;
    sleep(SETTLE_DELAY).await;

    // Consent banner is optional.
    if let Some(consent) =
        find_by_text(page, "button", |t| t.contains(CONSENT_BUTTON_TEXT), CONSENT_TIMEOUT).await
    {
        if consent.click().await.is_ok() {
            sleep(Duration::from_millis(500)).await;
        }
    } else {
        debug!("no consent banner");
    }

    let login_link = find_by_text(page, "a", |t| t.contains(LOGIN_TEXT), STEP_TIMEOUT)
        .await
        .ok_or_else(|| WillysError::auth("failed to find login link"))?;
    login_link
        .click()
        .await
        .map_err(|e| WillysError::auth_with("failed to click login link", e))?;
    sleep(Duration::from_secs(1)).await;

    let dialog = wait_for_element(page, DIALOG_SELECTOR, STEP_TIMEOUT)
        .await
        .ok_or_else(|| WillysError::auth("failed to find login dialog"))?;

    let username_input = dialog
        .find_element(USERNAME_SELECTOR)
        .await
        .map_err(|e| WillysError::auth_with("failed to find username input field", e))?;
    username_input
        .click()
        .await
        .map_err(|e| WillysError::auth_with("failed to focus username input", e))?;
    username_input
        .type_str(username)
        .await
        .map_err(|e| WillysError::auth_with("failed to input username", e))?;

    let password_input = dialog
        .find_element(PASSWORD_SELECTOR)
        .await
        .map_err(|e| WillysError::auth_with("failed to find password input field", e))?;
    password_input
        .click()
        .await
        .map_err(|e| WillysError::auth_with("failed to focus password input", e))?;
    password_input
        .type_str(password.expose_secret())
        .await
        .map_err(|e| WillysError::auth_with("failed to input password", e))?;
    sleep(Duration::from_millis(500)).await;

    let submit = find_by_text(page, "button", |t| t == LOGIN_TEXT, STEP_TIMEOUT)
        .await
        .ok_or_else(|| WillysError::auth("failed to find login button"))?;
    submit
        .click()
        .await
        .map_err(|e| WillysError::auth_with("failed to click login button", e))?;
    sleep(SETTLE_DELAY).await;

    for selector in ERROR_SELECTORS {
        if has_element(page, selector).await {
            return Err(WillysError::auth("invalid username or password"));
        }
    }

    let cookies = page
        .get_cookies()
        .await
        .map_err(|e| WillysError::auth_with("failed to extract cookies", e))?;
    Ok(cookies.into_iter().map(session_cookie).collect())
}

/// Poll for the first `selector` match whose trimmed text satisfies `matches`.
async fn find_by_text(
    page: &Page,
    selector: &str,
    matches: impl Fn(&str) -> bool,
    within: Duration,
) -> Option<Element> {
    let deadline = Instant::now() + within;
    loop {
        if let Ok(elements) = page.find_elements(selector).await {
            for element in elements {
                if let Ok(Some(text)) = element.inner_text().await
                    && matches(text.trim())
                {
                    return Some(element);
                }
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(POLL_INTERVAL).await;
    }
}

async fn wait_for_element(page: &Page, selector: &str, within: Duration) -> Option<Element> {
    let deadline = Instant::now() + within;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Some(element);
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(POLL_INTERVAL).await;
    }
}

async fn has_element(page: &Page, selector: &str) -> bool {
    page.find_elements(selector)
        .await
        .is_ok_and(|elements| !elements.is_empty())
}

#[allow(clippy::cast_possible_truncation)] // CDP expiry is whole seconds in an f64
fn session_cookie(cookie: Cookie) -> SessionCookie {
    SessionCookie {
        expires: (cookie.expires > 0.0).then(|| cookie.expires as i64),
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        secure: cookie.secure,
        http_only: cookie.http_only,
    }
}
