//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `WILLYS_USERNAME` - Account identifier (personnummer or e-mail)
//! - `WILLYS_PASSWORD` - Account password
//!
//! ## Optional
//! - `WILLYS_BASE_URL` - Store URL (default: <https://www.willys.se>)
//! - `WILLYS_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `WILLYS_LOGIN_MODE` - `browser` or `http` (default: browser)
//! - `WILLYS_BROWSER_PATH` - Chrome/Chromium executable (default: auto-detect)
//! - `WILLYS_BROWSER_HEADLESS` - Run the browser headless (default: true)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://www.willys.se";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// How the initial session is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginMode {
    /// Drive a headless browser through the login dialog.
    #[default]
    Browser,
    /// Post credentials straight to the login endpoint.
    Http,
}

impl FromStr for LoginMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "browser" => Ok(Self::Browser),
            "http" => Ok(Self::Http),
            other => Err(format!("expected 'browser' or 'http', got '{other}'")),
        }
    }
}

/// Headless browser settings for the browser login mode.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Explicit Chrome/Chromium executable; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Upper bound for the whole browser login.
    pub login_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            login_timeout: Duration::from_secs(90),
        }
    }
}

/// Willys client configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct WillysConfig {
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
    pub timeout: Duration,
    pub login_mode: LoginMode,
    pub browser: BrowserSettings,
}

impl std::fmt::Debug for WillysConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WillysConfig")
            .field("base_url", &self.base_url)
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("login_mode", &self.login_mode)
            .field("browser", &self.browser)
            .finish()
    }
}

impl WillysConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = get_env_or_default(&env, "WILLYS_BASE_URL", DEFAULT_BASE_URL);
        let username = get_required_env(&env, "WILLYS_USERNAME")?;
        let password = SecretString::from(get_required_env(&env, "WILLYS_PASSWORD")?);

        let timeout = get_optional_env(&env, "WILLYS_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| {
                        ConfigError::InvalidEnvVar(
                            "WILLYS_TIMEOUT_SECS".to_string(),
                            format!("expected a positive number of seconds, got '{raw}'"),
                        )
                    })
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT);

        let login_mode = get_optional_env(&env, "WILLYS_LOGIN_MODE")
            .map(|raw| {
                raw.parse::<LoginMode>().map_err(|e| {
                    ConfigError::InvalidEnvVar("WILLYS_LOGIN_MODE".to_string(), e)
                })
            })
            .transpose()?
            .unwrap_or_default();

        let headless = get_optional_env(&env, "WILLYS_BROWSER_HEADLESS")
            .map(|raw| parse_bool("WILLYS_BROWSER_HEADLESS", &raw))
            .transpose()?
            .unwrap_or(true);

        let browser = BrowserSettings {
            executable: get_optional_env(&env, "WILLYS_BROWSER_PATH").map(PathBuf::from),
            headless,
            ..BrowserSettings::default()
        };

        Ok(Self {
            base_url,
            username,
            password,
            timeout,
            login_mode,
            browser,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, ConfigError> {
    get_optional_env(env, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    env(key).filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(env: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    get_optional_env(env, key).unwrap_or_else(|| default.to_string())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}
