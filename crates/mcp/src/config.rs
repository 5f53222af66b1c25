//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! Everything read by [`WillysConfig`], plus:
//!
//! ## Optional
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name (e.g., production)

use willys_client::{ConfigError, LoginMode, WillysConfig};

/// MCP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub willys: WillysConfig,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub login_mode: Option<LoginMode>,
    pub show_browser: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Loads `.env` first if present (see [`WillysConfig::from_env`]).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let willys = WillysConfig::from_env()?;
        Ok(Self::from_parts(willys, |key| std::env::var(key).ok()))
    }

    /// Assemble from loaded client configuration and a key lookup.
    pub fn from_parts(willys: WillysConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let optional = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        Self {
            willys,
            sentry_dsn: optional("SENTRY_DSN"),
            sentry_environment: optional("SENTRY_ENVIRONMENT"),
        }
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(base_url) = overrides.base_url {
            self.willys.base_url = base_url;
        }
        if let Some(mode) = overrides.login_mode {
            self.willys.login_mode = mode;
        }
        if overrides.show_browser {
            self.willys.browser.headless = false;
        }
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let willys = WillysConfig::from_lookup(|key| map.get(key).cloned()).unwrap();
        ServerConfig::from_parts(willys, |key| map.get(key).cloned())
    }

    #[test]
    fn test_sentry_optional() {
        let base = [("WILLYS_USERNAME", "user"), ("WILLYS_PASSWORD", "hunter22")];
        assert!(config(&base).sentry_dsn.is_none());

        let mut vars = base.to_vec();
        vars.push(("SENTRY_DSN", "https://key@sentry.example.com/1"));
        vars.push(("SENTRY_ENVIRONMENT", " "));
        let config = config(&vars);
        assert_eq!(
            config.sentry_dsn.as_deref(),
            Some("https://key@sentry.example.com/1")
        );
        assert!(config.sentry_environment.is_none());
    }

    #[test]
    fn test_overrides_win() {
        let config = config(&[
            ("WILLYS_USERNAME", "user"),
            ("WILLYS_PASSWORD", "hunter22"),
            ("WILLYS_LOGIN_MODE", "browser"),
        ])
        .with_overrides(Overrides {
            base_url: Some("http://127.0.0.1:8080".to_string()),
            login_mode: Some(LoginMode::Http),
            show_browser: true,
        });
        assert_eq!(config.willys.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.willys.login_mode, LoginMode::Http);
        assert!(!config.willys.browser.headless);
    }

    #[test]
    fn test_no_overrides_keeps_env() {
        let config = config(&[("WILLYS_USERNAME", "user"), ("WILLYS_PASSWORD", "hunter22")])
            .with_overrides(Overrides::default());
        assert_eq!(config.willys.base_url, willys_client::config::DEFAULT_BASE_URL);
        assert!(config.willys.browser.headless);
    }
}
