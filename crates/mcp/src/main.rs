//! Willys MCP server binary.
//!
//! Logs in once at startup, then serves grocery tools on stdio until the
//! client closes stdin. Logs go to stderr; stdout carries protocol messages
//! only.
//!
//! # Usage
//!
//! ```bash
//! # Browser login (default)
//! WILLYS_USERNAME=... WILLYS_PASSWORD=... willys-mcp
//!
//! # Direct HTTP login against a local store double
//! willys-mcp --login-mode http --base-url http://127.0.0.1:8080
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, ValueEnum};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use willys_client::{HttpLoginBootstrap, LoginMode, WillysClient, WillysConfig, WillysError};
use willys_mcp::{Overrides, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "willys-mcp")]
#[command(author, version, about = "Willys grocery tools over MCP stdio")]
struct Cli {
    /// Store URL (overrides `WILLYS_BASE_URL`)
    #[arg(long)]
    base_url: Option<String>,

    /// Session bootstrap: `browser` or `http` (overrides `WILLYS_LOGIN_MODE`)
    #[arg(long)]
    login_mode: Option<LoginMode>,

    /// Show the browser window during login
    #[arg(long)]
    show_browser: bool,

    /// Log output format
    #[arg(long, env = "WILLYS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "willys_mcp=info,willys_client=info".into());

    let json_layer = matches!(format, LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = matches!(format, LogFormat::Text)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

/// Establish the session with the configured login mode.
async fn establish_session(
    client: &WillysClient,
    config: &WillysConfig,
) -> Result<(), WillysError> {
    match config.login_mode {
        LoginMode::Http => {
            let bootstrap = HttpLoginBootstrap::new(config.timeout);
            client
                .bootstrap(&bootstrap, &config.username, &config.password)
                .await
        }
        #[cfg(feature = "browser")]
        LoginMode::Browser => {
            let bootstrap = willys_client::BrowserBootstrap::new(config.browser.clone());
            client
                .bootstrap(&bootstrap, &config.username, &config.password)
                .await
        }
        #[cfg(not(feature = "browser"))]
        LoginMode::Browser => {
            tracing::warn!("built without browser support, using direct HTTP login");
            let bootstrap = HttpLoginBootstrap::new(config.timeout);
            client
                .bootstrap(&bootstrap, &config.username, &config.password)
                .await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env()
        .expect("Failed to load configuration")
        .with_overrides(Overrides {
            base_url: cli.base_url,
            login_mode: cli.login_mode,
            show_browser: cli.show_browser,
        });

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing(cli.log_format);

    let client = WillysClient::from_config(&config.willys).expect("Failed to create client");

    tracing::info!(mode = ?config.willys.login_mode, base_url = client.base_url(), "logging in");
    if let Err(e) = establish_session(&client, &config.willys).await {
        tracing::error!(error = %e, kind = e.kind().as_str(), "failed to establish session");
        std::process::exit(1);
    }

    tracing::info!("serving tools on stdio");
    if let Err(e) = Server::new(client).serve_stdio().await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
