// # peerscannerd - Registration Daemon
//
// Thin integration layer over peerscanner-core. All rotation logic lives in
// the library; the daemon is responsible for:
//
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering providers and building the host registry
// 4. Reconciling the registry with the zone
// 5. Serving registrations until SIGINT/SIGTERM
//
// ## Configuration
//
// ### Server
// - `PEERSCANNER_PORT`: Listen port (default 62443)
// - `PEERSCANNER_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ### DNS Provider
// - `PEERSCANNER_DOMAIN`: Managed domain (default getiantem.org)
// - `PEERSCANNER_PROVIDER_TYPE`: cloudflare or memory (default cloudflare)
// - `CF_API_TOKEN`: Cloudflare API token
// - `CF_USER` + `CF_API_KEY`: Cloudflare account email and global API key
// - `CF_ZONE_ID`: Zone ID (optional)
// - `PEERSCANNER_MODE`: Set to `dry-run` to log DNS changes without making them
//
// ### Lifecycle
// - `PEERSCANNER_CHECK_INTERVAL_SECS`: Seconds between liveness probes
// - `PEERSCANNER_STALE_AFTER_SECS`: Seconds a host stays tracked without re-registering
// - `PEERSCANNER_PROBE_PORT`: TCP port probed on each host
//
// ## Example
//
// ```bash
// export CF_USER=ops@example.org
// export CF_API_KEY=your_key
// export PEERSCANNER_DOMAIN=getiantem.org
//
// peerscannerd
// ```

mod http;

use anyhow::{Context, Result};
use peerscanner_core::{HostRegistry, ProviderConfig, ProviderRegistry, ScannerConfig, TcpProber};
use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ScannerExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ScannerExitCode> for ExitCode {
    fn from(code: ScannerExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
struct Config {
    port: u16,
    domain: String,
    provider_type: String,
    cf_api_token: Option<String>,
    cf_user: Option<String>,
    cf_api_key: Option<String>,
    cf_zone_id: Option<String>,
    check_interval_secs: Option<u64>,
    stale_after_secs: Option<u64>,
    probe_port: Option<u16>,
    log_level: String,
}

/// Non-empty value of an environment variable
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional numeric environment variable
fn parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{} is not a valid number", name))
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            port: parsed("PEERSCANNER_PORT")?.unwrap_or(62443),
            domain: var("PEERSCANNER_DOMAIN").unwrap_or_else(|| "getiantem.org".to_string()),
            provider_type: var("PEERSCANNER_PROVIDER_TYPE")
                .unwrap_or_else(|| "cloudflare".to_string()),
            cf_api_token: var("CF_API_TOKEN"),
            cf_user: var("CF_USER"),
            cf_api_key: var("CF_API_KEY"),
            cf_zone_id: var("CF_ZONE_ID"),
            check_interval_secs: parsed("PEERSCANNER_CHECK_INTERVAL_SECS")?,
            stale_after_secs: parsed("PEERSCANNER_STALE_AFTER_SECS")?,
            probe_port: parsed("PEERSCANNER_PROBE_PORT")?,
            log_level: var("PEERSCANNER_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Build the library configuration
    fn scanner_config(&self) -> Result<ScannerConfig> {
        let provider = match self.provider_type.as_str() {
            "cloudflare" => ProviderConfig::Cloudflare {
                api_token: self.cf_api_token.clone(),
                email: self.cf_user.clone(),
                api_key: self.cf_api_key.clone(),
                zone_id: self.cf_zone_id.clone(),
            },
            "memory" => ProviderConfig::Memory,
            other => anyhow::bail!(
                "PEERSCANNER_PROVIDER_TYPE '{}' is not supported. \
                Supported providers: cloudflare, memory",
                other
            ),
        };

        let mut config = ScannerConfig::new(self.domain.clone(), provider);
        if let Some(secs) = self.check_interval_secs {
            config.lifecycle.check_interval_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = self.stale_after_secs {
            config.lifecycle.stale_after_ms = secs.saturating_mul(1000);
        }
        if let Some(port) = self.probe_port {
            config.lifecycle.probe_port = port;
        }
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<ScannerConfig> {
        if self.port == 0 {
            anyhow::bail!("PEERSCANNER_PORT must be between 1 and 65535");
        }

        validate_domain_name(&self.domain)?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PEERSCANNER_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if self.provider_type == "cloudflare"
            && self.cf_api_token.is_none()
            && (self.cf_user.is_none() || self.cf_api_key.is_none())
        {
            anyhow::bail!(
                "Cloudflare credentials missing. Set CF_API_TOKEN, \
                or both CF_USER and CF_API_KEY"
            );
        }

        let config = self.scanner_config()?;
        config.validate()?;
        Ok(config)
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches common mistakes, not every invalid name.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("PEERSCANNER_DOMAIN cannot be empty");
    }

    if domain.len() > 253 {
        anyhow::bail!("Domain name too long: {} chars (max 253)", domain.len());
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }
        if label.len() > 63 {
            anyhow::bail!("Domain label too long: {} chars (max 63)", label.len());
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            );
        }
        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ScannerExitCode::ConfigError.into();
        }
    };

    let scanner_config = match config.validate() {
        Ok(scanner_config) => scanner_config,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return ScannerExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ScannerExitCode::ConfigError.into();
    }

    info!("Starting peerscannerd for {}", scanner_config.domain);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ScannerExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config.port, scanner_config).await {
            Ok(()) => ScannerExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup failed: {:#}", e);
                ScannerExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                ScannerExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Failure phase, which decides the exit code
enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

/// Run the daemon
async fn run_daemon(port: u16, config: ScannerConfig) -> Result<(), DaemonError> {
    let providers = ProviderRegistry::with_builtin();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        peerscanner_provider_cloudflare::register(&providers);
    }

    let provider = providers
        .create_provider(&config.provider, &config.domain)
        .context("Unable to create DNS provider")
        .map_err(DaemonError::Startup)?;
    info!("Using {} provider", provider.provider_name());

    let prober = Arc::new(TcpProber::from_config(&config.lifecycle));
    let registry = HostRegistry::new(provider, prober, config.lifecycle.clone());

    // Registrations are only accepted once the zone is known
    let summary = registry
        .load()
        .await
        .context("Zone reconciliation failed")
        .map_err(DaemonError::Startup)?;
    info!("Tracking {} hosts", summary.hosts);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Unable to listen on {}", addr))
        .map_err(DaemonError::Startup)?;
    info!("Listening on http://{}", addr);

    axum::serve(
        listener,
        http::router(Arc::clone(&registry)).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown signal handling failed: {:#}", e),
        }
    })
    .await
    .context("HTTP server failed")
    .map_err(DaemonError::Runtime)?;

    info!("Shutting down with {} hosts tracked", registry.len());
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// The name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("SIGINT")
}
