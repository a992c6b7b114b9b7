//! Configuration types for peerscanner
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main peerscanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Managed DNS domain (e.g., "getiantem.org")
    pub domain: String,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Host lifecycle settings
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl ScannerConfig {
    /// Create a new configuration for `domain` with default settings
    pub fn new(domain: impl Into<String>, provider: ProviderConfig) -> Self {
        Self {
            domain: domain.into(),
            provider,
            lifecycle: LifecycleConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domain.trim().is_empty() {
            return Err(crate::Error::config("Managed domain cannot be empty"));
        }

        self.provider.validate()?;
        self.lifecycle.validate()?;

        Ok(())
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    ///
    /// Authenticates with `api_token` when present, otherwise with the
    /// legacy `email` + `api_key` pair.
    Cloudflare {
        /// Cloudflare API token
        api_token: Option<String>,
        /// Account email for global API key authentication
        email: Option<String>,
        /// Global API key
        api_key: Option<String>,
        /// Zone ID (optional, resolved from the domain otherwise)
        zone_id: Option<String>,
    },

    /// In-memory zone (not persistent)
    Memory,

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                email,
                api_key,
                ..
            } => {
                let has_token = api_token.as_ref().is_some_and(|t| !t.is_empty());
                let has_key = email.as_ref().is_some_and(|e| !e.is_empty())
                    && api_key.as_ref().is_some_and(|k| !k.is_empty());
                if !has_token && !has_key {
                    return Err(crate::Error::config(
                        "Cloudflare credentials missing: set an API token or an email and API key",
                    ));
                }
                Ok(())
            }
            ProviderConfig::Memory => Ok(()),
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Memory => "memory",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Memory
    }
}

/// Host lifecycle configuration
///
/// Durations are in milliseconds so tests can run the state machine at
/// sub-second speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Interval between liveness probes of an active host
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Initial delay after a failed probe; doubles per consecutive failure,
    /// capped at the check interval
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Consecutive failed probes before a host is withdrawn from rotation
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// How long a host stays tracked without re-registering
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,

    /// TTL of records created for hosts (seconds)
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,

    /// Port the TCP prober connects to
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,

    /// Timeout of a single probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl LifecycleConfig {
    /// Validate the lifecycle configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.check_interval_ms == 0 {
            return Err(crate::Error::config("Check interval must be > 0"));
        }
        if self.retry_delay_ms == 0 {
            return Err(crate::Error::config("Retry delay must be > 0"));
        }
        if self.max_failures == 0 {
            return Err(crate::Error::config("Max failures must be > 0"));
        }
        if self.stale_after_ms <= self.check_interval_ms {
            return Err(crate::Error::config(
                "Stale timeout must be longer than the check interval",
            ));
        }
        if self.probe_port == 0 {
            return Err(crate::Error::config("Probe port must be > 0"));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Delay before the next probe after `failures` consecutive failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let delay = self.retry_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.check_interval_ms))
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_failures: default_max_failures(),
            stale_after_ms: default_stale_after_ms(),
            record_ttl: default_record_ttl(),
            probe_port: default_probe_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_check_interval_ms() -> u64 {
    60_000
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_max_failures() -> u32 {
    3
}

fn default_stale_after_ms() -> u64 {
    10 * 60_000
}

fn default_record_ttl() -> u32 {
    120
}

fn default_probe_port() -> u16 {
    443
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}
