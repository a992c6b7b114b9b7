// # DNS Provider Trait
//
// Defines the interface for listing, creating and destroying records in the
// managed DNS zone.
//
// ## Implementations
//
// - Cloudflare: `peerscanner-provider-cloudflare` crate
// - In-memory: [`crate::zone::MemoryZone`]
//
// ## Usage
//
// ```rust,ignore
// use peerscanner_core::{DnsProvider, RecordSpec};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let record = provider
//         .create_record(&RecordSpec::new("atest_apeers", "1.2.3.4".parse()?, 120))
//         .await?;
//     provider.destroy_record(&record).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A record as it currently exists in the managed zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The record ID (provider-specific)
    pub id: String,
    /// Record name relative to the managed domain (`"@"` for the apex)
    pub name: String,
    /// Record content, an IP address for A/AAAA records
    pub value: String,
    /// Fully qualified record name
    pub full_name: String,
    /// Record type ("A", "AAAA", "CNAME", ...)
    pub record_type: String,
    /// Time-to-live for the record
    pub ttl: Option<u32>,
}

impl Record {
    /// Parse the record content as an IP address
    ///
    /// Returns `None` for records whose content is not an address
    /// (CNAME, TXT, ...).
    pub fn ip(&self) -> Option<IpAddr> {
        self.value.parse().ok()
    }
}

/// A record to be created in the managed zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpec {
    /// Record name relative to the managed domain
    pub name: String,
    /// Address the record points to
    pub value: IpAddr,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl RecordSpec {
    /// Create a new record specification
    pub fn new(name: impl Into<String>, value: IpAddr, ttl: u32) -> Self {
        Self {
            name: name.into(),
            value,
            ttl,
        }
    }

    /// DNS record type implied by the address family
    pub fn record_type(&self) -> &'static str {
        match self.value {
            IpAddr::V4(_) => "A",
            IpAddr::V6(_) => "AAAA",
        }
    }
}

/// Trait for DNS provider implementations
///
/// This trait defines the three zone operations peerscanner needs.
/// Implementations must handle the specifics of each provider's API.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks:
/// orphan cleanup issues one `destroy_record` per record concurrently.
///
/// # Retries
///
/// Providers execute one logical operation per call and return errors
/// as-is. Retry and backoff are owned by the host lifecycle; orphan
/// cleanup never retries.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every record under the managed domain
    ///
    /// Implementations must follow provider pagination so the returned
    /// collection is the complete zone.
    async fn list_all_records(&self) -> Result<Vec<Record>, crate::Error>;

    /// Create a record and return it as stored by the provider
    async fn create_record(&self, spec: &RecordSpec) -> Result<Record, crate::Error>;

    /// Destroy a previously listed or created record
    async fn destroy_record(&self, record: &Record) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance for the managed `domain`
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
        domain: &str,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
