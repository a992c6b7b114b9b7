// # Memory Zone
//
// In-memory implementation of DnsProvider.
//
// ## Purpose
//
// Provides a zone that lives only inside the process. Useful for local
// runs of the daemon without provider credentials, and for tests.
//
// ## Crash Behavior
//
// - All records are lost on restart/crash
// - The next startup reconciles against an empty zone

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::ProviderConfig;
use crate::traits::dns_provider::{DnsProvider, DnsProviderFactory, Record, RecordSpec};

/// In-memory zone
///
/// Records are kept in listing order in a Vec protected by a RwLock.
/// Clones share the same zone.
///
/// # Example
///
/// ```rust,no_run
/// use peerscanner_core::zone::MemoryZone;
/// use peerscanner_core::traits::{DnsProvider, RecordSpec};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let zone = MemoryZone::new("example.org");
///
///     let record = zone
///         .create_record(&RecordSpec::new("peer-a", "1.2.3.4".parse()?, 120))
///         .await?;
///     assert_eq!(record.full_name, "peer-a.example.org");
///
///     zone.destroy_record(&record).await?;
///     assert!(zone.is_empty().await);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryZone {
    domain: String,
    records: Arc<RwLock<Vec<Record>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryZone {
    /// Create a new empty zone for `domain`
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            records: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Add an A/AAAA-style record directly, bypassing `create_record`
    ///
    /// Returns the stored record.
    pub async fn seed(&self, name: &str, value: &str) -> Record {
        let record = self.build(name, value, "A", None);
        self.records.write().await.push(record.clone());
        record
    }

    /// Get a copy of all records
    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    /// Records with the given relative name
    pub async fn named(&self, name: &str) -> Vec<Record> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect()
    }

    /// Get the number of records in the zone
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if the zone is empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn build(&self, name: &str, value: &str, record_type: &str, ttl: Option<u32>) -> Record {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let full_name = if name == "@" {
            self.domain.clone()
        } else {
            format!("{}.{}", name, self.domain)
        };
        Record {
            id: format!("mem-{}", id),
            name: name.to_string(),
            value: value.to_string(),
            full_name,
            record_type: record_type.to_string(),
            ttl,
        }
    }
}

#[async_trait]
impl DnsProvider for MemoryZone {
    async fn list_all_records(&self) -> Result<Vec<Record>, Error> {
        Ok(self.records().await)
    }

    async fn create_record(&self, spec: &RecordSpec) -> Result<Record, Error> {
        let record = self.build(
            &spec.name,
            &spec.value.to_string(),
            spec.record_type(),
            Some(spec.ttl),
        );
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn destroy_record(&self, record: &Record) -> Result<(), Error> {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|r| r.id != record.id);
        if guard.len() == before {
            return Err(Error::not_found(format!("DNS record not found: {}", record.id)));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for creating memory zones
pub struct MemoryZoneFactory;

impl DnsProviderFactory for MemoryZoneFactory {
    fn create(&self, config: &ProviderConfig, domain: &str) -> Result<Box<dyn DnsProvider>, Error> {
        match config {
            ProviderConfig::Memory => {
                tracing::warn!("Using in-memory zone for {} - records are not published", domain);
                Ok(Box::new(MemoryZone::new(domain)))
            }
            _ => Err(Error::config("Invalid config for memory provider")),
        }
    }
}
