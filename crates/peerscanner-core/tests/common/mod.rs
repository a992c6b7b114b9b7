//! Test doubles and common utilities for contract tests
//!
//! The doubles journal every provider and prober call into one shared log so
//! tests can assert on ordering across components.

#![allow(dead_code)]

use peerscanner_core::error::{Error, Result};
use peerscanner_core::traits::{DnsProvider, HostProber, Record, RecordSpec};
use peerscanner_core::{Host, HostKey, HostRegistry, HostState, LifecycleConfig};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One observed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    List,
    Create { name: String, value: String },
    Destroy { id: String, name: String, value: String },
    Probe { name: String },
}

/// Shared, ordered call log
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Op>>>);

impl Journal {
    pub fn push(&self, op: Op) {
        self.0.lock().unwrap().push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.lock().unwrap().clone()
    }

    pub fn destroyed_ids(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Destroy { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<(String, String)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Create { name, value } => Some((name, value)),
                _ => None,
            })
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, Op::Probe { .. }))
            .count()
    }
}

/// Helper to build a zone record
pub fn record(id: &str, name: &str, value: &str) -> Record {
    Record {
        id: id.to_string(),
        name: name.to_string(),
        value: value.to_string(),
        full_name: format!("{}.example.org", name),
        record_type: "A".to_string(),
        ttl: Some(120),
    }
}

/// A scripted DnsProvider that records every call
pub struct MockDnsProvider {
    zone: Mutex<Vec<Record>>,
    journal: Journal,
    fail_list: AtomicBool,
    failing_destroys: Mutex<HashSet<String>>,
    fail_creates: AtomicBool,
    create_delay: Mutex<Duration>,
    destroy_delay: Mutex<Duration>,
    next_id: AtomicU64,
    destroy_call_count: AtomicUsize,
}

impl MockDnsProvider {
    pub fn new(zone: Vec<Record>, journal: Journal) -> Self {
        Self {
            zone: Mutex::new(zone),
            journal,
            fail_list: AtomicBool::new(false),
            failing_destroys: Mutex::new(HashSet::new()),
            fail_creates: AtomicBool::new(false),
            create_delay: Mutex::new(Duration::ZERO),
            destroy_delay: Mutex::new(Duration::ZERO),
            next_id: AtomicU64::new(1000),
            destroy_call_count: AtomicUsize::new(0),
        }
    }

    /// Make `list_all_records` fail
    pub fn fail_listing(self) -> Self {
        self.fail_list.store(true, Ordering::SeqCst);
        self
    }

    /// Make destroying the record with `id` fail
    pub fn fail_destroy_of(self, id: &str) -> Self {
        self.failing_destroys.lock().unwrap().insert(id.to_string());
        self
    }

    /// Delay every create call after it is journaled
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self.create_delay.lock().unwrap() = delay;
        self
    }

    /// Delay every destroy call
    pub fn with_destroy_delay(self, delay: Duration) -> Self {
        *self.destroy_delay.lock().unwrap() = delay;
        self
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn destroy_call_count(&self) -> usize {
        self.destroy_call_count.load(Ordering::SeqCst)
    }

    /// Current zone contents
    pub fn zone(&self) -> Vec<Record> {
        self.zone.lock().unwrap().clone()
    }

    /// Zone records with the given name and value
    pub fn find(&self, name: &str, value: &str) -> Vec<Record> {
        self.zone()
            .into_iter()
            .filter(|r| r.name == name && r.value == value)
            .collect()
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_all_records(&self) -> Result<Vec<Record>> {
        self.journal.push(Op::List);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "listing unavailable"));
        }
        Ok(self.zone())
    }

    async fn create_record(&self, spec: &RecordSpec) -> Result<Record> {
        self.journal.push(Op::Create {
            name: spec.name.clone(),
            value: spec.value.to_string(),
        });
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "create rejected"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let created = record(&id, &spec.name, &spec.value.to_string());
        self.zone.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn destroy_record(&self, target: &Record) -> Result<()> {
        self.destroy_call_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.destroy_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.journal.push(Op::Destroy {
            id: target.id.clone(),
            name: target.name.clone(),
            value: target.value.clone(),
        });
        if self.failing_destroys.lock().unwrap().contains(&target.id) {
            return Err(Error::provider("mock", "destroy rejected"));
        }
        self.zone.lock().unwrap().retain(|r| r.id != target.id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A prober whose verdict the test controls
pub struct ScriptedProber {
    live: AtomicBool,
    journal: Journal,
}

impl ScriptedProber {
    pub fn new(live: bool, journal: Journal) -> Self {
        Self {
            live: AtomicBool::new(live),
            journal,
        }
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl HostProber for ScriptedProber {
    async fn probe(&self, key: &HostKey) -> Result<()> {
        self.journal.push(Op::Probe {
            name: key.name.clone(),
        });
        if self.live.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::probe(format!("{} unreachable", key)))
        }
    }

    fn prober_name(&self) -> &'static str {
        "scripted"
    }
}

/// A prober that never answers, freezing hosts before their first decision
pub struct PendingProber {
    journal: Journal,
}

impl PendingProber {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

#[async_trait::async_trait]
impl HostProber for PendingProber {
    async fn probe(&self, key: &HostKey) -> Result<()> {
        self.journal.push(Op::Probe {
            name: key.name.clone(),
        });
        std::future::pending().await
    }

    fn prober_name(&self) -> &'static str {
        "pending"
    }
}

/// Lifecycle timing fast enough for tests
pub fn fast_lifecycle() -> LifecycleConfig {
    LifecycleConfig {
        check_interval_ms: 50,
        retry_delay_ms: 10,
        max_failures: 3,
        stale_after_ms: 60_000,
        record_ttl: 120,
        probe_port: 443,
        probe_timeout_ms: 100,
    }
}

/// Registry over the given doubles
pub fn registry_with(
    provider: Arc<MockDnsProvider>,
    prober: Arc<dyn HostProber>,
    config: LifecycleConfig,
) -> Arc<HostRegistry> {
    HostRegistry::new(provider, prober, config)
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Poll a host until it reaches `state` or two seconds pass
pub async fn wait_for_state(host: &Host, state: HostState) -> bool {
    for _ in 0..200 {
        if host.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
