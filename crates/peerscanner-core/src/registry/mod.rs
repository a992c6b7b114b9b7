//! Host registry
//!
//! The registry is the single map of tracked hosts, shared by the HTTP
//! registration surface, startup reconciliation and the hosts' own lifecycle
//! tasks. Construct it once and hand out the `Arc`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use peerscanner_core::HostRegistry;
//!
//! let registry = HostRegistry::new(provider, prober, config.lifecycle);
//!
//! // Rebuild state from the zone before accepting registrations
//! registry.load().await?;
//!
//! // Registration traffic
//! let host = registry.get_or_create("peer-xyz", "5.5.5.5".parse()?)?;
//! registry.unregister("peer-xyz", "5.5.5.5".parse()?);
//! ```
//!
//! ## Locking
//!
//! The map sits behind one mutex that is held only for the map operation
//! itself. Lifecycle tasks are spawned after the guard is dropped and DNS
//! calls never happen under it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::classify::{HostKind, RecordClass, classify};
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::host::{Host, HostContext, HostKey, HostSnapshot};
use crate::reconcile::{self, LoadSummary};
use crate::traits::{DnsProvider, HostProber};

/// Concurrent map of tracked hosts
///
/// ## Guarantees
///
/// - At most one [`Host`] exists per [`HostKey`] at any time
/// - Re-registering a key resets the existing host; the instance is never
///   replaced
pub struct HostRegistry {
    hosts: Mutex<HashMap<HostKey, Arc<Host>>>,
    context: Arc<HostContext>,
    loaded: AtomicBool,
}

impl HostRegistry {
    /// Create an empty registry
    ///
    /// # Parameters
    ///
    /// - `provider`: DNS provider used for the managed zone
    /// - `prober`: Liveness probe run by every host's lifecycle task
    /// - `config`: Lifecycle timing
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        prober: Arc<dyn HostProber>,
        config: LifecycleConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|registry| Self {
            hosts: Mutex::new(HashMap::new()),
            context: Arc::new(HostContext {
                provider,
                prober,
                config,
                registry: registry.clone(),
            }),
            loaded: AtomicBool::new(false),
        })
    }

    // A panic while holding the guard cannot leave the map half-updated:
    // every critical section is a single map call.
    fn lock(&self) -> MutexGuard<'_, HashMap<HostKey, Arc<Host>>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a host, creating it or resetting the existing one
    ///
    /// A new host starts its lifecycle task; an existing host restarts its
    /// decision cycle. Must be called within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<Host>)`: The host tracked for `(name, ip)`
    /// - `Err(Error::InvalidInput)`: If `name` is not a peer or fallback name
    pub fn get_or_create(&self, name: &str, ip: IpAddr) -> Result<Arc<Host>> {
        let kind = validate_name(name)?;

        let key = HostKey::new(name, ip);
        let (host, generation, created) = {
            let mut hosts = self.lock();
            match hosts.get(&key) {
                Some(host) => {
                    let generation = host.rearm();
                    (Arc::clone(host), generation, false)
                }
                None => {
                    let host = Arc::new(Host::new(
                        key.clone(),
                        kind,
                        None,
                        Arc::clone(&self.context),
                    ));
                    hosts.insert(key, Arc::clone(&host));
                    (host, 0, true)
                }
            }
        };

        if created {
            info!("Tracking new host {}", host.key());
        } else {
            debug!("Re-registered {}", host.key());
        }
        host.start(generation);

        Ok(host)
    }

    /// Look up a host without creating or resetting it
    pub fn get(&self, name: &str, ip: IpAddr) -> Option<Arc<Host>> {
        self.lock().get(&HostKey::new(name, ip)).cloned()
    }

    /// Stop tracking `host`
    ///
    /// Idempotent. Only removes the entry if it is this very instance, so a
    /// host created later under the same key is left alone.
    pub fn remove(&self, host: &Host) {
        let mut hosts = self.lock();
        if hosts
            .get(host.key())
            .is_some_and(|tracked| std::ptr::eq(Arc::as_ptr(tracked), host))
        {
            hosts.remove(host.key());
        }
    }

    /// Remove `host` unless it was reset after `generation` started
    ///
    /// Resets bump the generation under the same lock, so the check and the
    /// removal are atomic with respect to re-registration.
    pub(crate) fn remove_if_current(&self, host: &Host, generation: u64) -> bool {
        let mut hosts = self.lock();
        let current = hosts
            .get(host.key())
            .is_some_and(|tracked| std::ptr::eq(Arc::as_ptr(tracked), host));
        if !current || host.generation() != generation {
            return false;
        }
        hosts.remove(host.key());
        true
    }

    /// Unregister a host: look it up, remove it and tear down its records
    ///
    /// Returns the removed host, or `None` if it was not tracked.
    pub fn unregister(&self, name: &str, ip: IpAddr) -> Option<Arc<Host>> {
        let host = self.get(name, ip)?;
        self.remove(&host);
        host.retire();
        Some(host)
    }

    /// Rebuild state from the zone and prune orphaned rotation records
    ///
    /// Runs once; see [`crate::reconcile`].
    pub async fn load(&self) -> Result<LoadSummary> {
        reconcile::load_hosts(self).await
    }

    /// Number of tracked hosts
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All tracked hosts
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        self.lock().values().cloned().collect()
    }

    /// Snapshots of all tracked hosts, sorted by name and address
    pub fn snapshot(&self) -> Vec<HostSnapshot> {
        let mut snapshots: Vec<HostSnapshot> = self.hosts().iter().map(|h| h.snapshot()).collect();
        snapshots.sort_by(|a, b| (&a.name, a.ip).cmp(&(&b.name, b.ip)));
        snapshots
    }

    pub(crate) fn context(&self) -> &Arc<HostContext> {
        &self.context
    }

    /// Mark the zone as loaded; `false` if it already was
    pub(crate) fn begin_load(&self) -> bool {
        !self.loaded.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn abort_load(&self) {
        self.loaded.store(false, Ordering::SeqCst);
    }

    /// Insert hosts built from the zone, skipping keys already tracked
    ///
    /// Returns the hosts actually inserted. Their tasks are not started.
    pub(crate) fn adopt(&self, loaded: Vec<Host>) -> Vec<Arc<Host>> {
        let mut hosts = self.lock();
        let mut adopted = Vec::with_capacity(loaded.len());
        for host in loaded {
            if hosts.contains_key(host.key()) {
                continue;
            }
            let host = Arc::new(host);
            hosts.insert(host.key().clone(), Arc::clone(&host));
            adopted.push(host);
        }
        adopted
    }
}

/// Kind of host a registered name stands for
///
/// Only names a zone load classifies as hosts are accepted, so every
/// registered host is rebuilt by the next load.
fn validate_name(name: &str) -> Result<HostKind> {
    if name.trim().is_empty() {
        return Err(Error::invalid_input("Host name cannot be empty"));
    }
    match classify(name) {
        RecordClass::Host(kind) => Ok(kind),
        RecordClass::Group(_) => Err(Error::invalid_input(format!(
            "{} is a reserved rotation label",
            name
        ))),
        RecordClass::Unrecognized => Err(Error::invalid_input(format!(
            "{} is neither a peer nor a fallback name",
            name
        ))),
    }
}
