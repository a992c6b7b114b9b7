//! Tracked hosts and their lifecycle
//!
//! A [`Host`] is one (name, ip) pair known to peerscanner. Each host drives
//! its own rotation membership from a background task:
//!
//! ```text
//!               reset()                       probe ok, records in place
//!   ┌──────────────────────────┐     ┌──────────────┐ ───────────────► ┌────────┐
//!   │                          └───► │ Initializing │                  │ Active │
//!   │                                └──────────────┘ ◄─── probe ok ── └────────┘
//!   │                                       │                              │
//!   │                          max_failures consecutive failed probes      │
//!   │                                       ▼                              │
//!   │                                ┌──────────┐                          │
//!   └─────────────────────────────── │ Degraded │ ◄────────────────────────┘
//!                                    └──────────┘
//!                                          │ stale_after without reset / unregister
//!                                          ▼
//!                                    ┌─────────┐
//!                                    │ Removed │
//!                                    └─────────┘
//! ```
//!
//! Every `reset()` bumps the host's generation and starts a new task. A task
//! only acts while its generation is current, so a superseded task finishes
//! as a no-op instead of being preempted.
//!
//! The current task holds the membership lock across provider calls. Readers
//! never take it: [`Host::state`] and [`Host::snapshot`] read the status the
//! task publishes after every change.

use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classify::{HostKind, RotationGroup};
use crate::config::LifecycleConfig;
use crate::groups::GroupTracker;
use crate::registry::HostRegistry;
use crate::traits::{DnsProvider, HostProber, Record, RecordSpec};

/// Identity of a tracked host
///
/// Keyed by name and address together so a host that changes its address
/// is tracked as a new host while the old address ages out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostKey {
    pub name: String,
    pub ip: IpAddr,
}

impl HostKey {
    pub fn new(name: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            name: name.into(),
            ip,
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.ip)
    }
}

/// Lifecycle state of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    /// Created or reset; liveness not yet confirmed
    Initializing,
    /// Confirmed live and present in all of its rotation groups
    Active,
    /// Failed confirmation and withdrawn from rotation
    Degraded,
    /// Unregistered or expired; no longer tracked
    Removed,
}

/// A host's membership in one rotation group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembership {
    pub group: RotationGroup,
    /// The group record publishing this host, when one exists
    pub existing: Option<Record>,
}

/// Point-in-time view of a host, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    pub name: String,
    pub ip: IpAddr,
    pub kind: HostKind,
    pub state: HostState,
    pub generation: u64,
    pub registered_at: DateTime<Utc>,
    /// Groups the host is currently published in
    pub in_rotation: Vec<RotationGroup>,
}

/// Collaborators shared by every host of a registry
pub(crate) struct HostContext {
    pub(crate) provider: Arc<dyn DnsProvider>,
    pub(crate) prober: Arc<dyn HostProber>,
    pub(crate) config: LifecycleConfig,
    pub(crate) registry: Weak<HostRegistry>,
}

/// What the current task last published for readers
#[derive(Debug, Clone)]
struct Status {
    state: HostState,
    registered_at: DateTime<Utc>,
    in_rotation: Vec<RotationGroup>,
}

/// Mutable bookkeeping, owned by whichever lifecycle task is current
struct Membership {
    state: HostState,
    /// The host's own record (name -> ip)
    record: Option<Record>,
    groups: Vec<GroupMembership>,
    failures: u32,
    registered_at: DateTime<Utc>,
}

impl Membership {
    fn status(&self) -> Status {
        Status {
            state: self.state,
            registered_at: self.registered_at,
            in_rotation: self
                .groups
                .iter()
                .filter(|m| m.existing.is_some())
                .map(|m| m.group)
                .collect(),
        }
    }
}

enum Transition {
    /// Probe again after the delay
    Next(Duration),
    /// Withdrawn from rotation; wait for reset or expiry
    Degraded,
    /// A newer generation took over
    Superseded,
}

/// A tracked peer or fallback
pub struct Host {
    key: HostKey,
    kind: HostKind,
    generation: watch::Sender<u64>,
    status: watch::Sender<Status>,
    inner: Mutex<Membership>,
    context: Arc<HostContext>,
}

impl Host {
    pub(crate) fn new(
        key: HostKey,
        kind: HostKind,
        record: Option<Record>,
        context: Arc<HostContext>,
    ) -> Self {
        let groups = kind
            .groups()
            .iter()
            .map(|&group| GroupMembership {
                group,
                existing: None,
            })
            .collect();
        let membership = Membership {
            state: HostState::Initializing,
            record,
            groups,
            failures: 0,
            registered_at: Utc::now(),
        };
        let (generation, _) = watch::channel(0);
        let (status, _) = watch::channel(membership.status());

        Self {
            key,
            kind,
            generation,
            status,
            inner: Mutex::new(membership),
            context,
        }
    }

    pub fn key(&self) -> &HostKey {
        &self.key
    }

    pub fn kind(&self) -> HostKind {
        self.kind
    }

    /// Current generation; bumped by every reset
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Last published state; never waits on an in-flight provider call
    pub fn state(&self) -> HostState {
        self.status.borrow().state
    }

    /// The host's own record, if it exists in the zone
    pub async fn record(&self) -> Option<Record> {
        self.inner.lock().await.record.clone()
    }

    pub async fn memberships(&self) -> Vec<GroupMembership> {
        self.inner.lock().await.groups.clone()
    }

    pub fn snapshot(&self) -> HostSnapshot {
        let status = self.status.borrow().clone();
        HostSnapshot {
            name: self.key.name.clone(),
            ip: self.key.ip,
            kind: self.kind,
            state: status.state,
            generation: self.generation(),
            registered_at: status.registered_at,
            in_rotation: status.in_rotation,
        }
    }

    fn report(&self, inner: &Membership) {
        self.status.send_replace(inner.status());
    }

    /// Claim this host's group records during startup matching
    ///
    /// Takes `&mut self`: matching happens before the host is shared or any
    /// lifecycle task exists. Returns the number of records claimed.
    pub(crate) fn claim_groups(&mut self, tracker: &mut GroupTracker) -> usize {
        let ip = self.key.ip;
        let inner = self.inner.get_mut();
        let mut claimed = 0;
        for membership in &mut inner.groups {
            if let Some(record) = tracker.claim(membership.group, ip) {
                membership.existing = Some(record);
                claimed += 1;
            }
        }
        self.status.send_replace(inner.status());
        claimed
    }

    /// Restart the decision cycle from the beginning
    ///
    /// Supersedes any in-flight task and starts a new one. Must be called
    /// within a Tokio runtime.
    pub fn reset(self: &Arc<Self>) {
        let generation = self.rearm();
        self.start(generation);
    }

    /// Bump the generation without starting a task
    pub(crate) fn rearm(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            next = *generation;
        });
        next
    }

    /// Start the lifecycle task for the current generation
    pub(crate) fn run(self: &Arc<Self>) {
        self.start(self.generation());
    }

    /// Start the lifecycle task for `generation`
    ///
    /// Never blocks: the task is spawned onto the runtime. If `generation`
    /// was already superseded the task exits without acting.
    pub(crate) fn start(self: &Arc<Self>, generation: u64) {
        let superseded = self.generation.subscribe();
        tokio::spawn(Arc::clone(self).lifecycle(generation, superseded));
    }

    /// Supersede the running task and tear down all records
    ///
    /// Called once the host has been removed from the registry.
    pub(crate) fn retire(self: &Arc<Self>) {
        let generation = self.rearm();
        let host = Arc::clone(self);
        tokio::spawn(async move {
            let mut inner = host.inner.lock().await;
            if host.is_superseded(generation) {
                return;
            }
            info!("Unregistering {}", host.key);
            host.teardown(&mut inner).await;
            inner.state = HostState::Removed;
            host.report(&inner);
        });
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.generation() != generation
    }

    async fn lifecycle(self: Arc<Self>, generation: u64, mut superseded: watch::Receiver<u64>) {
        let deadline = {
            let mut inner = self.inner.lock().await;
            if self.is_superseded(generation) {
                return;
            }
            inner.state = HostState::Initializing;
            inner.failures = 0;
            inner.registered_at = Utc::now();
            self.report(&inner);
            Instant::now() + self.context.config.stale_after()
        };
        debug!("Starting lifecycle of {} (generation {})", self.key, generation);

        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                _ = superseded.changed() => return,
                _ = tokio::time::sleep_until(deadline) => break,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.check(generation, &mut superseded).await {
                Transition::Next(next) => delay = next,
                Transition::Superseded => return,
                Transition::Degraded => {
                    tokio::select! {
                        _ = superseded.changed() => return,
                        _ = tokio::time::sleep_until(deadline) => break,
                    }
                }
            }
        }

        self.expire(generation).await;
    }

    /// One probe round
    async fn check(&self, generation: u64, superseded: &mut watch::Receiver<u64>) -> Transition {
        let probe = tokio::select! {
            _ = superseded.changed() => return Transition::Superseded,
            result = self.context.prober.probe(&self.key) => result,
        };

        let mut inner = self.inner.lock().await;
        if self.is_superseded(generation) {
            return Transition::Superseded;
        }

        let config = &self.context.config;
        let transition = match probe {
            Ok(()) => {
                inner.failures = 0;
                if self.publish(&mut inner).await {
                    if inner.state != HostState::Active {
                        info!("{} is live and in rotation", self.key);
                        inner.state = HostState::Active;
                    }
                    Transition::Next(config.check_interval())
                } else {
                    Transition::Next(config.backoff(1))
                }
            }
            Err(e) => {
                inner.failures += 1;
                debug!(
                    "Probe of {} failed ({}/{}): {}",
                    self.key, inner.failures, config.max_failures, e
                );
                if inner.failures < config.max_failures {
                    Transition::Next(config.backoff(inner.failures))
                } else {
                    warn!(
                        "{} unreachable after {} probes, removing from rotation",
                        self.key, inner.failures
                    );
                    self.withdraw(&mut inner).await;
                    inner.state = HostState::Degraded;
                    Transition::Degraded
                }
            }
        };
        self.report(&inner);
        transition
    }

    /// Ensure the host record and every group record exist
    ///
    /// Returns `false` if any record could not be created.
    async fn publish(&self, inner: &mut Membership) -> bool {
        let provider = &self.context.provider;
        let ttl = self.context.config.record_ttl;
        let mut complete = true;

        if inner.record.is_none() {
            match provider
                .create_record(&RecordSpec::new(&self.key.name, self.key.ip, ttl))
                .await
            {
                Ok(record) => inner.record = Some(record),
                Err(e) if e.is_transient() => {
                    debug!("Unable to create record for {}, will retry: {}", self.key, e);
                    complete = false;
                }
                Err(e) => {
                    warn!("Unable to create record for {}: {}", self.key, e);
                    complete = false;
                }
            }
        }

        for membership in inner.groups.iter_mut().filter(|m| m.existing.is_none()) {
            let spec = RecordSpec::new(membership.group.label(), self.key.ip, ttl);
            match provider.create_record(&spec).await {
                Ok(record) => {
                    debug!("Added {} to {}", self.key, membership.group);
                    membership.existing = Some(record);
                }
                Err(e) => {
                    warn!("Unable to add {} to {}: {}", self.key, membership.group, e);
                    complete = false;
                }
            }
        }

        complete
    }

    /// Destroy the host's group records
    async fn withdraw(&self, inner: &mut Membership) {
        for membership in inner.groups.iter_mut() {
            let Some(record) = membership.existing.as_ref() else {
                continue;
            };
            match self.context.provider.destroy_record(record).await {
                Ok(()) => {
                    debug!("Removed {} from {}", self.key, membership.group);
                    membership.existing = None;
                }
                Err(e) if e.is_not_found() => {
                    debug!("{} was already gone from {}", self.key, membership.group);
                    membership.existing = None;
                }
                Err(e) => warn!("Unable to remove {} from {}: {}", self.key, membership.group, e),
            }
        }
    }

    /// Withdraw from rotation and destroy the host's own record
    async fn teardown(&self, inner: &mut Membership) {
        self.withdraw(inner).await;
        if let Some(record) = inner.record.take() {
            match self.context.provider.destroy_record(&record).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Unable to remove record of {}: {}", self.key, e);
                    inner.record = Some(record);
                }
            }
        }
    }

    /// Stop tracking a host that has not re-registered in time
    async fn expire(&self, generation: u64) {
        let Some(registry) = self.context.registry.upgrade() else {
            return;
        };
        if !registry.remove_if_current(self, generation) {
            // Re-registered while we were deciding.
            return;
        }

        let mut inner = self.inner.lock().await;
        info!("{} has not re-registered, removing", self.key);
        self.teardown(&mut inner).await;
        inner.state = HostState::Removed;
        self.report(&inner);
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("generation", &self.generation())
            .finish()
    }
}
