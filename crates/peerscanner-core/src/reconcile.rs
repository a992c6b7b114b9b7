//! Startup reconciliation
//!
//! Rebuilds the host registry from a full listing of the managed zone and
//! deletes rotation records that no longer have a host behind them.
//!
//! ## Flow
//!
//! ```text
//! list_all_records()            (failure here is fatal)
//!        │
//!        ▼
//! classify each record ──► peer / fallback ──► Host seeded with its record
//!        │
//!        └──────────────► group label ──────► GroupTracker[group][ip]
//!        │
//!        ▼
//! every host claims its (group, ip) entries
//!        │
//!        ▼
//! destroy leftover entries concurrently, wait for all
//!        │
//!        ▼
//! start every host's lifecycle task
//! ```
//!
//! Hosts are started only after all deletions finished, so no lifecycle
//! task can publish a record while it is still considered an orphan.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::classify::{RecordClass, RotationGroup, classify};
use crate::error::{Error, Result};
use crate::groups::GroupTracker;
use crate::host::{Host, HostKey};
use crate::registry::HostRegistry;
use crate::traits::{DnsProvider, Record};

/// Outcome of a zone load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Records in the zone listing
    pub records: usize,
    /// Hosts added to the registry
    pub hosts: usize,
    /// Group records claimed by a host
    pub matched: usize,
    /// Group records without a host
    pub orphans: usize,
    /// Orphans successfully destroyed
    pub orphans_removed: usize,
    /// Records ignored by classification
    pub unrecognized: usize,
}

/// Load hosts from the zone into `registry`
///
/// # Returns
///
/// - `Ok(LoadSummary)`: The registry reflects the zone
/// - `Err(Error::Reconcile)`: The zone could not be listed, or it was
///   already loaded. The process must not continue with unknown DNS state.
pub async fn load_hosts(registry: &HostRegistry) -> Result<LoadSummary> {
    if !registry.begin_load() {
        return Err(Error::reconcile("Zone has already been loaded"));
    }

    let context = Arc::clone(registry.context());
    let records = match context.provider.list_all_records().await {
        Ok(records) => records,
        Err(e) => {
            registry.abort_load();
            return Err(Error::reconcile(format!("Unable to load hosts: {}", e)));
        }
    };

    let mut summary = LoadSummary {
        records: records.len(),
        ..LoadSummary::default()
    };
    let mut tracker = GroupTracker::new();
    let mut hosts: HashMap<HostKey, Host> = HashMap::new();

    for record in records {
        match (classify(&record.name), record.ip()) {
            (RecordClass::Unrecognized, _) => {
                trace!("Unrecognized record: {}", record.full_name);
                summary.unrecognized += 1;
            }
            (RecordClass::Host(kind), Some(ip)) => {
                trace!("Adding {:?}: {}", kind, record.name);
                let key = HostKey::new(record.name.clone(), ip);
                let host = Host::new(key.clone(), kind, Some(record), Arc::clone(&context));
                hosts.insert(key, host);
            }
            (RecordClass::Host(_), None) => {
                warn!(
                    "Ignoring {} record {} with non-address content {}",
                    record.record_type, record.full_name, record.value
                );
                summary.unrecognized += 1;
            }
            (RecordClass::Group(group), Some(ip)) => tracker.add(group, ip, record),
            // No host can ever claim it.
            (RecordClass::Group(group), None) => tracker.add_unparsed(group, record),
        }
    }

    for host in hosts.values_mut() {
        summary.matched += host.claim_groups(&mut tracker);
    }

    let orphans = tracker.into_orphans();
    summary.orphans = orphans.len();
    summary.orphans_removed = remove_orphans(&context.provider, orphans).await;

    let adopted = registry.adopt(hosts.into_values().collect());
    summary.hosts = adopted.len();
    for host in &adopted {
        host.run();
    }

    info!(
        "Loaded {} hosts from {} records ({} in rotation, {}/{} orphans removed, {} unrecognized)",
        summary.hosts,
        summary.records,
        summary.matched,
        summary.orphans_removed,
        summary.orphans,
        summary.unrecognized
    );
    Ok(summary)
}

/// Destroy every orphan concurrently and wait for all of them
///
/// Failures are logged and counted; they never abort sibling deletions.
async fn remove_orphans(
    provider: &Arc<dyn DnsProvider>,
    orphans: Vec<(RotationGroup, Record)>,
) -> usize {
    let mut tasks = JoinSet::new();
    for (group, record) in orphans {
        let provider = Arc::clone(provider);
        tasks.spawn(async move {
            debug!("{} in {} is missing host, removing from rotation", record.value, group);
            match provider.destroy_record(&record).await {
                Ok(()) => true,
                Err(e) if e.is_not_found() => {
                    debug!("{} in {} was already gone", record.value, group);
                    true
                }
                Err(e) => {
                    warn!("Unable to remove {} from {}: {}", record.value, group, e);
                    false
                }
            }
        });
    }

    let mut removed = 0;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => warn!("Orphan removal task failed: {}", e),
        }
    }
    removed
}
