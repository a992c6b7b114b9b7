//! Rotation group tracking for startup reconciliation
//!
//! Holds, per reserved label, the group records found in the zone keyed by
//! address. Hosts claim their entries during matching; whatever is left over
//! afterwards has no host behind it. Group records whose content is not an
//! address can never be claimed and always end up as orphans.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::classify::RotationGroup;
use crate::traits::Record;

#[derive(Debug, Default)]
pub struct GroupTracker {
    groups: HashMap<RotationGroup, HashMap<IpAddr, Record>>,
    unparsed: Vec<(RotationGroup, Record)>,
}

impl GroupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group record; a later record for the same address replaces
    /// an earlier one.
    pub fn add(&mut self, group: RotationGroup, ip: IpAddr, record: Record) {
        tracing::trace!("Adding to {}: {}", group, ip);
        self.groups.entry(group).or_default().insert(ip, record);
    }

    /// Add a group record whose content is not an address
    pub fn add_unparsed(&mut self, group: RotationGroup, record: Record) {
        tracing::trace!("Adding to {}: unparsable {}", group, record.value);
        self.unparsed.push((group, record));
    }

    /// Claim the record for `ip` in `group`, protecting it from cleanup
    pub fn claim(&mut self, group: RotationGroup, ip: IpAddr) -> Option<Record> {
        self.groups.get_mut(&group)?.remove(&ip)
    }

    /// Number of unclaimed records across all groups
    pub fn len(&self) -> usize {
        self.groups.values().map(HashMap::len).sum::<usize>() + self.unparsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the tracker, yielding every unclaimed record
    pub fn into_orphans(self) -> Vec<(RotationGroup, Record)> {
        self.groups
            .into_iter()
            .flat_map(|(group, records)| records.into_values().map(move |r| (group, r)))
            .chain(self.unparsed)
            .collect()
    }
}
