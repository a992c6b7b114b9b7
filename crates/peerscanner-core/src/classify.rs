//! Record name classification
//!
//! Every record name in the managed zone falls into exactly one
//! [`RecordClass`]. Peer and fallback checks run before the reserved label
//! comparison, so a rotation label is never mistaken for a host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the opaque identifier used as a peer's subdomain
pub const PEER_ID_LEN: usize = 32;

/// Name prefix of explicitly named peers
pub const PEER_PREFIX: &str = "peer-";

/// Name prefix of fallback relays
pub const FALLBACK_PREFIX: &str = "fl-";

/// Reserved label aggregating every host in round-robin rotation
pub const ROUND_ROBIN_LABEL: &str = "atest_roundrobin";

/// Reserved label aggregating peers in rotation
pub const PEERS_LABEL: &str = "atest_apeers";

/// Reserved label aggregating fallbacks in rotation
pub const FALLBACKS_LABEL: &str = "atest_fallbacks";

/// One of the three reserved rotation groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationGroup {
    RoundRobin,
    Peers,
    Fallbacks,
}

impl RotationGroup {
    /// All groups, in a fixed order
    pub const ALL: [RotationGroup; 3] = [
        RotationGroup::RoundRobin,
        RotationGroup::Peers,
        RotationGroup::Fallbacks,
    ];

    /// The DNS label of this group
    pub fn label(self) -> &'static str {
        match self {
            RotationGroup::RoundRobin => ROUND_ROBIN_LABEL,
            RotationGroup::Peers => PEERS_LABEL,
            RotationGroup::Fallbacks => FALLBACKS_LABEL,
        }
    }

    /// Look up a group by its exact DNS label
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|group| group.label() == label)
    }
}

impl fmt::Display for RotationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of a tracked host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    /// Give-mode peer
    Peer,
    /// Statically provisioned fallback relay
    Fallback,
}

impl HostKind {
    /// Rotation groups a host of this kind belongs to
    pub fn groups(self) -> &'static [RotationGroup] {
        match self {
            HostKind::Peer => &[RotationGroup::RoundRobin, RotationGroup::Peers],
            HostKind::Fallback => &[RotationGroup::RoundRobin, RotationGroup::Fallbacks],
        }
    }
}

/// Classification of a record name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordClass {
    /// An individual host record
    Host(HostKind),
    /// A rotation group record
    Group(RotationGroup),
    /// Anything else in the zone
    Unrecognized,
}

/// Whether `name` identifies a peer
pub fn is_peer(name: &str) -> bool {
    // The subdomain length alone marks the opaque peer id. Something else
    // could be this long, but nothing we publish is.
    name.len() == PEER_ID_LEN || name.starts_with(PEER_PREFIX)
}

/// Whether `name` identifies a fallback relay
pub fn is_fallback(name: &str) -> bool {
    name.starts_with(FALLBACK_PREFIX)
}

/// Classify a record name
pub fn classify(name: &str) -> RecordClass {
    if is_peer(name) {
        RecordClass::Host(HostKind::Peer)
    } else if is_fallback(name) {
        RecordClass::Host(HostKind::Fallback)
    } else if let Some(group) = RotationGroup::from_label(name) {
        RecordClass::Group(group)
    } else {
        RecordClass::Unrecognized
    }
}
