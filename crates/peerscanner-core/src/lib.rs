// # peerscanner-core
//
// Core library of peerscanner: keeps DNS rotation for give-mode peers and
// fallback relays in sync with live registrations.
//
// ## Architecture Overview
//
// - **DnsProvider**: Trait for listing, creating and destroying zone records
// - **HostProber**: Trait for confirming that a registered host is reachable
// - **classify**: Pure mapping of record names to peer / fallback / group / other
// - **GroupTracker**: Rotation records by group and address, used to find orphans
// - **Host**: A tracked (name, ip) pair with its own lifecycle task
// - **HostRegistry**: The concurrent map of hosts shared by every caller
// - **reconcile**: Startup load that rebuilds the registry from the zone
// - **ProviderRegistry**: Plugin-based registry for DNS providers
//
// ## Design Principles
//
// 1. **Zone is the source of truth at startup**: state is rebuilt on every restart
// 2. **One task per host**: hosts drive their own rotation membership
// 3. **Short critical sections**: the registry lock never spans a network call
// 4. **Library-First**: the daemon is a thin layer over this crate

pub mod classify;
pub mod config;
pub mod error;
pub mod groups;
pub mod host;
pub mod plugins;
pub mod probe;
pub mod reconcile;
pub mod registry;
pub mod traits;
pub mod zone;

// Re-export core types for convenience
pub use classify::{HostKind, RecordClass, RotationGroup, classify};
pub use config::{LifecycleConfig, ProviderConfig, ScannerConfig};
pub use error::{Error, Result};
pub use host::{GroupMembership, Host, HostKey, HostSnapshot, HostState};
pub use plugins::ProviderRegistry;
pub use probe::TcpProber;
pub use reconcile::LoadSummary;
pub use registry::HostRegistry;
pub use traits::{DnsProvider, HostProber, Record, RecordSpec};
pub use zone::MemoryZone;
