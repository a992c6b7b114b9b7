//! Core traits for peerscanner
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsProvider`]: List, create and destroy records in the managed zone
//! - [`HostProber`]: Confirm that a registered host is reachable

pub mod dns_provider;
pub mod prober;

pub use dns_provider::{DnsProvider, DnsProviderFactory, Record, RecordSpec};
pub use prober::HostProber;
