// # Zone Implementations
//
// Implementations of the DnsProvider trait that live inside the process.
// Remote providers ship as their own crates.

pub mod memory;

pub use memory::{MemoryZone, MemoryZoneFactory};
