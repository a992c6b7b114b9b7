// # Host Prober Trait
//
// Liveness confirmation for tracked hosts. The lifecycle task calls
// `probe()` before putting a host into rotation and on every check interval
// afterwards; how liveness is decided is up to the implementation.
//
// ## Implementations
//
// - TCP connect: [`crate::probe::TcpProber`]

use async_trait::async_trait;

use crate::host::HostKey;

/// Trait for host liveness probes
///
/// A probe must finish on its own (implementations carry their own timeout).
/// The lifecycle abandons an in-flight probe when the host is reset or
/// unregistered.
#[async_trait]
pub trait HostProber: Send + Sync {
    /// Confirm that the host behind `key` is reachable
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The host answered
    /// - `Err(Error)`: The host is considered unreachable for this round
    async fn probe(&self, key: &HostKey) -> Result<(), crate::Error>;

    /// Get the prober name (for logging/debugging)
    fn prober_name(&self) -> &'static str;
}
