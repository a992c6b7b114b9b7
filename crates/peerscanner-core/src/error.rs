//! Error types for peerscanner
//!
//! Provider failures are categorized so callers can react to the kind of
//! failure (credentials, throttling, a record that is already gone) without
//! parsing messages.

use thiserror::Error;

/// Result type alias for peerscanner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for peerscanner
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected registration or record input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport failure or a 5xx from a provider API
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The zone or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A provider rejected the operation for any other reason
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// A host did not answer its liveness probe
    #[error("Probe failed: {0}")]
    Probe(String),

    /// The zone could not be loaded at startup
    #[error("Reconciliation error: {0}")]
    Reconcile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    pub fn reconcile(msg: impl Into<String>) -> Self {
        Self::Reconcile(msg.into())
    }

    /// The target of a destroy no longer exists
    ///
    /// Deleting a record that is already gone leaves the zone in the
    /// requested state, so callers treat this as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Worth retrying later without any configuration change
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::RateLimited(_) | Self::Io(_))
    }
}

/// Lets custom provider factories use `anyhow` internally
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{:#}", err))
    }
}
