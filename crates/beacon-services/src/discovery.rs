//! Discovery seam — supplies candidate endpoints per locality id.

use async_trait::async_trait;
use beacon_core::EndpointRecord;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Request(String),
    #[error("discovery returned HTTP {0}")]
    Status(u16),
    #[error("malformed discovery response: {0}")]
    Malformed(String),
}

/// Failures are transient: the scheduler logs them and tries again on the
/// next refresh.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn fetch(&self, locality: u32) -> Result<Vec<EndpointRecord>, DiscoveryError>;
}
