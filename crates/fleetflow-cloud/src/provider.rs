//! Cluster infrastructure provider trait definition

use crate::store::{ClusterStore, Versioned};
use async_trait::async_trait;

/// Provisions and tears down the cloud infrastructure backing a cluster
///
/// Every operation is idempotent and resumable: progress is persisted through
/// the store after each completed step, so a failed or interrupted call can
/// simply be invoked again. Callers must serialize invocations per cluster.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    type Cluster: Versioned;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the provider name (e.g., "azure")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Create every missing resource and record its finalizer
    async fn initialize(
        &self,
        cluster: Self::Cluster,
        store: &dyn ClusterStore<Self::Cluster>,
    ) -> Result<Self::Cluster, Self::Error>;

    /// Delete every resource that still carries a finalizer
    async fn cleanup(
        &self,
        cluster: Self::Cluster,
        store: &dyn ClusterStore<Self::Cluster>,
    ) -> Result<Self::Cluster, Self::Error>;

    /// Check that the resources referenced by the cluster are reachable
    async fn validate(&self, cluster: &Self::Cluster) -> Result<(), Self::Error>;

    /// Correct configuration drift on already provisioned resources
    async fn reconcile(&self, cluster: &Self::Cluster) -> Result<(), Self::Error>;
}
