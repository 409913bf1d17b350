//! Azure cluster provider
//!
//! Drives the ensure and delete operations in dependency order and records
//! progress as finalizers on the cluster, one store update per completed
//! step. A failed run leaves the cluster at its last persisted state and can
//! simply be invoked again.

use crate::client::{ClientFactory, ResourceClient};
use crate::cluster::{AzureCloudSpec, Cluster, ResourceKind};
use crate::credentials::{Credentials, resolve_credentials};
use crate::delete::delete;
use crate::ensure::{EnsureScope, ensure};
use crate::error::{ProvisionError, Result};
use crate::fault_domain::FaultDomainTable;
use crate::resources::ResourceId;
use crate::security;
use async_trait::async_trait;
use fleetflow_cloud::{ClusterProvider, ClusterStore, SecretKeySelector, patch};
use std::sync::Arc;

/// Datacenter the provider creates resources in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureDatacenter {
    /// Azure region, e.g. `westeurope`
    pub location: String,
}

impl AzureDatacenter {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

/// Azure infrastructure provider
pub struct AzureProvider {
    datacenter: AzureDatacenter,
    clients: Arc<dyn ClientFactory>,
    secrets: Arc<dyn SecretKeySelector>,
    fault_domains: Arc<FaultDomainTable>,
}

impl AzureProvider {
    /// Create a provider using the built-in region fault-domain table
    pub fn new(
        datacenter: AzureDatacenter,
        clients: Arc<dyn ClientFactory>,
        secrets: Arc<dyn SecretKeySelector>,
    ) -> Self {
        Self {
            datacenter,
            clients,
            secrets,
            fault_domains: Arc::new(FaultDomainTable::azure()),
        }
    }

    /// Replace the region fault-domain table
    pub fn with_fault_domains(mut self, fault_domains: Arc<FaultDomainTable>) -> Self {
        self.fault_domains = fault_domains;
        self
    }

    pub fn datacenter(&self) -> &AzureDatacenter {
        &self.datacenter
    }

    async fn connect(&self, spec: &AzureCloudSpec) -> Result<(Credentials, Arc<dyn ResourceClient>)> {
        let credentials = resolve_credentials(spec, self.secrets.as_ref()).await?;
        let client = self.clients.client(&credentials)?;
        Ok((credentials, client))
    }

    /// Create every resource the cluster has no identifier for yet
    ///
    /// Steps run in [`ResourceKind::PROVISION_ORDER`]. A step whose identifier
    /// is already set is skipped, whether the provider created it on an
    /// earlier run or the user supplied it. A created resource gets the name
    /// `kubernetes-<cluster>`, and the name is persisted together with the
    /// finalizer only after the create has completed.
    pub async fn initialize_cloud_provider(
        &self,
        cluster: Cluster,
        store: &dyn ClusterStore<Cluster>,
    ) -> std::result::Result<Cluster, ProvisionError> {
        let connected = self.connect(&cluster.spec.cloud).await;
        let (credentials, client) = match connected {
            Ok(connected) => connected,
            Err(e) => return Err(ProvisionError::new(cluster, e)),
        };

        let mut cluster = cluster;
        for kind in ResourceKind::PROVISION_ORDER {
            let existing = kind.identifier(&cluster.spec.cloud);
            if !existing.is_empty() {
                tracing::debug!(cluster = %cluster.name, "Using existing {} {}", kind, existing);
                continue;
            }

            let name = cluster.default_resource_name();
            let mut desired = cluster.spec.cloud.clone();
            kind.set_identifier(&mut desired, &name);

            tracing::info!(cluster = %cluster.name, "Ensuring {} {}", kind, name);
            let scope = EnsureScope {
                spec: &desired,
                subscription_id: &credentials.subscription_id,
                location: &self.datacenter.location,
                cluster_name: &cluster.name,
            };
            let ensured = ensure(kind, client.as_ref(), &scope, &self.fault_domains).await;
            if let Err(e) = ensured {
                return Err(ProvisionError::new(cluster, e));
            }

            let record = patch(move |mut c: Cluster| {
                kind.set_identifier(&mut c.spec.cloud, name);
                c.finalizers.insert(kind);
                c
            });
            let updated = store.update(&cluster.name, record).await;
            cluster = match updated {
                Ok(updated) => updated,
                Err(e) => return Err(ProvisionError::new(cluster, e)),
            };
        }

        Ok(cluster)
    }

    /// Delete every resource the cluster holds a finalizer for
    ///
    /// Steps run in [`ResourceKind::TEARDOWN_ORDER`]. A resource that is
    /// already gone counts as deleted. Each finalizer is removed in its own
    /// store update right after its resource is gone.
    pub async fn cleanup_cloud_provider(
        &self,
        cluster: Cluster,
        store: &dyn ClusterStore<Cluster>,
    ) -> std::result::Result<Cluster, ProvisionError> {
        if cluster.finalizers.is_empty() {
            return Ok(cluster);
        }

        let connected = self.connect(&cluster.spec.cloud).await;
        let (credentials, client) = match connected {
            Ok(connected) => connected,
            Err(e) => return Err(ProvisionError::new(cluster, e)),
        };

        let mut cluster = cluster;
        for kind in ResourceKind::TEARDOWN_ORDER {
            if !cluster.finalizers.contains(kind) {
                continue;
            }

            let name = kind.identifier(&cluster.spec.cloud);
            tracing::info!(cluster = %cluster.name, "Deleting {} {}", kind, name);
            let deleted = delete(
                kind,
                client.as_ref(),
                &cluster.spec.cloud,
                &credentials.subscription_id,
            )
            .await;
            match deleted {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(cluster = %cluster.name, "{} {} already deleted", kind, name);
                }
                Err(e) => return Err(ProvisionError::new(cluster, e)),
            }

            let record = patch(move |mut c: Cluster| {
                c.finalizers.remove(kind);
                c
            });
            let updated = store.update(&cluster.name, record).await;
            cluster = match updated {
                Ok(updated) => updated,
                Err(e) => return Err(ProvisionError::new(cluster, e)),
            };
        }

        Ok(cluster)
    }

    /// Check that every resource named in `spec` is reachable
    ///
    /// Read-only. A missing resource is an error.
    pub async fn validate_cloud_spec(&self, spec: &AzureCloudSpec) -> Result<()> {
        let (credentials, client) = self.connect(spec).await?;

        for kind in ResourceKind::PROVISION_ORDER {
            let name = kind.identifier(spec);
            if name.is_empty() {
                continue;
            }

            let id = ResourceId::for_kind(kind, spec, &credentials.subscription_id);
            client
                .get(&id)
                .await
                .map_err(|e| e.context("get", kind, name))?;
        }

        Ok(())
    }

    /// Add the baseline ICMP rules to the cluster security group if missing
    ///
    /// Does nothing if the cluster has no security group. Returns whether the
    /// group was updated.
    pub async fn add_icmp_rules_if_required(&self, cluster: &Cluster) -> Result<bool> {
        let spec = &cluster.spec.cloud;
        if spec.security_group.is_empty() {
            return Ok(false);
        }

        let (credentials, client) = self.connect(spec).await?;
        security::add_icmp_rules_if_required(
            client.as_ref(),
            spec,
            &credentials.subscription_id,
            &cluster.name,
        )
        .await
    }
}

#[async_trait]
impl ClusterProvider for AzureProvider {
    type Cluster = Cluster;
    type Error = ProvisionError;

    fn name(&self) -> &str {
        "azure"
    }

    fn display_name(&self) -> &str {
        "Microsoft Azure"
    }

    async fn initialize(
        &self,
        cluster: Cluster,
        store: &dyn ClusterStore<Cluster>,
    ) -> std::result::Result<Cluster, ProvisionError> {
        self.initialize_cloud_provider(cluster, store).await
    }

    async fn cleanup(
        &self,
        cluster: Cluster,
        store: &dyn ClusterStore<Cluster>,
    ) -> std::result::Result<Cluster, ProvisionError> {
        self.cleanup_cloud_provider(cluster, store).await
    }

    async fn validate(&self, cluster: &Cluster) -> std::result::Result<(), ProvisionError> {
        self.validate_cloud_spec(&cluster.spec.cloud)
            .await
            .map_err(|e| ProvisionError::new(cluster.clone(), e))
    }

    async fn reconcile(&self, cluster: &Cluster) -> std::result::Result<(), ProvisionError> {
        self.add_icmp_rules_if_required(cluster)
            .await
            .map(|_| ())
            .map_err(|e| ProvisionError::new(cluster.clone(), e))
    }
}
