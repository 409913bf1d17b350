//! Azure provider for FleetFlow
//!
//! This crate implements the ClusterProvider trait for Azure, provisioning
//! and tearing down the infrastructure a cluster runs on.
//!
//! # Resources
//!
//! Created in this order and deleted in roughly the reverse:
//!
//! - Resource group
//! - Virtual network (optionally in a separate network resource group)
//! - Subnet
//! - Route table, attached to the subnet
//! - Security group, attached to the subnet
//! - Availability set
//!
//! Every created resource is tracked by a finalizer on the cluster record, so
//! an interrupted run resumes where it stopped.
//!
//! # Requirements
//!
//! - A service principal, given inline in the cloud spec or through a secret
//!   reference (`tenantID`, `subscriptionID`, `clientID`, `clientSecret`)
//! - Optional: `AZURE_RESOURCE_MANAGER_ENDPOINT`, `AZURE_AUTHORITY_HOST`,
//!   `AZURE_POLL_INTERVAL_SECS`, `AZURE_OPERATION_TIMEOUT_SECS` env vars
//!
//! # Example
//!
//! ```ignore
//! use fleetflow_cloud::{ClusterProvider, EnvSecretSelector, FileStore};
//! use fleetflow_cloud_azure::{ArmClientFactory, AzureDatacenter, AzureProvider};
//! use std::sync::Arc;
//!
//! let provider = AzureProvider::new(
//!     AzureDatacenter::new("westeurope"),
//!     Arc::new(ArmClientFactory::from_env()?),
//!     Arc::new(EnvSecretSelector::default()),
//! );
//! let store = FileStore::new(".");
//!
//! let cluster = store.get("prod").await?;
//! let cluster = provider.initialize(cluster, &store).await?;
//! provider.reconcile(&cluster).await?;
//! ```

pub mod arm;
pub mod client;
pub mod cluster;
pub mod credentials;
pub mod delete;
pub mod ensure;
pub mod error;
pub mod fault_domain;
pub mod provider;
pub mod resources;
pub mod security;

pub use arm::{ArmClient, ArmClientFactory, ArmConfig, ClientSecretToken, StaticToken, TokenSource};
pub use client::{ClientFactory, Operation, PollKind, ResourceClient};
pub use cluster::{AzureCloudSpec, Cluster, ClusterSpec, ResourceKind};
pub use credentials::{Credentials, resolve_credentials};
pub use error::{AzureError, ProvisionError, Result};
pub use fault_domain::FaultDomainTable;
pub use provider::{AzureDatacenter, AzureProvider};
pub use resources::ResourceId;
