//! FleetFlow Cloud Infrastructure
//!
//! This crate provides the provider-agnostic plumbing for managing the cloud
//! infrastructure that backs a cluster: the provider trait, finalizer
//! bookkeeping, the versioned cluster store and credential secret lookup.
//!
//! # Supported Providers
//!
//! - **Azure**: resource group, virtual network, subnet, route table,
//!   security group, availability set (via Azure Resource Manager)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │          cluster controller / reconcile loop     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               fleetflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait ClusterProvider { ... }            │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ ClusterStore │  │ SecretLookup │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │     azure     │
//! │   provider    │
//! └───────────────┘
//! ```

pub mod error;
pub mod finalizer;
pub mod provider;
pub mod secret;
pub mod store;

// Re-exports
pub use error::{CloudError, Result};
pub use finalizer::{FinalizerKind, FinalizerSet};
pub use provider::ClusterProvider;
pub use secret::{EnvSecretSelector, MemorySecretSelector, SecretKeySelector, SecretReference};
pub use store::{ClusterStore, FileStore, MemoryStore, Patch, Versioned, patch};
