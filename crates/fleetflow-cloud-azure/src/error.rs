//! Azure provider error types

use crate::cluster::{Cluster, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("no credentials provided")]
    NoCredentials,

    #[error("could not determine the number of fault domains, unknown region {0:?}")]
    UnknownRegion(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Azure API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Long-running operation {status}: {message}")]
    OperationFailed { status: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("failed to {action} {kind} {name:?}: {source}")]
    Resource {
        action: &'static str,
        kind: ResourceKind,
        name: String,
        source: Box<AzureError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] fleetflow_cloud::CloudError),
}

impl AzureError {
    /// Whether the remote API reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        match self {
            AzureError::NotFound(_) => true,
            AzureError::Api { status, .. } => *status == 404,
            AzureError::Resource { source, .. } => source.is_not_found(),
            AzureError::CloudError(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Wrap with the action and resource it happened on
    pub fn context(self, action: &'static str, kind: ResourceKind, name: impl Into<String>) -> Self {
        AzureError::Resource {
            action,
            kind,
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, past any resource context
    pub fn root(&self) -> &AzureError {
        match self {
            AzureError::Resource { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;

/// Failure of an orchestrator run
///
/// Carries the cluster as last persisted, so the caller sees every step that
/// completed before the failure.
#[derive(Error, Debug)]
#[error("cluster {}: {error}", .cluster.name)]
pub struct ProvisionError {
    pub cluster: Box<Cluster>,
    #[source]
    pub error: AzureError,
}

impl ProvisionError {
    pub fn new(cluster: Cluster, error: impl Into<AzureError>) -> Self {
        Self {
            cluster: Box::new(cluster),
            error: error.into(),
        }
    }
}
