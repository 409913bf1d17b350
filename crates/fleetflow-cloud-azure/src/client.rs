//! Resource client abstraction
//!
//! One [`ResourceClient`] serves every resource kind; the kind-specific part
//! (provider namespace, path layout, api-version) lives in [`ResourceId`].

use crate::credentials::Credentials;
use crate::error::Result;
use crate::resources::ResourceId;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// How a pending operation reports completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    /// `Azure-AsyncOperation` status document with a `status` field
    AsyncOperation,
    /// `Location` URL answering 202 until done
    Location,
}

/// Handle returned by mutating calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// The remote API finished the request synchronously
    Completed,
    /// The remote API accepted the request; poll until it finishes
    Pending { poll_url: String, kind: PollKind },
}

impl Operation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Operation::Pending { .. })
    }
}

/// Remote resource management API
///
/// Implementations must report an absent resource as
/// [`AzureError::NotFound`](crate::AzureError::NotFound).
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get(&self, id: &ResourceId) -> Result<Value>;

    async fn create_or_update(&self, id: &ResourceId, body: Value) -> Result<Operation>;

    async fn delete(&self, id: &ResourceId) -> Result<Operation>;

    /// Wait until `operation` reaches a terminal state
    async fn wait(&self, operation: Operation) -> Result<()>;
}

/// Builds a client scoped to one set of credentials
pub trait ClientFactory: Send + Sync {
    fn client(&self, credentials: &Credentials) -> Result<Arc<dyn ResourceClient>>;
}

/// Fetch and decode a resource
pub async fn get_resource<R: DeserializeOwned>(
    client: &dyn ResourceClient,
    id: &ResourceId,
) -> Result<R> {
    let value = client.get(id).await?;
    Ok(serde_json::from_value(value)?)
}

/// Encode and submit a resource
pub async fn put_resource<R: Serialize + Sync>(
    client: &dyn ResourceClient,
    id: &ResourceId,
    resource: &R,
) -> Result<Operation> {
    let body = serde_json::to_value(resource)?;
    client.create_or_update(id, body).await
}
