//! Delete operations: one per resource kind
//!
//! A resource that is already gone surfaces as a not-found error; the
//! teardown orchestrator decides whether that counts as success.

use crate::client::ResourceClient;
use crate::cluster::{AzureCloudSpec, ResourceKind};
use crate::error::Result;
use crate::resources::ResourceId;

/// Delete the resource of `kind` named in `spec`
pub async fn delete(
    kind: ResourceKind,
    client: &dyn ResourceClient,
    spec: &AzureCloudSpec,
    subscription_id: &str,
) -> Result<()> {
    let id = ResourceId::for_kind(kind, spec, subscription_id);
    let result = match kind {
        ResourceKind::ResourceGroup => delete_resource_group(client, &id).await,
        ResourceKind::AvailabilitySet => delete_availability_set(client, &id).await,
        ResourceKind::VNet
        | ResourceKind::Subnet
        | ResourceKind::RouteTable
        | ResourceKind::SecurityGroup => delete_and_wait(client, &id).await,
    };
    result.map_err(|e| e.context("delete", kind, kind.identifier(spec)))
}

/// Looks the group up first so a missing group reports not-found from `get`
pub async fn delete_resource_group(client: &dyn ResourceClient, id: &ResourceId) -> Result<()> {
    client.get(id).await?;
    delete_and_wait(client, id).await
}

/// Network resources are deleted through a long-running operation
pub async fn delete_and_wait(client: &dyn ResourceClient, id: &ResourceId) -> Result<()> {
    let operation = client.delete(id).await?;
    client.wait(operation).await
}

pub async fn delete_availability_set(client: &dyn ResourceClient, id: &ResourceId) -> Result<()> {
    client.delete(id).await?;
    Ok(())
}
