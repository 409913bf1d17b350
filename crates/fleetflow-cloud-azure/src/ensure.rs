//! Ensure operations: one idempotent create-or-update per resource kind

use crate::client::{ResourceClient, put_resource};
use crate::cluster::{AzureCloudSpec, ResourceKind};
use crate::error::Result;
use crate::fault_domain::FaultDomainTable;
use crate::resources::{
    AVAILABILITY_SET_SKU, AddressSpace, AvailabilitySet, AvailabilitySetProperties, ResourceGroup,
    ResourceId, RouteTable, RouteTableProperties, SUBNET_ADDRESS_PREFIX, SecurityGroup,
    SecurityGroupProperties, Sku, SubResource, Subnet, SubnetProperties, UPDATE_DOMAIN_COUNT,
    VNET_ADDRESS_PREFIX, VirtualNetwork, VirtualNetworkProperties, cluster_tags, subnet_id,
};
use crate::security::default_rules;
use serde_json::Map;

/// Everything an ensure operation needs besides the client
#[derive(Debug, Clone, Copy)]
pub struct EnsureScope<'a> {
    /// Cloud spec with the identifier of the resource being ensured assigned
    pub spec: &'a AzureCloudSpec,
    pub subscription_id: &'a str,
    pub location: &'a str,
    pub cluster_name: &'a str,
}

impl EnsureScope<'_> {
    fn id(&self, kind: ResourceKind) -> ResourceId {
        ResourceId::for_kind(kind, self.spec, self.subscription_id)
    }

    fn subnet_reference(&self) -> SubResource {
        SubResource {
            name: Some(self.spec.subnet_name.clone()),
            id: subnet_id(self.spec, self.subscription_id),
        }
    }
}

/// Ensure the resource of `kind` named in `scope.spec` exists
pub async fn ensure(
    kind: ResourceKind,
    client: &dyn ResourceClient,
    scope: &EnsureScope<'_>,
    fault_domains: &FaultDomainTable,
) -> Result<()> {
    let result = match kind {
        ResourceKind::ResourceGroup => ensure_resource_group(client, scope).await,
        ResourceKind::VNet => ensure_vnet(client, scope).await,
        ResourceKind::Subnet => ensure_subnet(client, scope).await,
        ResourceKind::RouteTable => ensure_route_table(client, scope).await,
        ResourceKind::SecurityGroup => ensure_security_group(client, scope).await,
        ResourceKind::AvailabilitySet => {
            ensure_availability_set(client, scope, fault_domains).await
        }
    };
    result.map_err(|e| e.context("create or update", kind, kind.identifier(scope.spec)))
}

/// The resource group call completes synchronously; it is not awaited
pub async fn ensure_resource_group(client: &dyn ResourceClient, scope: &EnsureScope<'_>) -> Result<()> {
    let group = ResourceGroup {
        name: scope.spec.resource_group.clone(),
        location: scope.location.to_string(),
        tags: cluster_tags(scope.cluster_name),
    };
    put_resource(client, &scope.id(ResourceKind::ResourceGroup), &group).await?;
    Ok(())
}

pub async fn ensure_vnet(client: &dyn ResourceClient, scope: &EnsureScope<'_>) -> Result<()> {
    let vnet = VirtualNetwork {
        name: scope.spec.vnet_name.clone(),
        location: scope.location.to_string(),
        tags: cluster_tags(scope.cluster_name),
        properties: VirtualNetworkProperties {
            address_space: AddressSpace {
                address_prefixes: vec![VNET_ADDRESS_PREFIX.to_string()],
            },
        },
    };
    let operation = put_resource(client, &scope.id(ResourceKind::VNet), &vnet).await?;
    client.wait(operation).await
}

pub async fn ensure_subnet(client: &dyn ResourceClient, scope: &EnsureScope<'_>) -> Result<()> {
    let subnet = Subnet {
        name: scope.spec.subnet_name.clone(),
        properties: SubnetProperties {
            address_prefix: SUBNET_ADDRESS_PREFIX.to_string(),
        },
    };
    let operation = put_resource(client, &scope.id(ResourceKind::Subnet), &subnet).await?;
    client.wait(operation).await
}

pub async fn ensure_route_table(client: &dyn ResourceClient, scope: &EnsureScope<'_>) -> Result<()> {
    let table = RouteTable {
        name: scope.spec.route_table_name.clone(),
        location: scope.location.to_string(),
        tags: cluster_tags(scope.cluster_name),
        properties: RouteTableProperties {
            subnets: vec![scope.subnet_reference()],
        },
    };
    let operation = put_resource(client, &scope.id(ResourceKind::RouteTable), &table).await?;
    client.wait(operation).await
}

pub async fn ensure_security_group(client: &dyn ResourceClient, scope: &EnsureScope<'_>) -> Result<()> {
    let group = SecurityGroup {
        name: scope.spec.security_group.clone(),
        location: scope.location.to_string(),
        tags: cluster_tags(scope.cluster_name),
        properties: SecurityGroupProperties {
            subnets: vec![scope.subnet_reference()],
            security_rules: default_rules(),
            extra: Map::new(),
        },
        extra: Map::new(),
    };
    let operation = put_resource(client, &scope.id(ResourceKind::SecurityGroup), &group).await?;
    client.wait(operation).await
}

/// Fails with `UnknownRegion` before any remote call if the location has no
/// fault-domain entry
pub async fn ensure_availability_set(
    client: &dyn ResourceClient,
    scope: &EnsureScope<'_>,
    fault_domains: &FaultDomainTable,
) -> Result<()> {
    let fault_domain_count = fault_domains.lookup(scope.location)?;

    let set = AvailabilitySet {
        name: scope.spec.availability_set.clone(),
        location: scope.location.to_string(),
        tags: cluster_tags(scope.cluster_name),
        sku: Sku {
            name: AVAILABILITY_SET_SKU.to_string(),
        },
        properties: AvailabilitySetProperties {
            platform_fault_domain_count: fault_domain_count,
            platform_update_domain_count: UPDATE_DOMAIN_COUNT,
        },
    };
    put_resource(client, &scope.id(ResourceKind::AvailabilitySet), &set).await?;
    Ok(())
}
