//! Azure Resource Manager resource identities and descriptors
//!
//! Descriptor types mirror the ARM JSON documents. Types that are read back
//! and written again (the security group and its rules) keep unknown fields in
//! `extra` so a round trip never drops live configuration.

use crate::cluster::{AzureCloudSpec, CLUSTER_TAG_KEY, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const RESOURCES_API_VERSION: &str = "2018-02-01";
const NETWORK_API_VERSION: &str = "2018-06-01";
const COMPUTE_API_VERSION: &str = "2018-06-01";

/// Address space of the cluster VNet
pub const VNET_ADDRESS_PREFIX: &str = "10.0.0.0/16";

/// Address prefix of the cluster subnet
pub const SUBNET_ADDRESS_PREFIX: &str = "10.0.0.0/16";

/// Availability set SKU
pub const AVAILABILITY_SET_SKU: &str = "Aligned";

/// Platform update domains per availability set
pub const UPDATE_DOMAIN_COUNT: u32 = 20;

pub type Tags = BTreeMap<String, String>;

/// Tags binding a resource to its cluster
pub fn cluster_tags(cluster_name: &str) -> Tags {
    Tags::from([(CLUSTER_TAG_KEY.to_string(), cluster_name.to_string())])
}

/// ARM id of the cluster subnet, used to associate the route table and
/// security group with it
pub fn subnet_id(spec: &AzureCloudSpec, subscription_id: &str) -> String {
    ResourceId::for_kind(ResourceKind::Subnet, spec, subscription_id).path()
}

/// Fully qualified identity of one ARM resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub kind: ResourceKind,
    pub name: String,
    /// Parent VNet of a subnet
    pub parent: Option<String>,
}

impl ResourceId {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        kind: ResourceKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            kind,
            name: name.into(),
            parent: None,
        }
    }

    pub fn resource_group(subscription_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(subscription_id, name.clone(), ResourceKind::ResourceGroup, name)
    }

    pub fn subnet(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        vnet: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            parent: Some(vnet.into()),
            ..Self::new(subscription_id, resource_group, ResourceKind::Subnet, name)
        }
    }

    /// Identity of `kind` as recorded in `spec`
    pub fn for_kind(kind: ResourceKind, spec: &AzureCloudSpec, subscription_id: &str) -> Self {
        match kind {
            ResourceKind::ResourceGroup => Self::resource_group(subscription_id, &spec.resource_group),
            ResourceKind::VNet => Self::new(
                subscription_id,
                spec.network_resource_group(),
                kind,
                &spec.vnet_name,
            ),
            ResourceKind::Subnet => Self::subnet(
                subscription_id,
                spec.network_resource_group(),
                &spec.vnet_name,
                &spec.subnet_name,
            ),
            ResourceKind::RouteTable => {
                Self::new(subscription_id, &spec.resource_group, kind, &spec.route_table_name)
            }
            ResourceKind::SecurityGroup => {
                Self::new(subscription_id, &spec.resource_group, kind, &spec.security_group)
            }
            ResourceKind::AvailabilitySet => {
                Self::new(subscription_id, &spec.resource_group, kind, &spec.availability_set)
            }
        }
    }

    /// ARM path, e.g. `/subscriptions/s/resourceGroups/rg/providers/...`
    pub fn path(&self) -> String {
        let group = format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group
        );
        match self.kind {
            ResourceKind::ResourceGroup => format!(
                "/subscriptions/{}/resourcegroups/{}",
                self.subscription_id, self.name
            ),
            ResourceKind::VNet => format!(
                "{}/providers/Microsoft.Network/virtualNetworks/{}",
                group, self.name
            ),
            ResourceKind::Subnet => format!(
                "{}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
                group,
                self.parent.as_deref().unwrap_or_default(),
                self.name
            ),
            ResourceKind::RouteTable => format!(
                "{}/providers/Microsoft.Network/routeTables/{}",
                group, self.name
            ),
            ResourceKind::SecurityGroup => format!(
                "{}/providers/Microsoft.Network/networkSecurityGroups/{}",
                group, self.name
            ),
            ResourceKind::AvailabilitySet => format!(
                "{}/providers/Microsoft.Compute/availabilitySets/{}",
                group, self.name
            ),
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self.kind {
            ResourceKind::ResourceGroup => RESOURCES_API_VERSION,
            ResourceKind::AvailabilitySet => COMPUTE_API_VERSION,
            _ => NETWORK_API_VERSION,
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Reference to another resource by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    pub name: String,
    pub location: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetwork {
    pub name: String,
    pub location: String,
    pub tags: Tags,
    pub properties: VirtualNetworkProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkProperties {
    pub address_space: AddressSpace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpace {
    pub address_prefixes: Vec<String>,
}

/// Subnets are VNet child resources and carry no tags of their own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub name: String,
    pub properties: SubnetProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetProperties {
    pub address_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    pub name: String,
    pub location: String,
    pub tags: Tags,
    pub properties: RouteTableProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableProperties {
    #[serde(default)]
    pub subnets: Vec<SubResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub properties: SecurityGroupProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupProperties {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<SubResource>,
    #[serde(default)]
    pub security_rules: Vec<SecurityRule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    pub name: String,
    pub properties: SecurityRuleProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRuleProperties {
    pub direction: Direction,
    pub protocol: Protocol,
    /// Absent when the rule uses `sourceAddressPrefixes` or an application security group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range: Option<String>,
    pub access: Access,
    pub priority: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Esp,
    Ah,
    #[serde(rename = "*")]
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySet {
    pub name: String,
    pub location: String,
    pub tags: Tags,
    pub sku: Sku,
    pub properties: AvailabilitySetProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySetProperties {
    pub platform_fault_domain_count: u32,
    pub platform_update_domain_count: u32,
}
