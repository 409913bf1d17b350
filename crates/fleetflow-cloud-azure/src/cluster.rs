//! Cluster record and the Azure resource kinds it tracks

use fleetflow_cloud::{FinalizerKind, FinalizerSet, SecretReference, Versioned};
use serde::{Deserialize, Serialize};

/// Prefix of every resource name assigned by the provider
pub const RESOURCE_NAME_PREFIX: &str = "kubernetes-";

/// Tag binding a resource to the cluster that owns it
pub const CLUSTER_TAG_KEY: &str = "cluster";

/// Kinds of Azure resources backing a cluster
///
/// Declaration order is the dependency order used for provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ResourceGroup,
    VNet,
    Subnet,
    RouteTable,
    SecurityGroup,
    AvailabilitySet,
}

impl ResourceKind {
    /// Order in which resources are created
    pub const PROVISION_ORDER: [ResourceKind; 6] = [
        ResourceKind::ResourceGroup,
        ResourceKind::VNet,
        ResourceKind::Subnet,
        ResourceKind::RouteTable,
        ResourceKind::SecurityGroup,
        ResourceKind::AvailabilitySet,
    ];

    /// Order in which resources are deleted
    ///
    /// The resource group goes before the availability set it contains; the
    /// availability set delete then tolerates the group's cascade.
    pub const TEARDOWN_ORDER: [ResourceKind; 6] = [
        ResourceKind::SecurityGroup,
        ResourceKind::RouteTable,
        ResourceKind::Subnet,
        ResourceKind::VNet,
        ResourceKind::ResourceGroup,
        ResourceKind::AvailabilitySet,
    ];

    /// Identifier recorded for this kind in the cloud spec, empty if unassigned
    pub fn identifier(self, spec: &AzureCloudSpec) -> &str {
        match self {
            ResourceKind::ResourceGroup => &spec.resource_group,
            ResourceKind::VNet => &spec.vnet_name,
            ResourceKind::Subnet => &spec.subnet_name,
            ResourceKind::RouteTable => &spec.route_table_name,
            ResourceKind::SecurityGroup => &spec.security_group,
            ResourceKind::AvailabilitySet => &spec.availability_set,
        }
    }

    pub fn set_identifier(self, spec: &mut AzureCloudSpec, name: impl Into<String>) {
        let slot = match self {
            ResourceKind::ResourceGroup => &mut spec.resource_group,
            ResourceKind::VNet => &mut spec.vnet_name,
            ResourceKind::Subnet => &mut spec.subnet_name,
            ResourceKind::RouteTable => &mut spec.route_table_name,
            ResourceKind::SecurityGroup => &mut spec.security_group,
            ResourceKind::AvailabilitySet => &mut spec.availability_set,
        };
        *slot = name.into();
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::ResourceGroup => write!(f, "resource group"),
            ResourceKind::VNet => write!(f, "virtual network"),
            ResourceKind::Subnet => write!(f, "subnet"),
            ResourceKind::RouteTable => write!(f, "route table"),
            ResourceKind::SecurityGroup => write!(f, "security group"),
            ResourceKind::AvailabilitySet => write!(f, "availability set"),
        }
    }
}

impl FinalizerKind for ResourceKind {
    fn token(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "fleetflow.dev/cleanup-azure-resource-group",
            ResourceKind::VNet => "fleetflow.dev/cleanup-azure-vnet",
            ResourceKind::Subnet => "fleetflow.dev/cleanup-azure-subnet",
            ResourceKind::RouteTable => "fleetflow.dev/cleanup-azure-route-table",
            ResourceKind::SecurityGroup => "fleetflow.dev/cleanup-azure-security-group",
            ResourceKind::AvailabilitySet => "fleetflow.dev/cleanup-azure-availability-set",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        ResourceKind::PROVISION_ORDER
            .into_iter()
            .find(|kind| kind.token() == token)
    }
}

/// Azure section of a cluster's cloud spec
///
/// Resource identifiers start empty and are filled in as the provider creates
/// the resources. A non-empty identifier the provider has no finalizer for
/// refers to a resource supplied by the user.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureCloudSpec {
    pub tenant_id: String,
    pub subscription_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<SecretReference>,

    pub resource_group: String,
    /// Resource group holding the VNet and subnet, if not `resource_group`
    pub vnet_resource_group: String,
    pub vnet_name: String,
    pub subnet_name: String,
    pub route_table_name: String,
    pub security_group: String,
    pub availability_set: String,
}

impl AzureCloudSpec {
    /// Resource group of the VNet and its subnet
    pub fn network_resource_group(&self) -> &str {
        if self.vnet_resource_group.is_empty() {
            &self.resource_group
        } else {
            &self.vnet_resource_group
        }
    }
}

impl std::fmt::Debug for AzureCloudSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCloudSpec")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &if self.client_secret.is_empty() { "" } else { "<redacted>" },
            )
            .field("credentials_reference", &self.credentials_reference)
            .field("resource_group", &self.resource_group)
            .field("vnet_resource_group", &self.vnet_resource_group)
            .field("vnet_name", &self.vnet_name)
            .field("subnet_name", &self.subnet_name)
            .field("route_table_name", &self.route_table_name)
            .field("security_group", &self.security_group)
            .field("availability_set", &self.availability_set)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub cloud: AzureCloudSpec,
}

/// The unit of orchestration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,

    #[serde(default)]
    pub resource_version: u64,

    pub spec: ClusterSpec,

    #[serde(default)]
    pub finalizers: FinalizerSet<ResourceKind>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, cloud: AzureCloudSpec) -> Self {
        Self {
            name: name.into(),
            resource_version: 0,
            spec: ClusterSpec { cloud },
            finalizers: FinalizerSet::new(),
        }
    }

    /// Name assigned to every resource the provider creates for this cluster
    pub fn default_resource_name(&self) -> String {
        format!("{}{}", RESOURCE_NAME_PREFIX, self.name)
    }
}

impl Versioned for Cluster {
    fn key(&self) -> &str {
        &self.name
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_tokens_round_trip() {
        for kind in ResourceKind::PROVISION_ORDER {
            assert_eq!(ResourceKind::from_token(kind.token()), Some(kind));
        }
        assert_eq!(ResourceKind::from_token("kubermatic.io/other"), None);
    }

    #[test]
    fn test_teardown_covers_every_kind() {
        let mut teardown = ResourceKind::TEARDOWN_ORDER.to_vec();
        teardown.sort();
        assert_eq!(teardown, ResourceKind::PROVISION_ORDER.to_vec());
    }

    #[test]
    fn test_identifier_accessors() {
        let mut spec = AzureCloudSpec::default();
        for kind in ResourceKind::PROVISION_ORDER {
            assert_eq!(kind.identifier(&spec), "");
            kind.set_identifier(&mut spec, format!("{:?}", kind));
        }
        assert_eq!(spec.vnet_name, "VNet");
        assert_eq!(spec.availability_set, "AvailabilitySet");
    }

    #[test]
    fn test_network_resource_group_override() {
        let mut spec = AzureCloudSpec {
            resource_group: "rg".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.network_resource_group(), "rg");

        spec.vnet_resource_group = "shared-net".to_string();
        assert_eq!(spec.network_resource_group(), "shared-net");
    }

    #[test]
    fn test_cluster_serialization() {
        let mut cluster = Cluster::new("c1", AzureCloudSpec::default());
        cluster.spec.cloud.resource_group = "kubernetes-c1".to_string();
        cluster.finalizers.insert(ResourceKind::ResourceGroup);

        let json = serde_json::to_value(&cluster).unwrap();
        assert_eq!(json["spec"]["cloud"]["resourceGroup"], "kubernetes-c1");
        assert_eq!(
            json["finalizers"],
            serde_json::json!(["fleetflow.dev/cleanup-azure-resource-group"])
        );

        let back: Cluster = serde_json::from_value(json).unwrap();
        assert_eq!(back, cluster);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let spec = AzureCloudSpec {
            client_secret: "hunter2".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", spec).contains("hunter2"));
    }
}
