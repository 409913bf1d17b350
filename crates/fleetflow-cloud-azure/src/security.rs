//! Security group rules and drift reconciliation
//!
//! Azure rules cannot filter on ICMP. The baseline therefore denies all
//! inbound TCP and UDP explicitly and follows with an allow-all rule, which
//! leaves ICMP as the only traffic it admits.

use crate::client::{ResourceClient, get_resource, put_resource};
use crate::cluster::{AzureCloudSpec, ResourceKind};
use crate::error::Result;
use crate::resources::{
    Access, Direction, Protocol, ResourceId, SecurityGroup, SecurityRule, SecurityRuleProperties,
};
use serde_json::Map;

pub const SSH_INGRESS_RULE: &str = "ssh_ingress";
pub const INTER_NODE_COMM_RULE: &str = "inter_node_comm";
pub const AZURE_LOAD_BALANCER_RULE: &str = "azure_load_balancer";
pub const OUTBOUND_ALLOW_ALL_RULE: &str = "outbound_allow_all";

pub const DENY_ALL_TCP_RULE: &str = "deny_all_tcp";
pub const DENY_ALL_UDP_RULE: &str = "deny_all_udp";
pub const ICMP_ALLOW_ALL_RULE: &str = "icmp_by_allow_all";

const ANY: &str = "*";

struct RuleShape<'a> {
    direction: Direction,
    protocol: Protocol,
    source: &'a str,
    destination: &'a str,
    destination_port: &'a str,
    access: Access,
    priority: u32,
}

fn rule(name: &str, shape: RuleShape<'_>) -> SecurityRule {
    SecurityRule {
        name: name.to_string(),
        properties: SecurityRuleProperties {
            direction: shape.direction,
            protocol: shape.protocol,
            source_address_prefix: Some(shape.source.to_string()),
            source_port_range: Some(ANY.to_string()),
            destination_address_prefix: Some(shape.destination.to_string()),
            destination_port_range: Some(shape.destination_port.to_string()),
            access: shape.access,
            priority: shape.priority,
            extra: Map::new(),
        },
        extra: Map::new(),
    }
}

fn inbound_any(protocol: Protocol, access: Access, priority: u32) -> RuleShape<'static> {
    RuleShape {
        direction: Direction::Inbound,
        protocol,
        source: ANY,
        destination: ANY,
        destination_port: ANY,
        access,
        priority,
    }
}

pub fn ssh_ingress_rule() -> SecurityRule {
    rule(
        SSH_INGRESS_RULE,
        RuleShape {
            destination_port: "22",
            ..inbound_any(Protocol::Tcp, Access::Allow, 100)
        },
    )
}

pub fn inter_node_comm_rule() -> SecurityRule {
    rule(
        INTER_NODE_COMM_RULE,
        RuleShape {
            source: "VirtualNetwork",
            destination: "VirtualNetwork",
            ..inbound_any(Protocol::Any, Access::Allow, 200)
        },
    )
}

pub fn azure_load_balancer_rule() -> SecurityRule {
    rule(
        AZURE_LOAD_BALANCER_RULE,
        RuleShape {
            source: "AzureLoadBalancer",
            ..inbound_any(Protocol::Any, Access::Allow, 300)
        },
    )
}

pub fn outbound_allow_all_rule() -> SecurityRule {
    rule(
        OUTBOUND_ALLOW_ALL_RULE,
        RuleShape {
            direction: Direction::Outbound,
            ..inbound_any(Protocol::Any, Access::Allow, 100)
        },
    )
}

pub fn deny_all_tcp_rule() -> SecurityRule {
    rule(DENY_ALL_TCP_RULE, inbound_any(Protocol::Tcp, Access::Deny, 800))
}

pub fn deny_all_udp_rule() -> SecurityRule {
    rule(DENY_ALL_UDP_RULE, inbound_any(Protocol::Udp, Access::Deny, 801))
}

pub fn icmp_allow_all_rule() -> SecurityRule {
    rule(ICMP_ALLOW_ALL_RULE, inbound_any(Protocol::Any, Access::Allow, 900))
}

/// The three rules every cluster security group must carry, in order
pub fn baseline_rules() -> Vec<SecurityRule> {
    vec![deny_all_tcp_rule(), deny_all_udp_rule(), icmp_allow_all_rule()]
}

/// Rules of a newly created security group
pub fn default_rules() -> Vec<SecurityRule> {
    let mut rules = vec![
        ssh_ingress_rule(),
        inter_node_comm_rule(),
        azure_load_balancer_rule(),
        outbound_allow_all_rule(),
    ];
    rules.extend(baseline_rules());
    rules
}

/// Baseline rules absent from `existing`, matched by name
///
/// Rule contents are not compared; a rule with a baseline name counts as
/// present whatever it says.
pub fn missing_baseline_rules(existing: &[SecurityRule]) -> Vec<SecurityRule> {
    baseline_rules()
        .into_iter()
        .filter(|baseline| !existing.iter().any(|rule| rule.name == baseline.name))
        .collect()
}

/// Append any missing baseline rules to the live security group
///
/// Returns whether the group was updated. Existing rules are written back
/// unchanged and in their original order.
pub async fn add_icmp_rules_if_required(
    client: &dyn ResourceClient,
    spec: &AzureCloudSpec,
    subscription_id: &str,
    cluster_name: &str,
) -> Result<bool> {
    let kind = ResourceKind::SecurityGroup;
    let id = ResourceId::for_kind(kind, spec, subscription_id);

    let mut group: SecurityGroup = get_resource(client, &id)
        .await
        .map_err(|e| e.context("get", kind, &spec.security_group))?;

    let missing = missing_baseline_rules(&group.properties.security_rules);
    if missing.is_empty() {
        tracing::debug!(cluster = %cluster_name, "Security group {} has all baseline rules", id.name);
        return Ok(false);
    }

    for rule in &missing {
        tracing::info!(cluster = %cluster_name, rule = %rule.name, "Creating security rule");
    }
    group.properties.security_rules.extend(missing);

    let add_rules = async {
        let operation = put_resource(client, &id, &group).await?;
        client.wait(operation).await
    };
    add_rules
        .await
        .map_err(|e| e.context("add rules to", kind, &spec.security_group))?;

    Ok(true)
}
