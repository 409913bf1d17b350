mod common;

use common::*;
use fleetflow_cloud::ClusterProvider;
use fleetflow_cloud_azure::{AzureError, Cluster, ResourceId, ResourceKind};
use serde_json::{Value, json};

fn rule(name: &str, priority: u32) -> Value {
    json!({
        "name": name,
        "etag": "W/\"1\"",
        "properties": {
            "direction": "Inbound",
            "protocol": "Tcp",
            "sourceAddressPrefix": "*",
            "sourcePortRange": "*",
            "destinationAddressPrefix": "*",
            "destinationPortRange": "443",
            "access": "Allow",
            "priority": priority,
            "provisioningState": "Succeeded"
        }
    })
}

fn cluster_with_security_group() -> Cluster {
    let mut cluster = new_cluster();
    cluster.spec.cloud.resource_group = DEFAULT_NAME.to_string();
    cluster.spec.cloud.security_group = DEFAULT_NAME.to_string();
    cluster
}

fn security_group_id(cluster: &Cluster) -> ResourceId {
    ResourceId::for_kind(ResourceKind::SecurityGroup, &cluster.spec.cloud, SUBSCRIPTION)
}

fn seed_security_group(arm: &FakeArm, cluster: &Cluster, rules: Vec<Value>) {
    arm.insert(
        &security_group_id(cluster),
        json!({
            "name": DEFAULT_NAME,
            "location": "westeurope",
            "tags": { "cluster": CLUSTER },
            "etag": "W/\"1\"",
            "properties": {
                "securityRules": rules,
                "provisioningState": "Succeeded"
            }
        }),
    );
}

fn rule_names(arm: &FakeArm, cluster: &Cluster) -> Vec<String> {
    arm.resource(&security_group_id(cluster)).unwrap()["properties"]["securityRules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_missing_rules_are_added_once() {
    let arm = FakeArm::new();
    let cluster = cluster_with_security_group();
    seed_security_group(&arm, &cluster, vec![rule("https", 120), rule("ssh_ingress", 100)]);
    let provider = provider(&arm, "westeurope");

    assert!(provider.add_icmp_rules_if_required(&cluster).await.unwrap());
    assert!(!provider.add_icmp_rules_if_required(&cluster).await.unwrap());

    assert_eq!(arm.calls_of(Verb::Put).len(), 1);
    assert_eq!(arm.calls_of(Verb::Get).len(), 2);
    assert_eq!(arm.waits().len(), 1);
    assert_eq!(
        rule_names(&arm, &cluster),
        vec![
            "https",
            "ssh_ingress",
            "deny_all_tcp",
            "deny_all_udp",
            "icmp_by_allow_all",
        ]
    );

    let group = arm.resource(&security_group_id(&cluster)).unwrap();
    let rules = group["properties"]["securityRules"].as_array().unwrap();
    assert_eq!(rules[0], rule("https", 120));
    assert_eq!(rules[2]["properties"]["priority"], 800);
    assert_eq!(rules[3]["properties"]["priority"], 801);
    assert_eq!(rules[4]["properties"]["priority"], 900);
    assert_eq!(rules[4]["properties"]["protocol"], "*");
    // live fields survive the round trip
    assert_eq!(group["etag"], "W/\"1\"");
    assert_eq!(group["properties"]["provisioningState"], "Succeeded");
}

#[tokio::test]
async fn test_only_absent_rules_are_appended() {
    let arm = FakeArm::new();
    let cluster = cluster_with_security_group();
    seed_security_group(&arm, &cluster, vec![rule("deny_all_udp", 801)]);

    provider(&arm, "westeurope")
        .reconcile(&cluster)
        .await
        .unwrap();

    assert_eq!(
        rule_names(&arm, &cluster),
        vec!["deny_all_udp", "deny_all_tcp", "icmp_by_allow_all"]
    );
}

#[tokio::test]
async fn test_rules_with_plural_ranges_are_kept() {
    let arm = FakeArm::new();
    let cluster = cluster_with_security_group();
    let web = json!({
        "name": "web",
        "etag": "W/\"1\"",
        "properties": {
            "direction": "Inbound",
            "protocol": "Tcp",
            "sourceAddressPrefixes": ["10.1.0.0/16", "10.2.0.0/16"],
            "sourcePortRange": "*",
            "destinationAddressPrefix": "*",
            "destinationPortRanges": ["80", "443"],
            "access": "Allow",
            "priority": 130,
            "provisioningState": "Succeeded"
        }
    });
    seed_security_group(&arm, &cluster, vec![web.clone()]);

    let updated = provider(&arm, "westeurope")
        .add_icmp_rules_if_required(&cluster)
        .await
        .unwrap();

    assert!(updated);
    assert_eq!(
        rule_names(&arm, &cluster),
        vec!["web", "deny_all_tcp", "deny_all_udp", "icmp_by_allow_all"]
    );
    let group = arm.resource(&security_group_id(&cluster)).unwrap();
    assert_eq!(group["properties"]["securityRules"][0], web);
}

#[tokio::test]
async fn test_complete_group_is_not_written() {
    let arm = FakeArm::new();
    let cluster = cluster_with_security_group();
    seed_security_group(
        &arm,
        &cluster,
        vec![
            rule("deny_all_tcp", 800),
            rule("deny_all_udp", 801),
            rule("icmp_by_allow_all", 900),
        ],
    );

    let updated = provider(&arm, "westeurope")
        .add_icmp_rules_if_required(&cluster)
        .await
        .unwrap();

    assert!(!updated);
    assert!(arm.calls_of(Verb::Put).is_empty());
}

#[tokio::test]
async fn test_no_security_group_is_a_no_op() {
    let arm = FakeArm::new();
    // without a security group even missing credentials are fine
    let cluster = Cluster::new(CLUSTER, Default::default());

    let updated = provider(&arm, "westeurope")
        .add_icmp_rules_if_required(&cluster)
        .await
        .unwrap();

    assert!(!updated);
    assert!(arm.calls().is_empty());
    assert!(arm.credentials().is_empty());
}

#[tokio::test]
async fn test_absent_security_group_is_an_error() {
    let arm = FakeArm::new();
    let cluster = cluster_with_security_group();

    let err = provider(&arm, "westeurope")
        .add_icmp_rules_if_required(&cluster)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("get security group"));
}

#[tokio::test]
async fn test_failed_rule_update_is_reported() {
    let arm = FakeArm::new();
    let cluster = cluster_with_security_group();
    seed_security_group(&arm, &cluster, vec![]);
    arm.fail(Verb::Put, ResourceKind::SecurityGroup, 429);

    let err = provider(&arm, "westeurope")
        .reconcile(&cluster)
        .await
        .unwrap_err();

    assert!(matches!(err.error.root(), AzureError::Api { status: 429, .. }));
    assert!(err.to_string().contains("add rules to security group"));
}

#[tokio::test]
async fn test_validate_provisioned_cluster() {
    let arm = FakeArm::new();
    let (_store, cluster) = provisioned(&arm).await;
    arm.clear_calls();

    provider(&arm, "westeurope")
        .validate(&cluster)
        .await
        .unwrap();

    assert_eq!(arm.kinds_of(Verb::Get), ResourceKind::PROVISION_ORDER.to_vec());
    assert!(arm.calls_of(Verb::Put).is_empty());
    assert!(arm.calls_of(Verb::Delete).is_empty());
}

#[tokio::test]
async fn test_validate_checks_only_named_resources() {
    let arm = FakeArm::new();
    let mut cluster = new_cluster();
    cluster.spec.cloud.vnet_name = "shared-vnet".to_string();
    cluster.spec.cloud.vnet_resource_group = "network-rg".to_string();
    arm.insert(
        &ResourceId::for_kind(ResourceKind::VNet, &cluster.spec.cloud, SUBSCRIPTION),
        json!({ "name": "shared-vnet" }),
    );

    provider(&arm, "westeurope")
        .validate_cloud_spec(&cluster.spec.cloud)
        .await
        .unwrap();

    let gets = arm.calls_of(Verb::Get);
    assert_eq!(gets.len(), 1);
    assert!(gets[0].path.contains("/resourceGroups/network-rg/"));
}

#[tokio::test]
async fn test_validate_reports_missing_resource() {
    let arm = FakeArm::new();
    let mut cluster = new_cluster();
    cluster.spec.cloud.route_table_name = "gone".to_string();

    let err = provider(&arm, "westeurope")
        .validate_cloud_spec(&cluster.spec.cloud)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(
        err.to_string(),
        format!(
            "failed to get route table \"gone\": Resource not found: {}",
            ResourceId::for_kind(ResourceKind::RouteTable, &cluster.spec.cloud, SUBSCRIPTION)
        )
    );
}
