//! End-to-end resolution: watch feed → resource cache → node group manager.
//!
//! Fixtures are written as API-server JSON and replayed through a
//! `StaticFeed`, so these tests also cover wire decoding.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::watch;

use machinescale_autoscale::{AutoscaleError, AutoscalerConfig, MachineController, NodeGroupManager};
use machinescale_state::{
    CacheFeeder, Machine, ObjectKey, Resource, ResourceCache, ResourceKind, ResourceList, StaticFeed, WatchEvent,
};

const NS: &str = "openshift-machine-api";
const MIN: &str = "machine.openshift.io/cluster-api-autoscaler-node-group-min-size";
const MAX: &str = "machine.openshift.io/cluster-api-autoscaler-node-group-max-size";

// ── Fixture builders ────────────────────────────────────────────────

fn scalable(name: &str, uid: &str, replicas: i32, min: &str, max: &str, owners: Value) -> Value {
    json!({
        "metadata": {
            "name": name,
            "namespace": NS,
            "uid": uid,
            "annotations": { MIN: min, MAX: max },
            "ownerReferences": owners,
        },
        "spec": {
            "replicas": replicas,
            "selector": { "matchLabels": { "group": name } },
        },
    })
}

fn machine(name: &str, group: &str, set: &str, set_uid: &str, provider_id: &str) -> Value {
    json!({
        "metadata": {
            "name": name,
            "namespace": NS,
            "uid": format!("{name}-uid"),
            "labels": { "group": group },
            "ownerReferences": [
                { "apiVersion": "machine.openshift.io/v1beta1", "kind": "MachineSet", "name": set, "uid": set_uid }
            ],
        },
        "spec": { "providerID": provider_id },
    })
}

fn node(name: &str, provider_id: &str) -> Value {
    json!({ "metadata": { "name": name }, "spec": { "providerID": provider_id } })
}

/// Three groups plus deployment-backed machines:
///
/// - `a`: uid 1, replicas 3, bounds 1..5, three machines and nodes
/// - `b`: bounds 2..2, one machine and node
/// - `c`: scalable, but its only machine's owner uid names a previous
///   incarnation of `c`
/// - `d`: deployment owning set `d-1`, one machine and node
/// - `e-1`: set naming a deployment that does not exist
fn fixture() -> ResourceList {
    let mut machine_sets = vec![
        scalable("a", "1", 3, "1", "5", json!([])),
        scalable("b", "2", 2, "2", "2", json!([])),
        scalable("c", "3-new", 1, "0", "3", json!([])),
    ];
    let mut machines = vec![
        machine("a-0", "a", "a", "1", "aws:///a-0"),
        machine("a-1", "a", "a", "1", "aws:///a-1"),
        machine("a-2", "a", "a", "1", "aws:///a-2"),
        machine("b-0", "b", "b", "2", "aws:///b-0"),
        machine("c-0", "c", "c", "3-old", "aws:///c-0"),
    ];
    let mut nodes: Vec<Value> = ["a-0", "a-1", "a-2", "b-0", "c-0"]
        .iter()
        .map(|n| node(&format!("node-{n}"), &format!("aws:///{n}")))
        .collect();

    let d_owner = json!([{ "kind": "MachineDeployment", "name": "d", "uid": "d-uid" }]);
    let e_owner = json!([{ "kind": "MachineDeployment", "name": "e", "uid": "e-uid" }]);
    let mut d_set = scalable("d-1", "d-1-uid", 2, "1", "3", d_owner);
    d_set["spec"]["selector"]["matchLabels"]["group"] = json!("d");
    machine_sets.push(d_set);
    machine_sets.push(scalable("e-1", "e-1-uid", 1, "1", "3", e_owner));
    machines.push(machine("d-0", "d", "d-1", "d-1-uid", "aws:///d-0"));
    machines.push(machine("e-0", "e-1", "e-1", "e-1-uid", "aws:///e-0"));
    nodes.push(node("node-d-0", "aws:///d-0"));
    nodes.push(node("node-e-0", "aws:///e-0"));

    let mut deployment = scalable("d", "d-uid", 2, "1", "4", json!([]));
    deployment["spec"]["selector"]["matchLabels"]["group"] = json!("d");

    serde_json::from_value(json!({
        "nodes": nodes,
        "machines": machines,
        "machineSets": machine_sets,
        "machineDeployments": [deployment],
    }))
    .unwrap()
}

async fn start(config: AutoscalerConfig) -> (ResourceCache, NodeGroupManager) {
    let cache = ResourceCache::new();
    let controller = MachineController::new(cache.clone(), &config);
    let (_tx, shutdown) = watch::channel(false);
    controller
        .run(&StaticFeed::new(fixture()), shutdown)
        .await
        .unwrap();
    (cache, NodeGroupManager::new(controller, &config))
}

// ── Machine sets ────────────────────────────────────────────────────

#[tokio::test]
async fn scalable_machine_set_is_listed_with_its_members() {
    let (_cache, mgr) = start(AutoscalerConfig::default()).await;

    let groups = mgr.list_groups(None).await.unwrap();
    let ids: Vec<String> = groups.iter().map(|g| g.id()).collect();
    assert_eq!(ids, [format!("MachineSet/{NS}/a"), format!("MachineSet/{NS}/c")]);

    let a = &groups[0];
    assert_eq!((a.min_size(), a.max_size(), a.target_size()), (1, 5, 3));

    let mut members = mgr.members_of(a).await.unwrap();
    members.sort();
    assert_eq!(members, ["aws:///a-0", "aws:///a-1", "aws:///a-2"]);

    for pid in &members {
        let owner = mgr.group_for_node(pid).await.unwrap().unwrap();
        assert_eq!(owner.id(), a.id());
    }
}

#[tokio::test]
async fn fixed_size_group_is_excluded() {
    let (_cache, mgr) = start(AutoscalerConfig::default()).await;

    assert!(mgr.group(&format!("MachineSet/{NS}/b")).await.unwrap().is_none());
    assert!(mgr.group_for_node("aws:///b-0").await.unwrap().is_none());
}

#[tokio::test]
async fn owner_uid_mismatch_resolves_to_no_group() {
    let (_cache, mgr) = start(AutoscalerConfig::default()).await;

    assert!(mgr.group_for_node("aws:///c-0").await.unwrap().is_none());

    let c = mgr.group(&format!("MachineSet/{NS}/c")).await.unwrap().unwrap();
    assert!(mgr.members_of(&c).await.unwrap().is_empty());
}

#[tokio::test]
async fn deployment_owned_sets_are_hidden_when_deployments_disabled() {
    let (cache, mgr) = start(AutoscalerConfig::default()).await;

    assert!(!cache.has_synced(ResourceKind::MachineDeployment));
    let groups = mgr.list_groups(Some(NS)).await.unwrap();
    assert!(groups.iter().all(|g| g.kind() == ResourceKind::MachineSet));
    assert!(groups.iter().all(|g| !g.name().starts_with('d')));
}

// ── Machine deployments ─────────────────────────────────────────────

#[tokio::test]
async fn deployment_group_owns_nodes_of_its_sets() {
    let (_cache, mgr) = start(AutoscalerConfig::default().with_machine_deployments(true)).await;

    let deployment = mgr
        .group(&format!("MachineDeployment/{NS}/d"))
        .await
        .unwrap()
        .expect("deployment d should be listed");
    assert_eq!(mgr.members_of(&deployment).await.unwrap(), ["aws:///d-0"]);

    let owner = mgr.group_for_node("aws:///d-0").await.unwrap().unwrap();
    assert_eq!(owner.kind(), ResourceKind::MachineDeployment);
    assert_eq!(owner.name(), "d");
}

#[tokio::test]
async fn dangling_deployment_reference_is_reported() {
    let (_cache, mgr) = start(AutoscalerConfig::default().with_machine_deployments(true)).await;

    let err = mgr.group_for_node("aws:///e-0").await.unwrap_err();
    match err {
        AutoscaleError::DanglingReference { kind, key } => {
            assert_eq!(kind, ResourceKind::MachineDeployment);
            assert_eq!(key, format!("{NS}/e"));
        }
        other => panic!("expected DanglingReference, got {other:?}"),
    }

    // Other nodes are unaffected.
    assert!(mgr.group_for_node("aws:///a-0").await.unwrap().is_some());
}

// ── Staleness ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn mutations_are_seen_only_after_the_refresh_interval() {
    let (cache, mgr) = start(AutoscalerConfig::default()).await;
    let feeder = CacheFeeder::new(cache.clone());

    let before = mgr.list_groups(None).await.unwrap();
    assert_eq!(before.len(), 2);

    feeder
        .apply(WatchEvent::Deleted {
            kind: ResourceKind::MachineSet,
            key: ObjectKey::new(NS, "a"),
        })
        .unwrap();

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(mgr.list_groups(None).await.unwrap(), before);
    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(mgr.list_groups(None).await.unwrap(), before);

    tokio::time::advance(Duration::from_secs(21)).await;
    let after = mgr.list_groups(None).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].name(), "c");
    assert!(mgr.group_for_node("aws:///a-0").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn node_keeps_its_group_until_the_refresh_interval() {
    let (cache, mgr) = start(AutoscalerConfig::default()).await;
    let feeder = CacheFeeder::new(cache.clone());
    let a = format!("MachineSet/{NS}/a");
    let c = format!("MachineSet/{NS}/c");

    assert_eq!(mgr.group_for_node("aws:///a-0").await.unwrap().unwrap().id(), a);

    // Hand machine a-0 over to set c.
    let moved: Machine = serde_json::from_value(machine("a-0", "c", "c", "3-new", "aws:///a-0")).unwrap();
    feeder.apply(WatchEvent::Applied(Resource::Machine(moved))).unwrap();

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(mgr.group_for_node("aws:///a-0").await.unwrap().unwrap().id(), a);
    tokio::time::advance(Duration::from_secs(20)).await;
    assert_eq!(mgr.group_for_node("aws:///a-0").await.unwrap().unwrap().id(), a);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(mgr.group_for_node("aws:///a-0").await.unwrap().unwrap().id(), c);
}

#[tokio::test(start_paused = true)]
async fn machine_resolves_before_its_node_joins() {
    let (cache, mgr) = start(AutoscalerConfig::default()).await;
    let feeder = CacheFeeder::new(cache.clone());

    let fresh: Machine = serde_json::from_value(machine("a-3", "a", "a", "1", "aws:///a-3")).unwrap();
    feeder.apply(WatchEvent::Applied(Resource::Machine(fresh))).unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;

    let owner = mgr.group_for_node("aws:///a-3").await.unwrap().unwrap();
    assert_eq!(owner.id(), format!("MachineSet/{NS}/a"));
}
