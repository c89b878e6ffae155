//! Integration tests for region routing
//!
//! Drives a router over an in-process cluster: local execution, member
//! selection, primary resolution and relay of remote failures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ream_region::p2p::{CallOptions, Invocable, LoopbackCluster, MemberSpec, RegionNode};
use ream_region::{Fault, MemberId, Region, RegionConfig, RpcError, Target, Value};
use serde_json::json;

/// Register `demo:whoami/0` on a member, answering with its node name
fn add_named(cluster: &LoopbackCluster, name: &str, region: &str) -> MemberId {
    let id = cluster.add_member(name, region);
    let label = name.to_string();
    cluster
        .operations(&id)
        .unwrap()
        .register("demo", "whoami", 0, move |_| Ok(json!(label)));
    id
}

async fn start_node(
    cluster: &LoopbackCluster,
    region: &str,
    primary: &str,
) -> (MemberId, RegionNode) {
    let local = cluster.add(MemberSpec::new("local").region(region));
    let operations = cluster.operations(&local).unwrap();
    operations.register("demo", "whoami", 0, |_| Ok(json!("local")));

    let config = RegionConfig::new(region, primary).with_verbose(true);
    let node = RegionNode::start(cluster.transport(&local), config, operations);
    node.ready().await;
    (local, node)
}

fn whoami() -> Invocable {
    Invocable::named("demo", "whoami", vec![])
}

fn total_calls(cluster: &LoopbackCluster, members: &[&MemberId]) -> usize {
    members.iter().map(|m| cluster.calls_received(m)).sum()
}

#[tokio::test]
async fn test_own_region_runs_locally() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;

    let before = cluster.calls_received(&hkg);
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);

    // No member of "ams" is registered, so any lookup would fail the call
    assert!(node.registry().lookup(&Region::new("ams")).is_empty());
    let reply = node
        .router()
        .route_to_region(
            "ams",
            Invocable::closure(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(json!("done"))
            }),
            CallOptions::default(),
        )
        .await;

    assert_eq!(reply, Ok(Ok(json!("done"))));
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(cluster.calls_received(&hkg), before);

    node.stop().await;
}

#[tokio::test]
async fn test_own_region_named_operation_uses_local_table() {
    let cluster = LoopbackCluster::new();
    let (_local, node) = start_node(&cluster, "ams", "ams").await;

    let reply = node.router().route_to_primary(whoami(), CallOptions::default()).await;
    assert_eq!(reply, Ok(Ok(json!("local"))));
    assert!(node.router().is_own_region_primary());

    node.stop().await;
}

#[tokio::test]
async fn test_empty_region_fails_without_remote_call() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;

    let before = cluster.calls_received(&hkg);
    let reply = node
        .router()
        .route_to_region("sin", whoami(), CallOptions::default())
        .await;

    assert_eq!(
        reply,
        Err(Fault::NoNodeAvailable {
            region: Region::new("sin")
        })
    );
    assert_eq!(cluster.calls_received(&hkg), before);

    node.stop().await;
}

#[tokio::test]
async fn test_primary_resolves_to_configured_region() {
    let cluster = LoopbackCluster::new();
    add_named(&cluster, "hkg-1", "hkg");
    add_named(&cluster, "sin-1", "sin");
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;
    let router = node.router();

    assert!(!router.is_own_region_primary());
    assert_eq!(router.resolve(&Target::Primary), Region::new("hkg"));
    assert_eq!(router.resolve(&Target::from("primary")), Region::new("hkg"));

    let via_sentinel = router.route_to_primary(whoami(), CallOptions::default()).await;
    let via_label = router.route_to_region("hkg", whoami(), CallOptions::default()).await;
    assert_eq!(via_sentinel, Ok(Ok(json!("hkg-1"))));
    assert_eq!(via_sentinel, via_label);

    node.stop().await;
}

#[tokio::test]
async fn test_members_are_picked_at_random() {
    let cluster = LoopbackCluster::new();
    for i in 1..=3 {
        add_named(&cluster, &format!("hkg-{}", i), "hkg");
    }
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;
    assert_eq!(node.router().lookup_members(&Region::new("hkg")).len(), 3);

    let mut seen = HashSet::new();
    for _ in 0..60 {
        match node.router().route_to_region("hkg", whoami(), CallOptions::default()).await {
            Ok(Ok(Value::String(name))) => {
                seen.insert(name);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }
    assert_eq!(seen.len(), 3);

    node.stop().await;
}

#[tokio::test]
async fn test_slow_member_times_out() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;

    cluster.set_latency(&hkg, Duration::from_millis(500));
    let reply = node
        .router()
        .route_to_region(
            "hkg",
            whoami(),
            CallOptions::with_timeout(Duration::from_millis(30)),
        )
        .await;

    match reply {
        Err(fault) => {
            assert!(fault.is_timeout());
            assert_eq!(
                fault,
                Fault::Timeout {
                    member: hkg,
                    timeout: Duration::from_millis(30)
                }
            );
        }
        Ok(other) => panic!("expected a timeout, got {:?}", other),
    }

    node.stop().await;
}

#[tokio::test]
async fn test_configured_timeout_applies_without_override() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let local = cluster.add(MemberSpec::new("local").region("ams"));
    let config = RegionConfig::new("ams", "hkg").with_call_timeout(Duration::from_millis(30));
    let operations = cluster.operations(&local).unwrap();
    let node = RegionNode::start(cluster.transport(&local), config, operations);
    node.ready().await;

    cluster.set_latency(&hkg, Duration::from_millis(500));
    let reply = node.router().route_to_primary(whoami(), CallOptions::default()).await;
    assert!(matches!(reply, Err(Fault::Timeout { .. })));

    node.stop().await;
}

#[tokio::test]
async fn test_timed_out_work_never_runs() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;
    cluster.set_latency(&hkg, Duration::from_millis(200));

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..20 {
        let counter = Arc::clone(&ran);
        let reply = node
            .router()
            .route_to_primary(
                Invocable::closure(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }),
                CallOptions::with_timeout(Duration::from_millis(20)),
            )
            .await;
        assert!(matches!(reply, Err(Fault::Timeout { .. })));
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    node.stop().await;
}

#[tokio::test]
async fn test_remote_throw_and_error_are_reproduced() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let operations = cluster.operations(&hkg).unwrap();
    operations.register("demo", "reject", 1, |args| Err(Fault::Throw(args[0].clone())));
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;
    let router = node.router();

    let thrown = router
        .route_to_primary(
            Invocable::named("demo", "reject", vec![json!({ "code": 42 })]),
            CallOptions::default(),
        )
        .await;
    assert_eq!(thrown, Err(Fault::Throw(json!({ "code": 42 }))));

    let undefined = router
        .route_to_primary(Invocable::named("demo", "missing", vec![]), CallOptions::default())
        .await;
    assert_eq!(undefined, Err(Fault::Error(json!({ "undef": "demo:missing/0" }))));

    let exited = router
        .route_to_primary(
            Invocable::closure(|| Err(Fault::Exit(json!("shutdown")))),
            CallOptions::default(),
        )
        .await;
    assert_eq!(exited, Err(Fault::Exit(json!("shutdown"))));

    node.stop().await;
}

#[tokio::test]
async fn test_remote_panic_is_an_exit() {
    let cluster = LoopbackCluster::new();
    add_named(&cluster, "hkg-1", "hkg");
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;

    let reply = node
        .router()
        .route_to_primary(Invocable::closure(|| panic!("disk on fire")), CallOptions::default())
        .await;
    assert_eq!(reply, Err(Fault::Exit(json!({ "panic": "disk on fire" }))));

    node.stop().await;
}

#[tokio::test]
async fn test_unreachable_member_returns_rpc_error() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;

    // Still registered: no leave was delivered
    cluster.set_reachable(&hkg, false);
    let reply = node.router().route_to_primary(whoami(), CallOptions::default()).await;
    assert_eq!(reply, Ok(Err(RpcError::NoConnection(hkg.clone()))));
    assert!(node.registry().contains(&Region::new("hkg"), &hkg));

    node.stop().await;
}

#[tokio::test]
async fn test_departed_member_is_no_longer_routed_to() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let (_local, node) = start_node(&cluster, "ams", "hkg").await;

    cluster.remove(&hkg);
    // Barrier: the monitor has handled the leave once this returns
    let tracked = node.monitor().tracked().await;
    assert!(!tracked.contains_key(&hkg));

    let reply = node.router().route_to_primary(whoami(), CallOptions::default()).await;
    assert_eq!(
        reply,
        Err(Fault::NoNodeAvailable {
            region: Region::new("hkg")
        })
    );

    node.stop().await;
}

#[tokio::test]
async fn test_call_results_relay_across_calls() {
    let cluster = LoopbackCluster::new();
    let hkg = add_named(&cluster, "hkg-1", "hkg");
    let (local, node) = start_node(&cluster, "ams", "hkg").await;

    let before = total_calls(&cluster, &[&hkg, &local]);
    for i in 0..5 {
        let reply = node
            .router()
            .route_to_primary(Invocable::closure(move || Ok(json!(i * 2))), CallOptions::default())
            .await;
        assert_eq!(reply, Ok(Ok(json!(i * 2))));
    }
    assert_eq!(total_calls(&cluster, &[&hkg, &local]), before + 5);
    assert_eq!(cluster.calls_received(&local), 0);

    node.stop().await;
}
