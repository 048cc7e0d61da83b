//! Mastership Scenario Tests
//!
//! End-to-end role transitions on a single resource:
//! - First claim, standby registration, failover, administrative override
//! - Failover without candidates
//! - Pool exclusivity and term monotonicity across long operation sequences

use std::sync::Arc;

use mastership::config::CoordinatorConfig;
use mastership::mastership::{
    AlwaysAvailable, DeviceId, InMemoryRoleStore, MastershipCoordinator, MastershipEventType,
    NodeId, Operation, Pool, Role, RoleStore, StaticLiveness,
};

fn node(id: &str) -> NodeId {
    NodeId::from(id)
}

fn dev(id: &str) -> DeviceId {
    DeviceId::from(id)
}

fn cluster() -> (
    Arc<InMemoryRoleStore<DeviceId>>,
    MastershipCoordinator<DeviceId>,
) {
    let store = Arc::new(InMemoryRoleStore::new());
    let coordinator = MastershipCoordinator::new(
        &CoordinatorConfig::new("a"),
        store.clone(),
        Arc::new(AlwaysAvailable),
    );
    (store, coordinator)
}

/// At most one of {master, standby, unusable} per node.
fn assert_exclusive(store: &InMemoryRoleStore<DeviceId>, resource: &DeviceId, nodes: &[&str]) {
    for id in nodes {
        let n = node(id);
        let placements = [
            store.get_master(resource).as_ref() == Some(&n),
            store.pool_contains(Pool::Standby, resource, &n),
            store.pool_contains(Pool::Unusable, resource, &n),
        ];
        let count = placements.iter().filter(|p| **p).count();
        assert!(count <= 1, "node {} placed {} times on {}", id, count, resource);
    }
}

// =============================================================================
// Failover Walkthrough
// =============================================================================

/// Claim, register standby, fail over, override, then lose every candidate.
#[test]
fn test_full_failover_walkthrough() {
    let (store, a) = cluster();
    let d = dev("dev1");

    // Unclaimed resource is claimed at term 0.
    assert_eq!(a.request_role(&d).unwrap(), Role::Master);
    assert_eq!(store.get_term(&d), Some(0));
    assert_eq!(a.get_master(&d), Some(node("a")));

    // B registers as standby.
    assert!(a.set_standby(&node("b"), &d).unwrap().is_none());
    assert_eq!(a.get_role(&node("b"), &d), Role::Standby);

    // A relinquishes; B wins the re-election.
    let event = a.relinquish_role(&node("a"), &d).unwrap().unwrap();
    assert_eq!(event.event_type, MastershipEventType::MasterChanged);
    assert_eq!(event.resource, d);
    assert_eq!(event.new_master, Some(node("b")));
    assert_eq!(store.get_term(&d), Some(1));
    assert_eq!(a.get_master(&d), Some(node("b")));
    assert!(store.pool_contains(Pool::Unusable, &d, &node("a")));
    assert_eq!(a.get_role(&node("a"), &d), Role::None);

    // C overrides; B is demoted to standby.
    let event = a.set_master(&node("c"), &d).unwrap().unwrap();
    assert_eq!(event.new_master, Some(node("c")));
    assert_eq!(store.get_term(&d), Some(2));
    assert_eq!(a.get_role(&node("b"), &d), Role::Standby);
    assert_eq!(a.get_role(&node("c"), &d), Role::Master);

    // Empty the standby pool, then C relinquishes.
    a.relinquish_role(&node("b"), &d).unwrap();
    assert!(a.relinquish_role(&node("c"), &d).unwrap().is_none());
    assert_eq!(a.get_master(&d), None);
    for id in ["a", "b", "c"] {
        assert_eq!(a.get_role(&node(id), &d), Role::None);
    }
    // A masterless resource keeps its last term.
    assert_eq!(store.get_term(&d), Some(2));

    assert_exclusive(&store, &d, &["a", "b", "c"]);
}

// =============================================================================
// Properties
// =============================================================================

/// requestRole on a masterless resource grants MASTER and bumps the term once.
#[test]
fn test_request_role_on_masterless_resource() {
    let (store, a) = cluster();
    let d = dev("dev1");

    a.set_master(&node("x"), &d).unwrap();
    a.relinquish_role(&node("x"), &d).unwrap();
    assert_eq!(a.get_master(&d), None);
    let before = store.get_term(&d).unwrap();

    assert_eq!(a.request_role(&d).unwrap(), Role::Master);
    assert_eq!(store.get_term(&d), Some(before + 1));
}

/// Second identical setMaster emits nothing and leaves the term alone.
#[test]
fn test_set_master_idempotent() {
    let (store, a) = cluster();
    let d = dev("dev1");

    assert!(a.set_master(&node("b"), &d).unwrap().is_some());
    let term = store.get_term(&d);
    assert!(a.set_master(&node("b"), &d).unwrap().is_none());
    assert_eq!(store.get_term(&d), term);
}

/// Re-election draws a different node from the standby pool, oldest first.
#[test]
fn test_reelection_picks_longest_waiting_standby() {
    let (_store, a) = cluster();
    let d = dev("dev1");

    a.request_role(&d).unwrap();
    a.set_standby(&node("z"), &d).unwrap();
    a.set_standby(&node("m"), &d).unwrap();

    let event = a.relinquish_role(&node("a"), &d).unwrap().unwrap();
    assert_eq!(event.new_master, Some(node("z")));
    assert_eq!(a.get_nodes(&d).standbys, vec![node("m")]);
}

/// Re-election never selects the outgoing master.
#[test]
fn test_reelection_skips_outgoing_master_in_pool() {
    let (store, a) = cluster();
    let d = dev("dev1");

    a.request_role(&d).unwrap();
    // Corrupted state: the master also sits in the standby pool.
    store.pool_add(Pool::Standby, &d, &node("a")).unwrap();
    a.set_standby(&node("b"), &d).unwrap();

    let event = a.relinquish_role(&node("a"), &d).unwrap().unwrap();
    assert_eq!(event.new_master, Some(node("b")));
    assert_exclusive(&store, &d, &["a", "b"]);
}

/// Re-election fails when the resource is unreachable.
#[test]
fn test_reelection_respects_liveness() {
    let store = Arc::new(InMemoryRoleStore::new());
    let liveness = Arc::new(StaticLiveness::new());
    let a = MastershipCoordinator::new(
        &CoordinatorConfig::new("a"),
        store.clone(),
        liveness.clone(),
    );
    let d = dev("dev1");

    a.request_role(&d).unwrap();
    a.set_standby(&node("b"), &d).unwrap();
    liveness.mark_unavailable(d.clone());

    assert!(a.set_standby(&node("a"), &d).unwrap().is_none());
    assert_eq!(a.get_master(&d), None);
    assert_eq!(store.get_term(&d), Some(0));

    // Once reachable again, the next claim wins.
    liveness.mark_available(&d);
    assert_eq!(
        a.execute(&node("b"), &d, Operation::RequestRole, None)
            .unwrap()
            .role,
        Role::Standby
    );
    assert!(a.set_master(&node("b"), &d).unwrap().is_some());
    assert_eq!(store.get_term(&d), Some(1));
}

/// Long mixed sequence keeps pools exclusive and terms strictly increasing.
#[test]
fn test_mixed_sequence_invariants() {
    let (store, a) = cluster();
    let d = dev("dev1");
    let nodes = ["a", "b", "c", "d"];
    let ops = [
        Operation::SetStandby,
        Operation::RequestRole,
        Operation::SetMaster,
        Operation::RelinquishRole,
    ];

    let mut last_term = None;
    let mut last_master = None;

    for step in 0..200usize {
        let n = node(nodes[(step * 7 + step / 3) % nodes.len()]);
        let op = ops[(step * 5 + step / 4) % ops.len()];
        a.execute(&n, &d, op, None).unwrap();

        let term = store.get_term(&d);
        let master = store.get_master(&d);
        if master.is_some() && master != last_master {
            assert!(term > last_term, "term did not grow at step {}", step);
        } else {
            assert!(term >= last_term, "term shrank at step {}", step);
        }
        if master.is_some() {
            last_master = master;
        }
        last_term = term;

        assert_exclusive(&store, &d, &nodes);
    }
}

// =============================================================================
// Multiple Resources
// =============================================================================

/// Each resource keeps its own master and term.
#[test]
fn test_resources_are_independent() {
    let (_store, a) = cluster();

    a.request_role(&dev("dev1")).unwrap();
    a.set_master(&node("b"), &dev("dev2")).unwrap();
    a.set_master(&node("c"), &dev("dev2")).unwrap();

    assert_eq!(a.get_term_for(&dev("dev1")).unwrap().term, 0);
    assert_eq!(a.get_term_for(&dev("dev2")).unwrap().term, 1);
    assert_eq!(
        a.get_resources_mastered(&node("a")).into_iter().collect::<Vec<_>>(),
        vec![dev("dev1")]
    );
    assert_eq!(a.resources().len(), 2);
}
