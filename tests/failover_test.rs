//! Failover selection tests driven through the registry, pool, and the
//! engine-side failure policy.

use std::time::Duration;

use proxy_pool::engine::FailurePolicy;
use proxy_pool::pool::{Pool, PoolMode};
use proxy_pool::registry::NodeRegistry;

mod common;

fn policy(threshold: u32, blacklist: Duration) -> FailurePolicy {
    FailurePolicy {
        failure_threshold: threshold,
        blacklist_duration: blacklist,
    }
}

#[test]
fn three_failures_blacklist_a_node_out_of_sequential_rotation() {
    let registry = NodeRegistry::new();
    let a = registry.register(common::node("a"));
    let b = registry.register(common::node("b"));
    let c = registry.register(common::node("c"));
    let pool = Pool::new(vec![a.clone(), b, c], PoolMode::Sequential);

    let policy = policy(3, Duration::from_secs(60));
    for _ in 0..3 {
        policy.report_failure(&a, "connection refused");
    }

    for _ in 0..100 {
        let picked = pool.select().expect("b and c stay usable");
        assert_ne!(picked.tag(), "a");
    }

    let snap = registry.snapshot();
    let a_snap = snap.iter().find(|s| s.info.tag == "a").unwrap();
    assert!(a_snap.blacklisted);
    assert_eq!(a_snap.failure_count, 3);
    assert_eq!(a_snap.last_error.as_deref(), Some("connection refused"));
}

#[test]
fn blacklisted_node_rejoins_rotation_after_the_window() {
    let registry = NodeRegistry::new();
    let a = registry.register(common::node("a"));
    let b = registry.register(common::node("b"));
    let pool = Pool::new(vec![a.clone(), b], PoolMode::Sequential);

    let policy = policy(2, Duration::from_millis(80));
    policy.report_failure(&a, "timeout");
    policy.report_failure(&a, "timeout");

    for _ in 0..20 {
        assert_eq!(pool.select().unwrap().tag(), "b");
    }

    std::thread::sleep(Duration::from_millis(120));

    let mut saw_a = false;
    for _ in 0..10 {
        if pool.select().unwrap().tag() == "a" {
            saw_a = true;
        }
    }
    assert!(saw_a, "node must be eligible once the window elapses");
}

#[test]
fn success_does_not_lift_a_blacklist_but_release_does() {
    let registry = NodeRegistry::new();
    let a = registry.register(common::node("a"));
    let pool = Pool::new(vec![a.clone()], PoolMode::Sequential);

    let policy = policy(1, Duration::from_secs(60));
    policy.report_failure(&a, "refused");
    policy.report_success(&a);
    assert!(pool.select().is_err(), "success alone must not clear it");

    a.clear_blacklist();
    assert_eq!(pool.select().unwrap().tag(), "a");
}

#[test]
fn random_mode_avoids_blacklisted_nodes() {
    let registry = NodeRegistry::new();
    let a = registry.register(common::node("a"));
    let b = registry.register(common::node("b"));
    let c = registry.register(common::node("c"));
    let pool = Pool::new(vec![a, b.clone(), c], PoolMode::Random);

    let policy = policy(1, Duration::from_secs(60));
    for handle in [&pool.nodes()[0], &pool.nodes()[2]] {
        policy.report_failure(handle, "refused");
    }

    for _ in 0..50 {
        assert_eq!(pool.select().unwrap().tag(), "b");
    }
}

#[test]
fn pool_exhausted_when_every_node_is_blacklisted() {
    let registry = NodeRegistry::new();
    let a = registry.register(common::node("a"));
    let b = registry.register(common::node("b"));
    let pool = Pool::new(vec![a.clone(), b.clone()], PoolMode::Sequential);

    let policy = policy(1, Duration::from_secs(60));
    policy.report_failure(&a, "refused");
    policy.report_failure(&b, "refused");

    assert!(pool.select().is_err());
}
