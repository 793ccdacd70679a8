//! Sequential selection strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::pool::Selector;
use crate::registry::NodeHandle;

/// Advances a cursor through the pool, skipping unusable entries and
/// wrapping at the end.
#[derive(Debug, Default)]
pub struct Sequential {
    cursor: AtomicUsize,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for Sequential {
    fn next_node(&self, nodes: &[NodeHandle]) -> Option<NodeHandle> {
        if nodes.is_empty() {
            return None;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let len = nodes.len();

        for i in 0..len {
            let node = &nodes[(start + i) % len];
            if node.is_usable() {
                return Some(node.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Pool, PoolMode};
    use crate::registry::{NodeInfo, NodeMode};
    use std::time::{Duration, Instant};

    fn handle(tag: &str) -> NodeHandle {
        NodeHandle::detached(NodeInfo {
            tag: tag.into(),
            name: tag.to_uppercase(),
            uri: format!("test://{tag}"),
            mode: NodeMode::Pool,
            listen_address: None,
            port: None,
        })
    }

    #[test]
    fn rotates_through_pool_in_order() {
        let selector = Sequential::new();
        let nodes = vec![handle("a"), handle("b"), handle("c")];

        let tags: Vec<String> = (0..4)
            .map(|_| selector.next_node(&nodes).unwrap().tag())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn blacklisted_node_is_never_selected_inside_its_window() {
        let a = handle("a");
        let nodes = vec![a.clone(), handle("b"), handle("c")];
        let pool = Pool::new(nodes, PoolMode::Sequential);

        a.record_failure("refused");
        a.record_failure("refused");
        a.record_failure("refused");
        a.blacklist(Instant::now() + Duration::from_secs(60));

        for _ in 0..100 {
            let picked = pool.select().expect("two nodes remain usable");
            assert_ne!(picked.tag(), "a");
        }
    }

    #[test]
    fn node_becomes_eligible_once_window_elapses() {
        let a = handle("a");
        let nodes = vec![a.clone(), handle("b")];
        let selector = Sequential::new();

        a.blacklist(Instant::now() + Duration::from_millis(30));
        assert_eq!(selector.next_node(&nodes).unwrap().tag(), "b");

        std::thread::sleep(Duration::from_millis(50));
        let tags: Vec<String> = (0..2)
            .map(|_| selector.next_node(&nodes).unwrap().tag())
            .collect();
        assert!(tags.contains(&"a".to_string()));
    }

    #[test]
    fn empty_or_fully_blacklisted_pool_is_exhausted() {
        let pool = Pool::new(Vec::new(), PoolMode::Sequential);
        assert!(pool.select().is_err());

        let a = handle("a");
        a.blacklist(Instant::now() + Duration::from_secs(60));
        let pool = Pool::new(vec![a], PoolMode::Sequential);
        assert!(pool.select().is_err());
    }
}
