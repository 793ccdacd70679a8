//! Random selection strategy.

use crate::pool::Selector;
use crate::registry::NodeHandle;

/// Draws uniformly among the usable entries.
#[derive(Debug, Default)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for Random {
    fn next_node(&self, nodes: &[NodeHandle]) -> Option<NodeHandle> {
        let usable: Vec<&NodeHandle> = nodes.iter().filter(|n| n.is_usable()).collect();
        if usable.is_empty() {
            return None;
        }
        Some(usable[fastrand::usize(..usable.len())].clone())
    }
}
