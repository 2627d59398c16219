use super::cfg::ControlFlowGraph;
use crate::block::BlockId;
use crate::function::Function;
use indexmap::{IndexMap, IndexSet};

/// For every block `b`, the set of blocks transitively reachable from `b`
/// through successor edges, excluding `b` itself.
///
/// A predecessor of `b` that appears in this set would close a cycle, so the
/// range engine skips it when merging environments. Ignoring such an input
/// only delays convergence or costs precision; it never admits values the
/// program cannot produce, and it makes the fixed point terminate without
/// widening.
#[derive(Debug, Clone, Default)]
pub struct BackedgeAnalysis {
    reach: IndexMap<BlockId, IndexSet<BlockId>>,
}

impl BackedgeAnalysis {
    pub fn from_function(function: &Function) -> Self {
        let cfg = ControlFlowGraph::from_function(function);
        let mut reach = IndexMap::new();

        for block_id in function.body.blocks.keys() {
            let mut seen: IndexSet<BlockId> = IndexSet::new();
            let mut stack = vec![*block_id];
            while let Some(current) = stack.pop() {
                for &succ in cfg.successors(current) {
                    if succ != *block_id && seen.insert(succ) {
                        stack.push(succ);
                    }
                }
            }
            reach.insert(*block_id, seen);
        }

        Self { reach }
    }

    /// True when taking `pred -> block` would re-enter a cycle through
    /// `block`.
    pub fn is_cyclic_pred(&self, block: BlockId, pred: BlockId) -> bool {
        self.reach
            .get(&block)
            .map(|set| set.contains(&pred))
            .unwrap_or(false)
    }

    pub fn reachable_from(&self, block: BlockId) -> Option<&IndexSet<BlockId>> {
        self.reach.get(&block)
    }
}
