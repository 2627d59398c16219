use crate::block::BlockId;
use crate::function::Function;
use indexmap::IndexMap;

/// Successor and predecessor maps in block program order, so every walk
/// over the graph is deterministic.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub edges: IndexMap<BlockId, Vec<BlockId>>,
    pub reverse_edges: IndexMap<BlockId, Vec<BlockId>>,
    pub entry: BlockId,
}

impl ControlFlowGraph {
    pub fn from_function(function: &Function) -> Self {
        let mut edges = IndexMap::new();
        let mut reverse_edges: IndexMap<BlockId, Vec<BlockId>> = IndexMap::new();

        for (block_id, block) in &function.body.blocks {
            let successors = block.terminator.successors();
            edges.insert(*block_id, successors.clone());

            for succ in successors {
                reverse_edges.entry(succ).or_default().push(*block_id);
            }
        }

        Self {
            edges,
            reverse_edges,
            entry: function.body.entry_block,
        }
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.reverse_edges
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.edges.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Terminator;
    use crate::function::{Function, FunctionSignature};
    use crate::values::{Constant, Value};

    #[test]
    fn test_cfg_edges() {
        let mut func = Function::new(FunctionSignature::new("f"));
        let entry = func.entry_block();
        let then_b = func.body.create_block();
        let else_b = func.body.create_block();
        let merge = func.body.create_block();

        func.body
            .get_block_mut(entry)
            .unwrap()
            .set_terminator(Terminator::Branch {
                condition: Value::Constant(Constant::Bool(true)),
                then_block: then_b,
                else_block: else_b,
            });
        func.body
            .get_block_mut(then_b)
            .unwrap()
            .set_terminator(Terminator::Jump(merge));
        func.body
            .get_block_mut(else_b)
            .unwrap()
            .set_terminator(Terminator::Jump(merge));
        func.body
            .get_block_mut(merge)
            .unwrap()
            .set_terminator(Terminator::Return(None));

        let cfg = ControlFlowGraph::from_function(&func);
        assert_eq!(cfg.successors(entry), &[then_b, else_b]);
        assert_eq!(cfg.predecessors(merge), &[then_b, else_b]);
        assert!(cfg.predecessors(entry).is_empty());
        assert!(cfg.successors(merge).is_empty());
    }
}
