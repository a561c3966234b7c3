use super::FlowGraph;
use crate::jvm::code::BlockId;
use std::collections::BTreeMap;

/// Dominator tree of a flow graph
///
/// Computed with the iterative algorithm from Cooper, Harvey, and Kennedy ("A Simple, Fast
/// Dominance Algorithm"), over normal and exceptional edges.
#[derive(Debug, Clone)]
pub struct Dominators {
    entry: BlockId,
    idom: BTreeMap<BlockId, BlockId>,
    rpo_index: BTreeMap<BlockId, usize>,
}

impl Dominators {
    pub fn compute(graph: &FlowGraph) -> Dominators {
        let order = graph.reverse_postorder();
        let rpo_index: BTreeMap<BlockId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let predecessors = graph.predecessors();

        let mut idom: BTreeMap<BlockId, BlockId> = BTreeMap::new();
        idom.insert(graph.entry, graph.entry);

        let mut changed = true;
        while changed {
            changed = false;
            for node in order.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for pred in &predecessors[node] {
                    if !idom.contains_key(pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => *pred,
                        Some(current) => intersect(&idom, &rpo_index, *pred, current),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(node) != Some(&new_idom) {
                        idom.insert(*node, new_idom);
                        changed = true;
                    }
                }
            }
        }

        Dominators {
            entry: graph.entry,
            idom,
            rpo_index,
        }
    }

    /// Immediate dominator (`None` for the entry and for unreachable nodes)
    pub fn immediate(&self, node: BlockId) -> Option<BlockId> {
        if node == self.entry {
            None
        } else {
            self.idom.get(&node).copied()
        }
    }

    /// Does `a` dominate `b`? (Every node dominates itself.)
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.idom.contains_key(&b) {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.immediate(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Position in reverse postorder
    pub fn rpo_index(&self, node: BlockId) -> Option<usize> {
        self.rpo_index.get(&node).copied()
    }
}

fn intersect(
    idom: &BTreeMap<BlockId, BlockId>,
    rpo_index: &BTreeMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flow::{Exit, FlowNode, StructuredBlock};

    #[test]
    fn diamond_with_loop() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let mut graph = FlowGraph::new(BlockId(0));
        graph.nodes.insert(
            BlockId(0),
            FlowNode::new(StructuredBlock::Empty, Exit::Jump(BlockId(1))),
        );
        graph.nodes.insert(
            BlockId(1),
            FlowNode::new(StructuredBlock::Empty, Exit::Jump(BlockId(2))),
        );
        graph.nodes.insert(
            BlockId(2),
            FlowNode::new(
                StructuredBlock::Jump(BlockId(1)),
                Exit::Jump(BlockId(3)),
            ),
        );
        graph.nodes.insert(
            BlockId(3),
            FlowNode::new(StructuredBlock::Return(None), Exit::None),
        );

        let doms = Dominators::compute(&graph);
        assert_eq!(doms.immediate(BlockId(2)), Some(BlockId(1)));
        assert_eq!(doms.immediate(BlockId(3)), Some(BlockId(2)));
        assert!(doms.dominates(BlockId(1), BlockId(3)));
        assert!(!doms.dominates(BlockId(2), BlockId(1)), "back edge source");
        assert_eq!(doms.immediate(BlockId(0)), None);
    }
}
