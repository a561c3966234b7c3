use super::StructuredBlock;
use crate::expr::{ExprArena, ExprId};
use crate::jvm::code::BlockId;
use crate::jvm::BinaryName;
use std::collections::{BTreeMap, BTreeSet};

/// How control leaves a flow node (after its block completes normally)
#[derive(Clone, Debug, PartialEq)]
pub enum Exit {
    /// The block never completes normally (it returns, throws, or only ends in raw jumps)
    None,

    Jump(BlockId),

    Branch {
        condition: ExprId,
        then: BlockId,
        otherwise: BlockId,
    },

    Switch {
        selector: ExprId,
        cases: Vec<(i32, BlockId)>,
        default: BlockId,
    },
}

impl Exit {
    /// Distinct targets, in the order they appear
    pub fn targets(&self) -> Vec<BlockId> {
        let mut targets = vec![];
        let mut push = |target: BlockId| {
            if !targets.contains(&target) {
                targets.push(target);
            }
        };
        match self {
            Exit::None => (),
            Exit::Jump(target) => push(*target),
            Exit::Branch {
                then, otherwise, ..
            } => {
                push(*then);
                push(*otherwise);
            }
            Exit::Switch { cases, default, .. } => {
                cases.iter().for_each(|(_, target)| push(*target));
                push(*default);
            }
        }
        targets
    }

    /// Expression evaluated to pick the target
    pub fn expression(&self) -> Option<ExprId> {
        match self {
            Exit::Branch { condition, .. } => Some(*condition),
            Exit::Switch { selector, .. } => Some(*selector),
            Exit::None | Exit::Jump(_) => None,
        }
    }

    /// Redirect every edge to `from` so that it goes to `to`
    pub fn retarget(&mut self, from: BlockId, to: BlockId) {
        let fix = |target: &mut BlockId| {
            if *target == from {
                *target = to;
            }
        };
        match self {
            Exit::None => (),
            Exit::Jump(target) => fix(target),
            Exit::Branch {
                then, otherwise, ..
            } => {
                fix(then);
                fix(otherwise);
            }
            Exit::Switch { cases, default, .. } => {
                cases.iter_mut().for_each(|(_, target)| fix(target));
                fix(default);
            }
        }
    }
}

/// Node of the flow graph: a structured block and the way control leaves it
#[derive(Clone, Debug)]
pub struct FlowNode {
    pub block: StructuredBlock,
    pub exit: Exit,

    /// Targets of the [`StructuredBlock::Jump`]s inside `block`
    pub raw_jumps: BTreeSet<BlockId>,
}

impl FlowNode {
    pub fn new(block: StructuredBlock, exit: Exit) -> FlowNode {
        let raw_jumps = block.jump_targets().into_iter().collect();
        FlowNode {
            block,
            exit,
            raw_jumps,
        }
    }

    /// Normal successors (exit targets and raw jumps)
    pub fn successors(&self) -> BTreeSet<BlockId> {
        let mut successors = self.raw_jumps.clone();
        successors.extend(self.exit.targets());
        successors
    }
}

/// Exception handler, with the nodes it protects
#[derive(Clone, Debug)]
pub struct HandlerRegion {
    pub protected: BTreeSet<BlockId>,
    pub handler: BlockId,
    pub catch_type: Option<BinaryName>,
}

/// Control flow graph of structured blocks
///
/// Structuring repeatedly collapses groups of nodes into one until a single node is left. Node
/// ids are the ids of the bytecode blocks they started as, so id order is layout order.
#[derive(Clone, Debug)]
pub struct FlowGraph {
    pub entry: BlockId,
    pub nodes: BTreeMap<BlockId, FlowNode>,

    /// Exception handlers, innermost first
    pub regions: Vec<HandlerRegion>,
}

impl FlowGraph {
    pub fn new(entry: BlockId) -> FlowGraph {
        FlowGraph {
            entry,
            nodes: BTreeMap::new(),
            regions: vec![],
        }
    }

    /// Indices of the regions protecting a node
    pub fn regions_of(&self, node: BlockId) -> BTreeSet<usize> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.protected.contains(&node))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_handler(&self, node: BlockId) -> bool {
        self.regions.iter().any(|region| region.handler == node)
    }

    /// Normal and exceptional successors of a node
    pub fn successors(&self, node: BlockId) -> BTreeSet<BlockId> {
        let mut successors = self
            .nodes
            .get(&node)
            .map_or_else(BTreeSet::new, FlowNode::successors);
        successors.extend(
            self.regions
                .iter()
                .filter(|region| region.protected.contains(&node))
                .map(|region| region.handler),
        );
        successors
    }

    /// Predecessors of every node (every node has an entry, possibly empty)
    pub fn predecessors(&self) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
        let mut predecessors: BTreeMap<BlockId, BTreeSet<BlockId>> =
            self.nodes.keys().map(|id| (*id, BTreeSet::new())).collect();
        for id in self.nodes.keys() {
            for successor in self.successors(*id) {
                if let Some(preds) = predecessors.get_mut(&successor) {
                    preds.insert(*id);
                }
            }
        }
        predecessors
    }

    /// Nodes in depth-first postorder from the entry (successors visited in id order)
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut order = vec![];
        let mut visited = BTreeSet::new();
        let mut stack: Vec<(BlockId, Vec<BlockId>)> = vec![];
        if self.nodes.contains_key(&self.entry) {
            visited.insert(self.entry);
            let successors = self.successors(self.entry).into_iter().rev().collect();
            stack.push((self.entry, successors));
        }
        while let Some((node, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(next) => {
                    if self.nodes.contains_key(&next) && visited.insert(next) {
                        let successors = self.successors(next).into_iter().rev().collect();
                        stack.push((next, successors));
                    }
                }
                None => {
                    order.push(*node);
                    stack.pop();
                }
            }
        }
        order
    }

    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    /// Remove nodes that can't be reached from the entry, returning their ids
    ///
    /// Expressions of removed nodes are detached, and regions left without a handler or without
    /// protected nodes are dropped.
    pub fn prune_unreachable(&mut self, arena: &mut ExprArena<'_>) -> Vec<BlockId> {
        let reachable: BTreeSet<BlockId> = self.postorder().into_iter().collect();
        let unreachable: Vec<BlockId> = self
            .nodes
            .keys()
            .filter(|id| !reachable.contains(id))
            .copied()
            .collect();
        for id in &unreachable {
            if let Some(node) = self.nodes.remove(id) {
                log::debug!("Pruning unreachable {:?}", id);
                for expr in node.block.expressions().into_iter().chain(node.exit.expression()) {
                    arena.detach(expr);
                }
            }
        }
        for region in &mut self.regions {
            region.protected.retain(|id| reachable.contains(id));
        }
        self.regions.retain(|region| {
            reachable.contains(&region.handler) && !region.protected.is_empty()
        });
        unreachable
    }

    /// Skip over nodes that do nothing but jump somewhere else
    pub fn thread_empty_jumps(&mut self) -> usize {
        let mut threaded = 0;
        loop {
            let candidate = self.nodes.iter().find_map(|(id, node)| match node.exit {
                Exit::Jump(target)
                    if node.block.is_empty()
                        && target != *id
                        && *id != self.entry
                        && !self.is_handler(*id) =>
                {
                    Some((*id, target))
                }
                _ => None,
            });
            let (skipped, target) = match candidate {
                Some(found) => found,
                None => return threaded,
            };

            log::trace!("Threading jumps through {:?} to {:?}", skipped, target);
            self.nodes.remove(&skipped);
            for node in self.nodes.values_mut() {
                node.exit.retarget(skipped, target);
                if node.raw_jumps.remove(&skipped) {
                    node.raw_jumps.insert(target);
                    node.block.replace_jumps(skipped, &StructuredBlock::Jump(target));
                }
            }
            for region in &mut self.regions {
                region.protected.remove(&skipped);
            }
            self.regions.retain(|region| !region.protected.is_empty());
            threaded += 1;
        }
    }

    /// Move `absorbed` out of the graph (its block and exit become the caller's to place)
    ///
    /// The node is also taken out of every protected set.
    pub fn take_node(&mut self, absorbed: BlockId) -> Option<FlowNode> {
        for region in &mut self.regions {
            region.protected.remove(&absorbed);
        }
        self.nodes.remove(&absorbed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::Operator;
    use crate::util::Offset;

    fn jump(target: u32) -> FlowNode {
        FlowNode::new(StructuredBlock::Empty, Exit::Jump(BlockId(target)))
    }

    #[test]
    fn orders_and_predecessors() {
        let mut arena = ExprArena::new();
        let condition = arena.leaf(Operator::Nop, Offset(0));
        let mut graph = FlowGraph::new(BlockId(0));
        graph.nodes.insert(
            BlockId(0),
            FlowNode::new(
                StructuredBlock::Empty,
                Exit::Branch {
                    condition,
                    then: BlockId(1),
                    otherwise: BlockId(2),
                },
            ),
        );
        graph.nodes.insert(BlockId(1), jump(2));
        graph.nodes.insert(
            BlockId(2),
            FlowNode::new(StructuredBlock::Return(None), Exit::None),
        );

        assert_eq!(
            graph.reverse_postorder(),
            vec![BlockId(0), BlockId(1), BlockId(2)]
        );
        let preds = graph.predecessors();
        assert_eq!(preds[&BlockId(2)].len(), 2);
        assert!(preds[&BlockId(0)].is_empty());
    }

    #[test]
    fn pruning_and_threading() {
        let mut arena = ExprArena::new();
        let dead = arena.leaf(Operator::Nop, Offset(9));
        let mut graph = FlowGraph::new(BlockId(0));
        graph.nodes.insert(BlockId(0), jump(1));
        graph.nodes.insert(BlockId(1), jump(3));
        graph.nodes.insert(
            BlockId(2),
            FlowNode::new(StructuredBlock::Instruction(dead), Exit::Jump(BlockId(3))),
        );
        graph.nodes.insert(
            BlockId(3),
            FlowNode::new(StructuredBlock::Return(None), Exit::None),
        );

        assert_eq!(graph.prune_unreachable(&mut arena), vec![BlockId(2)]);
        assert!(!arena.is_live(dead));

        assert_eq!(graph.thread_empty_jumps(), 1);
        assert_eq!(graph.nodes[&BlockId(0)].exit, Exit::Jump(BlockId(3)));
        assert!(!graph.nodes.contains_key(&BlockId(1)));
    }
}
