use super::{Dominators, Exit, FlowGraph, Label, LabelCounter, StructuredBlock};
use crate::decompile::{Diagnostic, DiagnosticKind};
use crate::expr::{infer, ExprArena, ExprId, Operator};
use crate::jvm::code::{BlockId, LabelGenerator};
use crate::locals::resolver::{PendingJoin, Resolver};
use crate::locals::LocalTable;
use crate::types::{Type, TypeContext};
use crate::util::Offset;
use std::collections::{BTreeMap, BTreeSet};

/// What the structurer needs to re-run inference after it builds new conditions or joins
/// variables
pub struct Reinference<'a, 'g> {
    pub tcx: TypeContext<'g>,
    pub locals: &'a mut LocalTable<'g>,
    pub max_narrowings: usize,

    /// Loads to merge with their definitions once the blocks involved are folded into one node
    pub joins: Vec<PendingJoin>,
}

/// Turns a flow graph into a single structured block
///
/// The graph is reduced one step at a time, trying nodes innermost first (postorder). Every step
/// collapses a recognized shape (a sequence, an `if`, a loop, a `switch`, a `try`) into one node.
/// When no shape matches anywhere, one edge gets demoted into an explicit jump inside its source
/// block, which usually unblocks the next reduction:
///
///   1. back edges, when a loop has several of them
///   2. edges leaving a loop from somewhere other than its header
///   3. edges into nodes with several predecessors (joins)
///   4. any other edge
///
/// Raw jumps turn into `break` and `continue` as soon as the enclosing loop, `switch`, or labeled
/// block is built. If the graph still can't be reduced once there is nothing left to demote, the
/// remaining nodes are emitted as an unstructured fallback and a diagnostic is recorded.
pub struct Structurer<'a, 'g> {
    pub(super) graph: FlowGraph,
    pub(super) arena: &'a mut ExprArena<'g>,
    pub(super) labels: LabelCounter,
    pub(super) detect_finally: bool,
    pub(super) merge_conditions: bool,
    pub(super) diagnostics: &'a mut Vec<Diagnostic>,
    inference: Option<Reinference<'a, 'g>>,

    /// Arena size when inference last ran
    inferred_len: usize,

    /// Variables were merged since inference last ran
    joined: bool,
}

impl<'a, 'g> Structurer<'a, 'g> {
    pub fn new(
        graph: FlowGraph,
        arena: &'a mut ExprArena<'g>,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        let inferred_len = arena.len();
        Structurer {
            graph,
            arena,
            labels: LabelCounter::default(),
            detect_finally: true,
            merge_conditions: true,
            diagnostics,
            inference: None,
            inferred_len,
            joined: false,
        }
    }

    pub fn with_finally_detection(mut self, detect_finally: bool) -> Self {
        self.detect_finally = detect_finally;
        self
    }

    /// Fold chained branches into `&&` and `||` conditions
    pub fn with_condition_merging(mut self, merge_conditions: bool) -> Self {
        self.merge_conditions = merge_conditions;
        self
    }

    pub fn with_inference(mut self, inference: Reinference<'a, 'g>) -> Self {
        self.inference = Some(inference);
        self
    }

    pub fn structure(mut self) -> StructuredBlock {
        self.graph.prune_unreachable(self.arena);
        self.graph.thread_empty_jumps();

        let mut steps = 0;
        while !self.is_done() {
            if self.reduce_once() {
                steps += 1;
                self.join_folded(false);
                self.reinfer();
            } else if !self.demote_edge() {
                return self.fallback();
            }
        }
        log::debug!("Structured the flow graph in {} reductions", steps);

        self.join_folded(true);
        self.reinfer();
        let entry = self.graph.entry;
        self.graph
            .nodes
            .remove(&entry)
            .map_or(StructuredBlock::Empty, |node| node.block)
    }

    fn is_done(&self) -> bool {
        match self.graph.nodes.get(&self.graph.entry) {
            Some(node) => {
                self.graph.nodes.len() == 1 && node.exit == Exit::None && node.raw_jumps.is_empty()
            }
            None => true,
        }
    }

    /// Merge the pending joins whose blocks now (nearly) all live in one node
    ///
    /// A join is ready when at most one of its blocks is still a node of its own, the others
    /// having been absorbed. With `all`, every remaining join is merged.
    fn join_folded(&mut self, all: bool) {
        let inference = match self.inference.as_mut() {
            Some(inference) => inference,
            None => return,
        };
        let nodes = &self.graph.nodes;
        let (ready, waiting): (Vec<PendingJoin>, Vec<PendingJoin>) =
            std::mem::take(&mut inference.joins)
                .into_iter()
                .partition(|join| {
                    all || join.blocks.iter().filter(|b| nodes.contains_key(b)).count() <= 1
                });
        inference.joins = waiting;
        if ready.is_empty() {
            return;
        }

        let mut resolver =
            Resolver::new(inference.tcx, self.arena, inference.locals, self.diagnostics);
        for join in &ready {
            resolver.join(join);
        }
        self.joined = true;
    }

    fn reinfer(&mut self) {
        if self.arena.len() == self.inferred_len && !self.joined {
            return;
        }
        self.joined = false;
        if let Some(inference) = self.inference.as_mut() {
            infer(
                inference.tcx,
                self.arena,
                inference.locals,
                self.diagnostics,
                inference.max_narrowings,
            );
        }
        self.inferred_len = self.arena.len();
    }

    /// Try every shape on every node, stopping after the first successful reduction
    ///
    /// Conditions are combined before anything else, since the inner test of `a && b` is itself
    /// an `if` that would otherwise be collapsed first.
    fn reduce_once(&mut self) -> bool {
        let preds = self.graph.predecessors();
        let order = self.graph.postorder();
        if order
            .iter()
            .any(|node| self.combine_conditions(*node, &preds))
        {
            return true;
        }
        for node in order {
            let reduced = self.reduce_loop(node, &preds)
                || self.reduce_if(node, &preds)
                || self.reduce_switch(node, &preds)
                || self.reduce_try(node, &preds)
                || self.reduce_sequence(node, &preds);
            if reduced {
                return true;
            }
        }
        false
    }

    /// Can `node` be folded into `into` (is it only reachable from there, in the same regions)?
    pub(super) fn absorbable(
        &self,
        node: BlockId,
        into: BlockId,
        preds: &BTreeMap<BlockId, BTreeSet<BlockId>>,
    ) -> bool {
        node != into
            && node != self.graph.entry
            && self.graph.nodes.contains_key(&node)
            && !self.graph.is_handler(node)
            && preds.get(&node).map_or(false, |p| p.len() == 1 && p.contains(&into))
            && self.graph.regions_of(node) == self.graph.regions_of(into)
    }

    pub(super) fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    /// Negation of a condition (unwrapping an existing `!`)
    pub(super) fn negate(&mut self, condition: ExprId) -> ExprId {
        let node = &self.arena[condition];
        if let (Operator::Not, [inner]) = (&node.operator, node.children.as_slice()) {
            let inner = *inner;
            self.arena.detach(condition);
            self.arena[inner].parent = None;
            return inner;
        }
        let address = node.address;
        self.boolean(Operator::Not, vec![condition], address)
    }

    /// New `boolean` node
    pub(super) fn boolean(
        &mut self,
        operator: Operator,
        children: Vec<ExprId>,
        address: Offset,
    ) -> ExprId {
        let id = self.arena.push(operator, children, address);
        self.arena[id].ty = Type::BOOLEAN;
        id
    }

    /// Demote one edge into a raw jump, returning whether there was any edge to demote
    fn demote_edge(&mut self) -> bool {
        let doms = Dominators::compute(&self.graph);
        let preds = self.graph.predecessors();
        let order = self.graph.reverse_postorder();

        // Back edges, when there are several into one header
        for header in &order {
            let latches: Vec<BlockId> = preds[header]
                .iter()
                .filter(|p| doms.dominates(*header, **p) && self.exit_targets(**p).contains(header))
                .copied()
                .collect();
            if latches.len() > 1 {
                return self.demote(latches[0], *header);
            }
        }

        // Exits out of a loop body, other than from the header
        for header in &order {
            let latches: Vec<BlockId> = preds[header]
                .iter()
                .filter(|p| doms.dominates(*header, **p))
                .copied()
                .collect();
            if latches.is_empty() {
                continue;
            }
            let body = natural_loop(*header, &latches, &preds);
            for node in body.iter().rev() {
                if node == header {
                    continue;
                }
                let exiting = self
                    .exit_targets(*node)
                    .into_iter()
                    .find(|target| !body.contains(target));
                if let Some(target) = exiting {
                    return self.demote(*node, target);
                }
            }
        }

        // Joins, latest source first
        for node in order.iter().rev() {
            let join = self
                .exit_targets(*node)
                .into_iter()
                .find(|target| preds.get(target).map_or(false, |p| p.len() > 1));
            if let Some(target) = join {
                return self.demote(*node, target);
            }
        }

        // Anything
        for node in order.iter().rev() {
            if let Some(target) = self.exit_targets(*node).first() {
                return self.demote(*node, *target);
            }
        }
        false
    }

    fn exit_targets(&self, node: BlockId) -> Vec<BlockId> {
        self.graph
            .nodes
            .get(&node)
            .map_or(vec![], |node| node.exit.targets())
    }

    /// Replace the exit edge from `source` to `target` by a raw jump at the end of the block
    fn demote(&mut self, source: BlockId, target: BlockId) -> bool {
        log::debug!("Demoting edge {:?} -> {:?}", source, target);
        let exit = match self.graph.nodes.get(&source) {
            Some(node) => node.exit.clone(),
            None => return false,
        };
        let (tail, new_exit) = match exit {
            Exit::None => return false,
            Exit::Jump(_) => (StructuredBlock::Jump(target), Exit::None),
            Exit::Branch {
                condition,
                then,
                otherwise,
            } => {
                if then == otherwise {
                    let tail = StructuredBlock::If {
                        condition,
                        then: Box::new(StructuredBlock::Empty),
                        otherwise: None,
                    };
                    (tail.then(StructuredBlock::Jump(target)), Exit::None)
                } else if then == target {
                    let tail = StructuredBlock::If {
                        condition,
                        then: Box::new(StructuredBlock::Jump(target)),
                        otherwise: None,
                    };
                    (tail, Exit::Jump(otherwise))
                } else {
                    let condition = self.negate(condition);
                    let tail = StructuredBlock::If {
                        condition,
                        then: Box::new(StructuredBlock::Jump(target)),
                        otherwise: None,
                    };
                    (tail, Exit::Jump(then))
                }
            }
            Exit::Switch {
                selector,
                cases,
                default,
            } => {
                let label = self.fresh_label();
                (
                    explicit_switch(label, selector, &cases, default),
                    Exit::None,
                )
            }
        };

        if let Some(node) = self.graph.nodes.get_mut(&source) {
            let block = std::mem::take(&mut node.block);
            node.block = block.then(tail);
            node.raw_jumps = node.block.jump_targets().into_iter().collect();
            node.exit = new_exit;
        }
        true
    }

    /// Give up: lay out the remaining nodes with explicit jumps between them
    fn fallback(mut self) -> StructuredBlock {
        let mut remaining: Vec<BlockId> = self.graph.nodes.keys().copied().collect();
        remaining.retain(|id| *id != self.graph.entry);
        remaining.insert(0, self.graph.entry);

        let address = remaining
            .iter()
            .skip(1)
            .filter_map(|id| self.graph.nodes.get(id))
            .flat_map(|node| node.block.expressions().into_iter().chain(node.exit.expression()))
            .map(|expr| self.arena[expr].address)
            .next()
            .unwrap_or_default();
        let mut message = format!(
            "control flow between {} blocks could not be structured",
            remaining.len()
        );
        if !self.graph.regions.is_empty() {
            message.push_str(&format!(
                " ({} exception handlers left unattached)",
                self.graph.regions.len()
            ));
        }
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::StructuringFailure,
            address,
            message,
        ));

        self.join_folded(true);
        self.reinfer();
        let mut blocks = vec![];
        for id in remaining {
            if let Some(node) = self.graph.nodes.remove(&id) {
                let tail = match node.exit {
                    Exit::None => StructuredBlock::Empty,
                    Exit::Jump(target) => StructuredBlock::Jump(target),
                    Exit::Branch {
                        condition,
                        then,
                        otherwise,
                    } => StructuredBlock::If {
                        condition,
                        then: Box::new(StructuredBlock::Jump(then)),
                        otherwise: Some(Box::new(StructuredBlock::Jump(otherwise))),
                    },
                    Exit::Switch {
                        selector,
                        cases,
                        default,
                    } => {
                        let label = self.labels.fresh_label();
                        explicit_switch(label, selector, &cases, default)
                    }
                };
                blocks.push((id, node.block.then(tail)));
            }
        }
        StructuredBlock::Unstructured(blocks)
    }
}

/// `switch` whose cases all jump somewhere
fn explicit_switch(
    label: Label,
    selector: ExprId,
    cases: &[(i32, BlockId)],
    default: BlockId,
) -> StructuredBlock {
    let mut targets: BTreeMap<BlockId, Vec<i32>> = BTreeMap::new();
    for (value, target) in cases {
        targets.entry(*target).or_default().push(*value);
    }
    let mut built: Vec<super::Case> = targets
        .into_iter()
        .map(|(target, values)| super::Case {
            values,
            is_default: target == default,
            body: StructuredBlock::Jump(target),
        })
        .collect();
    if !built.iter().any(|case| case.is_default) {
        built.push(super::Case {
            values: vec![],
            is_default: true,
            body: StructuredBlock::Jump(default),
        });
    }
    StructuredBlock::Switch {
        label,
        selector,
        cases: built,
    }
}

/// Nodes of the loop with the given header and back edge sources
pub(super) fn natural_loop(
    header: BlockId,
    latches: &[BlockId],
    preds: &BTreeMap<BlockId, BTreeSet<BlockId>>,
) -> BTreeSet<BlockId> {
    let mut body = BTreeSet::new();
    body.insert(header);
    let mut to_visit: Vec<BlockId> = latches.to_vec();
    while let Some(node) = to_visit.pop() {
        if body.insert(node) {
            if let Some(node_preds) = preds.get(&node) {
                to_visit.extend(node_preds.iter().copied());
            }
        }
    }
    body
}
