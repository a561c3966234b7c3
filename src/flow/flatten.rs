use super::{Exit, FlowGraph, Label, LoopKind, StructuredBlock};
use crate::expr::{ExprArena, ExprId, Operator};
use crate::jvm::code::BlockId;
use std::collections::{BTreeMap, BTreeSet};

/// How control leaves a node of a [`JumpGraph`]
#[derive(Clone, Debug, PartialEq)]
pub enum JumpExit {
    Goto(u32),
    Branch {
        condition: ExprId,
        then: u32,
        otherwise: u32,
    },
    Switch {
        selector: ExprId,
        cases: Vec<(i32, u32)>,
        default: u32,
    },
    Return(Option<ExprId>),
    Throw(ExprId),

    /// Falls off the end of the method
    End,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JumpNode {
    pub statements: Vec<ExprId>,
    pub exit: JumpExit,
}

/// Plain control flow graph of statements, used to compare a structured tree with the flow graph
/// it came from
#[derive(Clone, Debug, Default)]
pub struct JumpGraph {
    pub entry: u32,
    pub nodes: BTreeMap<u32, JumpNode>,
}

impl JumpGraph {
    /// Graph of a flow graph whose blocks are plain statement lists
    ///
    /// Returns `None` if some block already has structure in it.
    pub fn from_flow_graph(graph: &FlowGraph) -> Option<JumpGraph> {
        let mut nodes = BTreeMap::new();
        for (id, node) in &graph.nodes {
            let mut statements = vec![];
            let mut exit = None;
            for statement in node.block.statements() {
                match statement {
                    StructuredBlock::Instruction(expr) if exit.is_none() => statements.push(*expr),
                    StructuredBlock::Return(value) if exit.is_none() => {
                        exit = Some(JumpExit::Return(*value))
                    }
                    StructuredBlock::Throw(value) if exit.is_none() => {
                        exit = Some(JumpExit::Throw(*value))
                    }
                    _ => return None,
                }
            }
            let exit = match (exit, &node.exit) {
                (Some(exit), Exit::None) => exit,
                (None, Exit::None) => JumpExit::End,
                (None, Exit::Jump(target)) => JumpExit::Goto(target.0),
                (
                    None,
                    Exit::Branch {
                        condition,
                        then,
                        otherwise,
                    },
                ) => JumpExit::Branch {
                    condition: *condition,
                    then: then.0,
                    otherwise: otherwise.0,
                },
                (
                    None,
                    Exit::Switch {
                        selector,
                        cases,
                        default,
                    },
                ) => JumpExit::Switch {
                    selector: *selector,
                    cases: cases.iter().map(|(v, t)| (*v, t.0)).collect(),
                    default: default.0,
                },
                (Some(_), _) => return None,
            };
            nodes.insert(id.0, JumpNode { statements, exit });
        }
        Some(JumpGraph {
            entry: graph.entry.0,
            nodes,
        })
    }

    fn successors(&self, node: u32) -> Vec<u32> {
        match self.nodes.get(&node).map(|n| &n.exit) {
            Some(JumpExit::Goto(target)) => vec![*target],
            Some(JumpExit::Branch {
                then, otherwise, ..
            }) => vec![*then, *otherwise],
            Some(JumpExit::Switch { cases, default, .. }) => {
                let mut targets: Vec<u32> = cases.iter().map(|(_, t)| *t).collect();
                targets.push(*default);
                targets
            }
            _ => vec![],
        }
    }

    /// Drop unreachable nodes, skip empty `goto` nodes, and merge straight-line chains
    pub fn canonicalize(&mut self) {
        loop {
            let forward = self.nodes.iter().find_map(|(id, node)| match node.exit {
                JumpExit::Goto(target) if node.statements.is_empty() && target != *id => {
                    Some((*id, target))
                }
                _ => None,
            });
            match forward {
                Some((skipped, target)) => self.redirect(skipped, target),
                None => break,
            }
        }

        loop {
            let preds = self.predecessor_counts();
            let chain = self.nodes.iter().find_map(|(id, node)| match node.exit {
                JumpExit::Goto(target)
                    if target != *id
                        && target != self.entry
                        && preds.get(&target).copied() == Some(1) =>
                {
                    Some((*id, target))
                }
                _ => None,
            });
            let (first, second) = match chain {
                Some(chain) => chain,
                None => break,
            };
            if let Some(absorbed) = self.nodes.remove(&second) {
                if let Some(node) = self.nodes.get_mut(&first) {
                    node.statements.extend(absorbed.statements);
                    node.exit = absorbed.exit;
                }
            }
        }

        let mut reachable = BTreeSet::new();
        let mut to_visit = vec![self.entry];
        while let Some(node) = to_visit.pop() {
            if self.nodes.contains_key(&node) && reachable.insert(node) {
                to_visit.extend(self.successors(node));
            }
        }
        self.nodes.retain(|id, _| reachable.contains(id));
    }

    fn redirect(&mut self, from: u32, to: u32) {
        self.nodes.remove(&from);
        if self.entry == from {
            self.entry = to;
        }
        for node in self.nodes.values_mut() {
            let fix = |target: &mut u32| {
                if *target == from {
                    *target = to;
                }
            };
            match &mut node.exit {
                JumpExit::Goto(target) => fix(target),
                JumpExit::Branch {
                    then, otherwise, ..
                } => {
                    fix(then);
                    fix(otherwise);
                }
                JumpExit::Switch { cases, default, .. } => {
                    cases.iter_mut().for_each(|(_, t)| fix(t));
                    fix(default);
                }
                _ => (),
            }
        }
    }

    fn predecessor_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for id in self.nodes.keys() {
            for successor in self.successors(*id) {
                *counts.entry(successor).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Same shape, with the same statements and conditions in corresponding nodes?
    pub fn is_isomorphic(&self, other: &JumpGraph) -> bool {
        let mut mapping: BTreeMap<u32, u32> = BTreeMap::new();
        let mut reverse: BTreeMap<u32, u32> = BTreeMap::new();
        let mut to_visit = vec![(self.entry, other.entry)];
        while let Some((a, b)) = to_visit.pop() {
            match (mapping.get(&a), reverse.get(&b)) {
                (Some(mapped), _) if *mapped != b => return false,
                (_, Some(mapped)) if *mapped != a => return false,
                (Some(_), _) => continue,
                _ => (),
            }
            mapping.insert(a, b);
            reverse.insert(b, a);

            let (x, y) = match (self.nodes.get(&a), other.nodes.get(&b)) {
                (Some(x), Some(y)) => (x, y),
                _ => return false,
            };
            if x.statements != y.statements {
                return false;
            }
            match (&x.exit, &y.exit) {
                (JumpExit::Goto(s), JumpExit::Goto(t)) => to_visit.push((*s, *t)),
                (
                    JumpExit::Branch {
                        condition: c1,
                        then: t1,
                        otherwise: o1,
                    },
                    JumpExit::Branch {
                        condition: c2,
                        then: t2,
                        otherwise: o2,
                    },
                ) if c1 == c2 => {
                    to_visit.push((*t1, *t2));
                    to_visit.push((*o1, *o2));
                }
                (
                    JumpExit::Switch {
                        selector: s1,
                        cases: k1,
                        default: d1,
                    },
                    JumpExit::Switch {
                        selector: s2,
                        cases: k2,
                        default: d2,
                    },
                ) if s1 == s2 => {
                    let (mut k1, mut k2) = (k1.clone(), k2.clone());
                    k1.sort_unstable();
                    k2.sort_unstable();
                    if k1.len() != k2.len() || k1.iter().zip(&k2).any(|(a, b)| a.0 != b.0) {
                        return false;
                    }
                    to_visit.extend(k1.iter().zip(&k2).map(|(a, b)| (a.1, b.1)));
                    to_visit.push((*d1, *d2));
                }
                (x, y) if x == y => (),
                _ => return false,
            }
        }
        true
    }
}

/// Lower a structured block back into a jump graph
///
/// `&&`, `||`, and `!` in conditions become chains of branches again, so a tree built by
/// combining conditions flattens to the shape of the original graph.
pub fn flatten(block: &StructuredBlock, arena: &ExprArena<'_>) -> JumpGraph {
    let mut flattener = Flattener {
        arena,
        graph: JumpGraph::default(),
        next_id: 0,
        targets: BTreeMap::new(),
        blocks: BTreeMap::new(),
    };
    let entry = flattener.fresh();
    flattener.graph.entry = entry;
    let end = flattener.fresh();
    flattener.finish(end, vec![], JumpExit::End);
    if let StructuredBlock::Unstructured(blocks) = block {
        for (id, _) in blocks {
            let node = flattener.fresh();
            flattener.blocks.insert(*id, node);
        }
    }
    flattener.lower(block, entry, end);
    flattener.graph
}

struct Flattener<'a, 'g> {
    arena: &'a ExprArena<'g>,
    graph: JumpGraph,
    next_id: u32,

    /// Where `break` and `continue` go for each enclosing label
    targets: BTreeMap<Label, (u32, Option<u32>)>,

    /// Entry nodes of unstructured blocks
    blocks: BTreeMap<BlockId, u32>,
}

impl<'a, 'g> Flattener<'a, 'g> {
    fn fresh(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn finish(&mut self, node: u32, statements: Vec<ExprId>, exit: JumpExit) {
        self.graph.nodes.insert(node, JumpNode { statements, exit });
    }

    /// Lower `block` into a node starting at `start`, continuing to `next` when it completes
    fn lower(&mut self, block: &StructuredBlock, start: u32, next: u32) {
        let mut pending: Vec<ExprId> = vec![];
        let mut current = start;
        let statements = block.statements();
        for (index, statement) in statements.iter().enumerate() {
            let is_last = index + 1 == statements.len();
            match statement {
                StructuredBlock::Instruction(expr) => pending.push(*expr),
                StructuredBlock::Special { moves, .. } => pending.extend(moves.iter().copied()),
                StructuredBlock::Empty => (),
                other => {
                    // close the current node, then lower the compound statement on its own
                    let compound_start = self.fresh();
                    let after = if is_last { next } else { self.fresh() };
                    self.finish(
                        current,
                        std::mem::take(&mut pending),
                        JumpExit::Goto(compound_start),
                    );
                    self.lower_compound(other, compound_start, after);
                    if is_last {
                        return;
                    }
                    current = after;
                }
            }
        }
        self.finish(current, pending, JumpExit::Goto(next));
    }

    fn lower_compound(&mut self, block: &StructuredBlock, start: u32, next: u32) {
        match block {
            StructuredBlock::Return(value) => self.finish(start, vec![], JumpExit::Return(*value)),
            StructuredBlock::Throw(value) => self.finish(start, vec![], JumpExit::Throw(*value)),
            StructuredBlock::Break(label) => {
                let target = self.targets.get(label).map_or(next, |t| t.0);
                self.finish(start, vec![], JumpExit::Goto(target));
            }
            StructuredBlock::Continue(label) => {
                let target = self
                    .targets
                    .get(label)
                    .and_then(|t| t.1)
                    .unwrap_or(next);
                self.finish(start, vec![], JumpExit::Goto(target));
            }
            StructuredBlock::Jump(target) => {
                let target = self.blocks.get(target).copied().unwrap_or(next);
                self.finish(start, vec![], JumpExit::Goto(target));
            }
            StructuredBlock::If {
                condition,
                then,
                otherwise,
            } => {
                let then_start = self.fresh();
                let otherwise_start = match otherwise {
                    Some(_) => self.fresh(),
                    None => next,
                };
                self.lower_condition(*condition, start, then_start, otherwise_start);
                self.lower(then, then_start, next);
                if let Some(otherwise) = otherwise {
                    self.lower(otherwise, otherwise_start, next);
                }
            }
            StructuredBlock::Loop {
                label,
                kind,
                condition,
                body,
            } => {
                let body_start = self.fresh();
                match (kind, condition) {
                    (LoopKind::While, Some(condition)) => {
                        self.targets.insert(*label, (next, Some(start)));
                        self.lower_condition(*condition, start, body_start, next);
                        self.lower(body, body_start, start);
                    }
                    (LoopKind::DoWhile, Some(condition)) => {
                        let test = self.fresh();
                        self.targets.insert(*label, (next, Some(test)));
                        self.finish(start, vec![], JumpExit::Goto(body_start));
                        self.lower(body, body_start, test);
                        self.lower_condition(*condition, test, body_start, next);
                    }
                    _ => {
                        self.targets.insert(*label, (next, Some(start)));
                        self.finish(start, vec![], JumpExit::Goto(body_start));
                        self.lower(body, body_start, start);
                    }
                }
            }
            StructuredBlock::Labeled { label, body } => {
                self.targets.insert(*label, (next, None));
                self.lower(body, start, next);
            }
            StructuredBlock::Switch {
                label,
                selector,
                cases,
            } => {
                self.targets.insert(*label, (next, None));
                let starts: Vec<u32> = cases.iter().map(|_| self.fresh()).collect();
                let mut keyed = vec![];
                let mut default = next;
                for (case, case_start) in cases.iter().zip(&starts) {
                    keyed.extend(case.values.iter().map(|value| (*value, *case_start)));
                    if case.is_default {
                        default = *case_start;
                    }
                }
                self.finish(
                    start,
                    vec![],
                    JumpExit::Switch {
                        selector: *selector,
                        cases: keyed,
                        default,
                    },
                );
                for (index, case) in cases.iter().enumerate() {
                    let fallthrough = starts.get(index + 1).copied().unwrap_or(next);
                    self.lower(&case.body, starts[index], fallthrough);
                }
            }
            StructuredBlock::TryCatch {
                body,
                catches,
                finally,
            } => {
                let after_body = match finally {
                    Some(_) => self.fresh(),
                    None => next,
                };
                self.lower(body, start, after_body);
                for catch in catches {
                    let catch_start = self.fresh();
                    let statements = catch.binding.into_iter().collect();
                    let catch_body = self.fresh();
                    self.finish(catch_start, statements, JumpExit::Goto(catch_body));
                    self.lower(&catch.body, catch_body, after_body);
                }
                if let Some(finally) = finally {
                    self.lower(finally, after_body, next);
                }
            }
            StructuredBlock::Unstructured(blocks) => {
                self.finish(start, vec![], JumpExit::Goto(self.entry_of(blocks)));
                for (id, block) in blocks {
                    let block_start = self.blocks.get(id).copied().unwrap_or(next);
                    self.lower(block, block_start, next);
                }
            }
            StructuredBlock::Sequence(_)
            | StructuredBlock::Instruction(_)
            | StructuredBlock::Special { .. }
            | StructuredBlock::Empty => self.lower(block, start, next),
        }
    }

    fn entry_of(&self, blocks: &[(BlockId, StructuredBlock)]) -> u32 {
        blocks
            .first()
            .and_then(|(id, _)| self.blocks.get(id).copied())
            .unwrap_or(0)
    }

    /// Branch on a condition, splitting `&&`, `||`, and `!` back into separate branches
    fn lower_condition(&mut self, condition: ExprId, start: u32, then: u32, otherwise: u32) {
        let node = &self.arena[condition];
        match (&node.operator, node.children.as_slice()) {
            (Operator::Not, [inner]) => self.lower_condition(*inner, start, otherwise, then),
            (Operator::LogicalAnd, [left, right]) => {
                let (left, right) = (*left, *right);
                let middle = self.fresh();
                self.lower_condition(left, start, middle, otherwise);
                self.lower_condition(right, middle, then, otherwise);
            }
            (Operator::LogicalOr, [left, right]) => {
                let (left, right) = (*left, *right);
                let middle = self.fresh();
                self.lower_condition(left, start, then, middle);
                self.lower_condition(right, middle, then, otherwise);
            }
            _ => self.finish(
                start,
                vec![],
                JumpExit::Branch {
                    condition,
                    then,
                    otherwise,
                },
            ),
        }
    }
}
