//! Shapes the structurer knows how to collapse
//!
//! Each matcher looks at one node and its immediate surroundings. On success the node absorbs its
//! neighbours (which leave the graph) and ends up with a new block and exit.

use super::structurer::Structurer;
use super::{Case, Catch, Exit, FlowNode, LoopKind, StructuredBlock};
use crate::expr::{ExprId, Operator};
use crate::jvm::code::BlockId;
use std::collections::{BTreeMap, BTreeSet};

type Predecessors = BTreeMap<BlockId, BTreeSet<BlockId>>;

impl<'a, 'g> Structurer<'a, 'g> {
    fn exit_of(&self, node: BlockId) -> Option<Exit> {
        self.graph.nodes.get(&node).map(|n| n.exit.clone())
    }

    /// Take a neighbour out of the graph
    fn absorb(&mut self, node: BlockId) -> FlowNode {
        self.graph
            .take_node(node)
            .unwrap_or_else(|| FlowNode::new(StructuredBlock::Empty, Exit::None))
    }

    /// Replace the block and exit of a node (recomputing its raw jumps)
    fn rebuild(&mut self, node: BlockId, block: StructuredBlock, exit: Exit) {
        if let Some(n) = self.graph.nodes.get_mut(&node) {
            n.raw_jumps = block.jump_targets().into_iter().collect();
            n.block = block;
            n.exit = exit;
        }
    }

    fn take_block(&mut self, node: BlockId) -> StructuredBlock {
        self.graph
            .nodes
            .get_mut(&node)
            .map_or(StructuredBlock::Empty, |n| std::mem::take(&mut n.block))
    }

    /// `a; b` where `b` is only reachable from the end of `a` (or from jumps inside `a`)
    pub(super) fn reduce_sequence(&mut self, node: BlockId, preds: &Predecessors) -> bool {
        let (exit, raw_jumps) = match self.graph.nodes.get(&node) {
            Some(n) => (n.exit.clone(), n.raw_jumps.clone()),
            None => return false,
        };
        let next = match exit {
            Exit::Jump(next) => next,
            Exit::None => match raw_jumps
                .iter()
                .find(|target| self.absorbable(**target, node, preds))
            {
                Some(next) => *next,
                None => return false,
            },
            _ => return false,
        };
        if !self.absorbable(next, node, preds) {
            return false;
        }

        log::trace!("Sequence {:?}; {:?}", node, next);
        let following = self.absorb(next);
        let mut block = self.take_block(node);
        if raw_jumps.contains(&next) {
            let label = self.fresh_label();
            block.replace_jumps(next, &StructuredBlock::Break(label));
            block = StructuredBlock::Labeled {
                label,
                body: Box::new(block),
            };
        }
        self.rebuild(node, block.then(following.block), following.exit);
        true
    }

    /// `if (c) { a }` and `if (c) { a } else { b }`
    pub(super) fn reduce_if(&mut self, node: BlockId, preds: &Predecessors) -> bool {
        let (condition, then, otherwise) = match self.exit_of(node) {
            Some(Exit::Branch {
                condition,
                then,
                otherwise,
            }) => (condition, then, otherwise),
            _ => return false,
        };

        if then == otherwise {
            let block = self.take_block(node).then(StructuredBlock::If {
                condition,
                then: Box::new(StructuredBlock::Empty),
                otherwise: None,
            });
            self.rebuild(node, block, Exit::Jump(then));
            return true;
        }

        let then_ok = self.absorbable(then, node, preds);
        let otherwise_ok = self.absorbable(otherwise, node, preds);
        let then_exit = self.exit_of(then);
        let otherwise_exit = self.exit_of(otherwise);

        if then_ok && otherwise_ok {
            let join = match (&then_exit, &otherwise_exit) {
                (Some(Exit::Jump(a)), Some(Exit::Jump(b))) if a == b => Some(Exit::Jump(*a)),
                (Some(Exit::None), Some(exit @ (Exit::Jump(_) | Exit::None)))
                | (Some(exit @ Exit::Jump(_)), Some(Exit::None)) => Some(exit.clone()),
                _ => None,
            };
            if let Some(join) = join {
                log::trace!("If-else at {:?}", node);
                let then_block = self.absorb(then).block;
                let otherwise_block = self.absorb(otherwise).block;
                let block = self.take_block(node).then(StructuredBlock::If {
                    condition,
                    then: Box::new(then_block),
                    otherwise: Some(Box::new(otherwise_block)),
                });
                self.rebuild(node, block, join);
                return true;
            }
        }

        let then_continues = matches!(then_exit, Some(Exit::None))
            || then_exit == Some(Exit::Jump(otherwise));
        if then_ok && then_continues {
            log::trace!("If-then at {:?}", node);
            let then_block = self.absorb(then).block;
            let block = self.take_block(node).then(StructuredBlock::If {
                condition,
                then: Box::new(then_block),
                otherwise: None,
            });
            self.rebuild(node, block, Exit::Jump(otherwise));
            return true;
        }

        let otherwise_continues = matches!(otherwise_exit, Some(Exit::None))
            || otherwise_exit == Some(Exit::Jump(then));
        if otherwise_ok && otherwise_continues {
            log::trace!("If-not-then at {:?}", node);
            let otherwise_block = self.absorb(otherwise).block;
            let negated = self.negate(condition);
            let block = self.take_block(node).then(StructuredBlock::If {
                condition: negated,
                then: Box::new(otherwise_block),
                otherwise: None,
            });
            self.rebuild(node, block, Exit::Jump(then));
            return true;
        }

        false
    }

    /// Fold an empty conditional node into its predecessor's condition with `&&` or `||`
    pub(super) fn combine_conditions(&mut self, node: BlockId, preds: &Predecessors) -> bool {
        if !self.merge_conditions {
            return false;
        }
        let (first, then, otherwise) = match self.exit_of(node) {
            Some(Exit::Branch {
                condition,
                then,
                otherwise,
            }) => (condition, then, otherwise),
            _ => return false,
        };

        for inner in [otherwise, then] {
            let (second, then2, otherwise2) = match self.graph.nodes.get(&inner) {
                Some(n) if n.block.is_empty() && n.raw_jumps.is_empty() => match n.exit {
                    Exit::Branch {
                        condition,
                        then,
                        otherwise,
                    } => (condition, then, otherwise),
                    _ => continue,
                },
                _ => continue,
            };
            if !self.absorbable(inner, node, preds) {
                continue;
            }

            // (combinator, negate the first condition, then, otherwise)
            let shape = if inner == otherwise && then == then2 {
                Some((Operator::LogicalOr, false, then2, otherwise2))
            } else if inner == otherwise && then == otherwise2 {
                Some((Operator::LogicalAnd, true, then2, then))
            } else if inner == then && otherwise == otherwise2 {
                Some((Operator::LogicalAnd, false, then2, otherwise))
            } else if inner == then && otherwise == then2 {
                Some((Operator::LogicalOr, true, then2, otherwise2))
            } else {
                None
            };
            let (combinator, negate_first, new_then, new_otherwise) = match shape {
                Some(shape) => shape,
                None => continue,
            };

            log::trace!("Combining conditions of {:?} and {:?}", node, inner);
            self.absorb(inner);
            let first = if negate_first {
                self.negate(first)
            } else {
                first
            };
            let address = self.arena[first].address;
            let combined = self.boolean(combinator, vec![first, second], address);
            let block = self.take_block(node);
            self.rebuild(
                node,
                block,
                Exit::Branch {
                    condition: combined,
                    then: new_then,
                    otherwise: new_otherwise,
                },
            );
            return true;
        }
        false
    }

    /// Loops whose body has been collapsed into the header (or into the header and one node)
    pub(super) fn reduce_loop(&mut self, node: BlockId, preds: &Predecessors) -> bool {
        let (exit, raw_jumps, block_empty) = match self.graph.nodes.get(&node) {
            Some(n) => (n.exit.clone(), n.raw_jumps.clone(), n.block.is_empty()),
            None => return false,
        };
        let continues_inside = raw_jumps.contains(&node);

        match exit {
            Exit::Branch {
                condition,
                then,
                otherwise,
            } if then != otherwise && (then == node || otherwise == node) => {
                let (condition, follow) = if then == node {
                    (condition, otherwise)
                } else {
                    (self.negate(condition), then)
                };
                let label = self.fresh_label();
                let mut body = self.take_block(node);
                body.replace_jumps(node, &StructuredBlock::Continue(label));
                body.replace_jumps(follow, &StructuredBlock::Break(label));

                let looped = if continues_inside {
                    // restarting the body skips the test, so the test can't be the loop condition
                    let exit_test = self.negate(condition);
                    StructuredBlock::Loop {
                        label,
                        kind: LoopKind::Infinite,
                        condition: None,
                        body: Box::new(body.then(StructuredBlock::If {
                            condition: exit_test,
                            then: Box::new(StructuredBlock::Break(label)),
                            otherwise: None,
                        })),
                    }
                } else {
                    StructuredBlock::Loop {
                        label,
                        kind: if block_empty {
                            LoopKind::While
                        } else {
                            LoopKind::DoWhile
                        },
                        condition: Some(condition),
                        body: Box::new(body),
                    }
                };
                log::trace!("Self loop at {:?}", node);
                self.rebuild(node, looped, Exit::Jump(follow));
                true
            }

            Exit::Branch {
                condition,
                then,
                otherwise,
            } if then != otherwise => {
                // while (c) body, with the body in its own node jumping back to the header
                let (condition, body_node, follow, negated) =
                    if self.loops_back(then, node, preds) && otherwise != node {
                        (condition, then, otherwise, false)
                    } else if self.loops_back(otherwise, node, preds) && then != node {
                        (condition, otherwise, then, true)
                    } else {
                        return false;
                    };
                let condition = if negated {
                    self.negate(condition)
                } else {
                    condition
                };

                log::trace!("While loop at {:?}", node);
                let label = self.fresh_label();
                let body_block = self.absorb(body_node).block;
                let header = self.take_block(node);
                let mut looped = if header.is_empty() {
                    StructuredBlock::Loop {
                        label,
                        kind: LoopKind::While,
                        condition: Some(condition),
                        body: Box::new(body_block),
                    }
                } else {
                    let exit_test = self.negate(condition);
                    StructuredBlock::Loop {
                        label,
                        kind: LoopKind::Infinite,
                        condition: None,
                        body: Box::new(StructuredBlock::sequence(vec![
                            header,
                            StructuredBlock::If {
                                condition: exit_test,
                                then: Box::new(StructuredBlock::Break(label)),
                                otherwise: None,
                            },
                            body_block,
                        ])),
                    }
                };
                looped.replace_jumps(node, &StructuredBlock::Continue(label));
                looped.replace_jumps(follow, &StructuredBlock::Break(label));
                self.rebuild(node, looped, Exit::Jump(follow));
                true
            }

            Exit::Jump(target) if target == node || (continues_inside && target != node) => {
                let follow = if target == node {
                    raw_jumps.iter().find(|t| **t != node).copied()
                } else {
                    Some(target)
                };
                log::trace!("Infinite loop at {:?}", node);
                let label = self.fresh_label();
                let mut body = self.take_block(node);
                if target != node {
                    body = body.then(StructuredBlock::Break(label));
                }
                body.replace_jumps(node, &StructuredBlock::Continue(label));
                if let Some(follow) = follow {
                    body.replace_jumps(follow, &StructuredBlock::Break(label));
                }
                let looped = StructuredBlock::Loop {
                    label,
                    kind: LoopKind::Infinite,
                    condition: None,
                    body: Box::new(body),
                };
                self.rebuild(node, looped, follow.map_or(Exit::None, Exit::Jump));
                true
            }

            Exit::None if continues_inside => {
                let follow = raw_jumps.iter().find(|t| **t != node).copied();
                log::trace!("Infinite loop at {:?}", node);
                let label = self.fresh_label();
                let mut body = self.take_block(node);
                body.replace_jumps(node, &StructuredBlock::Continue(label));
                if let Some(follow) = follow {
                    body.replace_jumps(follow, &StructuredBlock::Break(label));
                }
                let looped = StructuredBlock::Loop {
                    label,
                    kind: LoopKind::Infinite,
                    condition: None,
                    body: Box::new(body),
                };
                self.rebuild(node, looped, follow.map_or(Exit::None, Exit::Jump));
                true
            }

            _ => false,
        }
    }

    /// Is `body` a single node between `header` and the back edge to it?
    fn loops_back(&self, body: BlockId, header: BlockId, preds: &Predecessors) -> bool {
        if !self.absorbable(body, header, preds) {
            return false;
        }
        match self.graph.nodes.get(&body) {
            Some(n) => match n.exit {
                Exit::Jump(target) => target == header,
                Exit::None => n.raw_jumps.contains(&header),
                _ => false,
            },
            None => false,
        }
    }

    /// `switch` whose cases are single nodes (falling through in layout order) with one follow
    pub(super) fn reduce_switch(&mut self, node: BlockId, preds: &Predecessors) -> bool {
        let (selector, keyed, default) = match self.exit_of(node) {
            Some(Exit::Switch {
                selector,
                cases,
                default,
            }) => (selector, cases, default),
            _ => return false,
        };
        let mut targets: BTreeSet<BlockId> = keyed.iter().map(|(_, t)| *t).collect();
        targets.insert(default);

        let node_regions = self.graph.regions_of(node);
        let bodies: Vec<BlockId> = targets
            .iter()
            .filter(|target| {
                **target != node
                    && **target != self.graph.entry
                    && !self.graph.is_handler(**target)
                    && self.graph.regions_of(**target) == node_regions
                    && preds[*target]
                        .iter()
                        .all(|p| *p == node || targets.contains(p))
            })
            .copied()
            .collect();

        // A target that some case jumps to (rather than falls into) is where the switch ends
        let mut bodies = bodies;
        loop {
            let jumped_to: BTreeSet<BlockId> = bodies
                .iter()
                .enumerate()
                .flat_map(|(index, body)| {
                    let next = bodies.get(index + 1).copied();
                    let mut successors = self.graph.nodes[body].successors();
                    successors.retain(|target| Some(*target) != next && target != body);
                    successors
                })
                .filter(|target| bodies.contains(target))
                .collect();
            if jumped_to.is_empty() {
                break;
            }
            bodies.retain(|body| !jumped_to.contains(body));
        }

        // Single place every non-fallthrough path continues at
        let mut follows: BTreeSet<BlockId> = targets
            .iter()
            .filter(|t| !bodies.contains(t))
            .copied()
            .collect();
        for (index, body) in bodies.iter().enumerate() {
            let next = bodies.get(index + 1).copied();
            let body_node = &self.graph.nodes[body];
            if body_node.raw_jumps.iter().any(|t| bodies.contains(t)) {
                return false;
            }
            match body_node.exit {
                Exit::None => (),
                Exit::Jump(target) if Some(target) == next => (),
                Exit::Jump(target) if !bodies.contains(&target) => {
                    follows.insert(target);
                }
                _ => return false,
            }
            let allowed_pred = index.checked_sub(1).map(|i| bodies[i]);
            let ok_preds = preds[body].iter().all(|p| {
                *p == node
                    || (Some(*p) == allowed_pred
                        && self.graph.nodes[p].exit == Exit::Jump(*body))
            });
            if !ok_preds {
                return false;
            }
        }
        if follows.len() > 1 {
            return false;
        }
        let follow = follows.into_iter().next();

        log::trace!("Switch at {:?} with {} case bodies", node, bodies.len());
        let label = self.fresh_label();
        let mut cases = vec![];
        let to_follow: Vec<i32> = keyed
            .iter()
            .filter(|(_, t)| Some(*t) == follow)
            .map(|(value, _)| *value)
            .collect();
        if !to_follow.is_empty() {
            cases.push(Case {
                values: to_follow,
                is_default: false,
                body: StructuredBlock::Break(label),
            });
        }
        let last = bodies.len().saturating_sub(1);
        for (index, body_id) in bodies.iter().enumerate() {
            let absorbed = self.absorb(*body_id);
            let mut body = absorbed.block;
            if let Some(follow) = follow {
                body.replace_jumps(follow, &StructuredBlock::Break(label));
                if absorbed.exit == Exit::Jump(follow) && index != last {
                    body = body.then(StructuredBlock::Break(label));
                }
            }
            cases.push(Case {
                values: keyed
                    .iter()
                    .filter(|(_, t)| t == body_id)
                    .map(|(value, _)| *value)
                    .collect(),
                is_default: default == *body_id,
                body,
            });
        }

        let block = self.take_block(node).then(StructuredBlock::Switch {
            label,
            selector,
            cases,
        });
        self.rebuild(node, block, follow.map_or(Exit::None, Exit::Jump));
        true
    }

    /// `try { .. } catch ..` once the protected code is a single node
    pub(super) fn reduce_try(&mut self, node: BlockId, preds: &Predecessors) -> bool {
        let group: Vec<usize> = self
            .graph
            .regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.protected.len() == 1 && region.protected.contains(&node))
            .map(|(index, _)| index)
            .collect();
        if group.is_empty() {
            return false;
        }

        let mut outer_regions = self.graph.regions_of(node);
        for index in &group {
            outer_regions.remove(index);
        }

        // Distinct handlers, in search order
        let mut handlers: Vec<BlockId> = vec![];
        for index in &group {
            let handler = self.graph.regions[*index].handler;
            if !handlers.contains(&handler) {
                handlers.push(handler);
            }
        }
        let catch_all = handlers.last().copied().filter(|handler| {
            group.iter().any(|index| {
                let region = &self.graph.regions[*index];
                region.handler == *handler && region.catch_type.is_none()
            })
        });

        // Besides the protected node, the catch-all may only cover the other handlers
        let mut covering: Vec<usize> = vec![];
        for (index, region) in self.graph.regions.iter().enumerate() {
            if group.contains(&index) || !handlers.contains(&region.handler) {
                continue;
            }
            let covers_catches = Some(region.handler) == catch_all
                && region
                    .protected
                    .iter()
                    .all(|protected| handlers.contains(protected) && Some(*protected) != catch_all);
            if !covers_catches {
                return false;
            }
            covering.push(index);
        }

        for handler in &handlers {
            let mut handler_regions = self.graph.regions_of(*handler);
            for index in &covering {
                handler_regions.remove(index);
            }
            let reached_from = if Some(*handler) == catch_all {
                preds[handler]
                    .iter()
                    .all(|pred| *pred == node || handlers.contains(pred))
            } else {
                preds[handler].len() == 1
            };
            let ok = *handler != node
                && *handler != self.graph.entry
                && preds[handler].contains(&node)
                && reached_from
                && handler_regions == outer_regions;
            if !ok {
                return false;
            }
        }

        // Nodes holding nothing but the `finally` copy for the body or a catch
        let finally = match catch_all {
            Some(catch_all) if self.detect_finally => self.handler_finally_code(catch_all),
            _ => None,
        };
        let mut copies: BTreeMap<BlockId, BlockId> = BTreeMap::new();
        let mut exits = vec![];
        for source in std::iter::once(node).chain(handlers.iter().copied()) {
            let exit = self.exit_of(source);
            let copy = match (&finally, &exit) {
                (Some(finally), Some(Exit::Jump(target)))
                    if Some(source) != catch_all
                        && self.is_finally_copy(*target, source, finally, &outer_regions, preds) =>
                {
                    Some(*target)
                }
                _ => None,
            };
            match copy {
                Some(copy) => {
                    copies.insert(source, copy);
                    exits.push(self.exit_of(copy));
                }
                None => exits.push(exit),
            }
        }

        let mut follow: Option<BlockId> = None;
        for exit in exits {
            match exit {
                Some(Exit::None) => (),
                Some(Exit::Jump(target)) if follow.map_or(true, |f| f == target) => {
                    follow = Some(target)
                }
                _ => return false,
            }
        }

        log::trace!("Try at {:?} with {} handlers", node, handlers.len());
        let mut catches = vec![];
        for handler in &handlers {
            let catch_type = group
                .iter()
                .map(|index| &self.graph.regions[*index])
                .find(|region| region.handler == *handler)
                .and_then(|region| region.catch_type.clone());
            let mut block = self.absorb(*handler).block;
            if let Some(copy) = copies.get(handler) {
                block = block.then(self.absorb(*copy).block);
            }
            let (binding, body) = self.split_binding(block);
            catches.push(Catch {
                catch_type,
                binding,
                body,
            });
        }
        let mut removed: Vec<usize> = group.iter().chain(&covering).copied().collect();
        removed.sort_unstable();
        for index in removed.into_iter().rev() {
            self.graph.regions.remove(index);
        }

        let mut body = self.take_block(node);
        if let Some(copy) = copies.get(&node) {
            body = body.then(self.absorb(*copy).block);
        }
        // The catches are themselves protected by the catch-all, so they nest inside it
        let try_catch = match catches.pop() {
            Some(catch_all) if !covering.is_empty() => StructuredBlock::TryCatch {
                body: Box::new(StructuredBlock::TryCatch {
                    body: Box::new(body),
                    catches,
                    finally: None,
                }),
                catches: vec![catch_all],
                finally: None,
            },
            last => {
                catches.extend(last);
                StructuredBlock::TryCatch {
                    body: Box::new(body),
                    catches,
                    finally: None,
                }
            }
        };
        let (block, exit) = self.build_try(node, try_catch, follow, preds);
        self.rebuild(node, block, exit);
        true
    }

    /// Split the store of the caught exception off the start of a handler
    fn split_binding(&mut self, block: StructuredBlock) -> (Option<ExprId>, StructuredBlock) {
        let mut statements = block.into_statements();
        let first = match statements.first() {
            Some(StructuredBlock::Instruction(expr)) => *expr,
            _ => return (None, StructuredBlock::sequence(statements)),
        };
        let node = &self.arena[first];
        let of_thrown = node
            .children
            .first()
            .map_or(false, |child| matches!(self.arena[*child].operator, Operator::Thrown(_)));
        match node.operator {
            Operator::LocalStore { .. } if of_thrown => {
                statements.remove(0);
                (Some(first), StructuredBlock::sequence(statements))
            }
            Operator::Thrown(_) => {
                // caught exception discarded with `pop`
                statements.remove(0);
                self.arena.detach(first);
                (None, StructuredBlock::sequence(statements))
            }
            _ => (None, StructuredBlock::sequence(statements)),
        }
    }
}
