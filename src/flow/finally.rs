use super::structurer::Structurer;
use super::{Catch, Exit, Label, StructuredBlock};
use crate::expr::{ExprArena, Operator};
use crate::jvm::code::BlockId;
use std::collections::{BTreeMap, BTreeSet};

impl<'a, 'g> Structurer<'a, 'g> {
    /// Recognize a `finally` block in a freshly built `try`
    ///
    /// Compilers emit `finally` code once per way out of the `try`: a catch-everything handler
    /// `t = thrown; F; throw t`, plus a copy of `F` before every normal exit (completing the body
    /// or a catch, `return`, and jumps out). When every exit has its copy, the copies are removed,
    /// the handler becomes the `finally` block, and a directly nested `try` is merged in. If any
    /// exit lacks a copy, the block is returned unchanged (a catch of everything).
    pub(super) fn extract_finally(&mut self, block: StructuredBlock) -> StructuredBlock {
        let (body, mut catches) = match block {
            StructuredBlock::TryCatch {
                body,
                catches,
                finally: None,
            } => (body, catches),
            other => return other,
        };

        let finally = match catches.last() {
            Some(catch) if catch.catch_type.is_none() => self.finally_code(catch),
            _ => None,
        };
        let finally = match finally {
            Some(finally) => finally,
            None => {
                return StructuredBlock::TryCatch {
                    body,
                    catches,
                    finally: None,
                }
            }
        };

        let (mut inner_body, mut inner_catches, merged) = match *body {
            StructuredBlock::TryCatch {
                body: inner,
                catches: inner_catches,
                finally: None,
            } if catches.len() == 1 => (*inner, inner_catches, true),
            other => (other, catches[..catches.len() - 1].to_vec(), false),
        };

        let stripped_body = strip_copies(self.arena, &inner_body, &finally);
        let stripped_catches: Option<Vec<StructuredBlock>> = inner_catches
            .iter()
            .map(|catch| strip_copies(self.arena, &catch.body, &finally))
            .collect();

        let (stripped_body, stripped_catches) = match (stripped_body, stripped_catches) {
            (Some(body), Some(catch_bodies)) => (body, catch_bodies),
            _ => {
                log::debug!("Catch-all handler has no finally copies on every exit");
                let body = if merged {
                    // put the nested `try` back the way it was
                    StructuredBlock::TryCatch {
                        body: Box::new(inner_body),
                        catches: inner_catches,
                        finally: None,
                    }
                } else {
                    inner_body
                };
                return StructuredBlock::TryCatch {
                    body: Box::new(body),
                    catches,
                    finally: None,
                };
            }
        };

        detach_removed(self.arena, &inner_body, &stripped_body);
        inner_body = stripped_body;
        for (catch, stripped) in inner_catches.iter_mut().zip(stripped_catches) {
            detach_removed(self.arena, &catch.body, &stripped);
            catch.body = stripped;
        }

        log::debug!("Extracted finally block of {} statements", finally.len());
        if let Some(catch_all) = catches.pop() {
            if let Some(binding) = catch_all.binding {
                self.arena.detach(binding);
            }
            if let Some(StructuredBlock::Throw(rethrown)) = catch_all.body.statements().last() {
                self.arena.detach(*rethrown);
            }
        }
        let finally_block = StructuredBlock::sequence(finally);
        StructuredBlock::TryCatch {
            body: Box::new(inner_body),
            catches: inner_catches,
            finally: Some(Box::new(finally_block)),
        }
    }

    /// Build the `try` with its `finally`, taking in the copy that follows the protected code
    ///
    /// The copy for normal completion usually sits right after the protected range, at the start
    /// of the follow node. When the follow is only reached from `node` and starts with that copy,
    /// the copy moves to the end of the `try` body and the rest of the follow is sequenced after
    /// the `try`. Returns the new block and exit of `node`.
    pub(super) fn build_try(
        &mut self,
        node: BlockId,
        try_catch: StructuredBlock,
        follow: Option<BlockId>,
        preds: &BTreeMap<BlockId, BTreeSet<BlockId>>,
    ) -> (StructuredBlock, Exit) {
        let exit = follow.map_or(Exit::None, Exit::Jump);
        if !self.detect_finally {
            return (try_catch, exit);
        }
        if let Some(follow) = follow {
            if let Some(pulled) = self.with_follow_copy(node, &try_catch, follow, preds) {
                let extracted = self.extract_finally(pulled.0);
                if matches!(extracted, StructuredBlock::TryCatch { finally: Some(_), .. }) {
                    log::trace!("Finally copy taken from {:?}", follow);
                    let absorbed = self.graph.take_node(follow);
                    let exit = absorbed.map_or(Exit::None, |n| n.exit);
                    return (extracted.then(pulled.1), exit);
                }
            }
        }
        (self.extract_finally(try_catch), exit)
    }

    /// The `try` with the follow's leading `finally` copy appended to its body, and the rest of
    /// the follow
    fn with_follow_copy(
        &self,
        node: BlockId,
        try_catch: &StructuredBlock,
        follow: BlockId,
        preds: &BTreeMap<BlockId, BTreeSet<BlockId>>,
    ) -> Option<(StructuredBlock, StructuredBlock)> {
        let (body, catches) = match try_catch {
            StructuredBlock::TryCatch {
                body,
                catches,
                finally: None,
            } => (body, catches),
            _ => return None,
        };
        let catch_all = catches.last().filter(|catch| catch.catch_type.is_none())?;
        let finally = self.finally_code(catch_all)?;

        if !self.absorbable(follow, node, preds) || body.jump_targets().contains(&follow) {
            return None;
        }

        let statements = self.graph.nodes.get(&follow)?.block.statements().to_vec();
        if !ends_with(self.arena, &statements, finally.len(), &finally) {
            return None;
        }
        let (copy, rest) = statements.split_at(finally.len());
        let body = (**body).clone().then(StructuredBlock::sequence(copy.to_vec()));
        Some((
            StructuredBlock::TryCatch {
                body: Box::new(body),
                catches: catches.clone(),
                finally: None,
            },
            StructuredBlock::sequence(rest.to_vec()),
        ))
    }

    /// `F` out of a handler node that is still in the graph
    pub(super) fn handler_finally_code(&self, handler: BlockId) -> Option<Vec<StructuredBlock>> {
        let statements = self.graph.nodes.get(&handler)?.block.statements();
        let (first, rest) = statements.split_first()?;
        let binding = match first {
            StructuredBlock::Instruction(expr) => *expr,
            _ => return None,
        };
        let of_thrown = self.arena[binding]
            .children
            .first()
            .map_or(false, |child| matches!(self.arena[*child].operator, Operator::Thrown(_)));
        if !of_thrown {
            return None;
        }
        self.finally_code(&Catch {
            catch_type: None,
            binding: Some(binding),
            body: StructuredBlock::sequence(rest.to_vec()),
        })
    }

    /// Is `copy` a node holding just the `finally` code, run when `source` completes normally?
    pub(super) fn is_finally_copy(
        &self,
        copy: BlockId,
        source: BlockId,
        finally: &[StructuredBlock],
        regions: &BTreeSet<usize>,
        preds: &BTreeMap<BlockId, BTreeSet<BlockId>>,
    ) -> bool {
        let copy_node = match self.graph.nodes.get(&copy) {
            Some(copy_node) => copy_node,
            None => return false,
        };
        let statements = copy_node.block.statements();
        copy != self.graph.entry
            && !self.graph.is_handler(copy)
            && preds.get(&copy).map_or(false, |p| p.len() == 1 && p.contains(&source))
            && self.graph.regions_of(copy) == *regions
            && copy_node.raw_jumps.is_empty()
            && statements.len() == finally.len()
            && ends_with(self.arena, statements, finally.len(), finally)
    }

    /// `F` out of a `t = thrown; F; throw t` handler
    fn finally_code(&self, catch: &Catch) -> Option<Vec<StructuredBlock>> {
        let binding = catch.binding?;
        let local = match self.arena[binding].operator {
            Operator::LocalStore { local, .. } => local,
            _ => return None,
        };
        let statements = catch.body.statements();
        let (last, code) = statements.split_last()?;
        let rethrows = match last {
            StructuredBlock::Throw(expr) => {
                self.arena[*expr].operator == Operator::LocalLoad(local)
            }
            _ => false,
        };
        if rethrows && !code.is_empty() {
            Some(code.to_vec())
        } else {
            None
        }
    }
}

/// Labels of loops, switches, and labeled blocks nested in a block
fn defined_labels(block: &StructuredBlock) -> BTreeSet<Label> {
    let mut labels = BTreeSet::new();
    block.visit(&mut |b| match b {
        StructuredBlock::Loop { label, .. }
        | StructuredBlock::Switch { label, .. }
        | StructuredBlock::Labeled { label, .. } => {
            labels.insert(*label);
        }
        _ => (),
    });
    labels
}

/// Does the statement leave the protected code?
fn is_exit(statement: &StructuredBlock, inner_labels: &BTreeSet<Label>) -> bool {
    match statement {
        StructuredBlock::Return(_) | StructuredBlock::Jump(_) => true,
        StructuredBlock::Break(label) | StructuredBlock::Continue(label) => {
            !inner_labels.contains(label)
        }
        _ => false,
    }
}

/// The block without the copy of `finally` before each of its exits, if every exit has one
fn strip_copies(
    arena: &ExprArena<'_>,
    block: &StructuredBlock,
    finally: &[StructuredBlock],
) -> Option<StructuredBlock> {
    let inner_labels = defined_labels(block);
    let mut candidate = block.clone();
    if !strip_exits(arena, &mut candidate, finally, &inner_labels) {
        return None;
    }
    if candidate.completes_normally() {
        let mut statements = candidate.into_statements();
        if !ends_with(arena, &statements, statements.len(), finally) {
            return None;
        }
        statements.truncate(statements.len() - finally.len());
        candidate = StructuredBlock::sequence(statements);
    }
    Some(candidate)
}

/// Detach the expressions that stripping removed
fn detach_removed(arena: &mut ExprArena<'_>, original: &StructuredBlock, stripped: &StructuredBlock) {
    let kept: BTreeSet<_> = stripped.expressions().into_iter().collect();
    for expr in original.expressions() {
        if !kept.contains(&expr) {
            arena.detach(expr);
        }
    }
}

/// Strip copies before `return`/`break`/`continue` statements, recursively
fn strip_exits(
    arena: &ExprArena<'_>,
    block: &mut StructuredBlock,
    finally: &[StructuredBlock],
    inner_labels: &BTreeSet<Label>,
) -> bool {
    let mut ok = true;
    match block {
        StructuredBlock::Sequence(statements) => {
            let mut index = 0;
            while index < statements.len() {
                if is_exit(&statements[index], inner_labels) {
                    if ends_with(arena, statements, index, finally) {
                        let start = index - finally.len();
                        statements.drain(start..index);
                        index = start;
                    } else {
                        ok = false;
                    }
                } else {
                    ok &= strip_exits(arena, &mut statements[index], finally, inner_labels);
                }
                index += 1;
            }
            if statements.len() == 1 {
                *block = StructuredBlock::sequence(std::mem::take(statements));
            }
        }
        StructuredBlock::If { then, otherwise, .. } => {
            ok &= strip_exits(arena, then, finally, inner_labels);
            if let Some(otherwise) = otherwise {
                ok &= strip_exits(arena, otherwise, finally, inner_labels);
            }
        }
        StructuredBlock::Loop { body, .. } | StructuredBlock::Labeled { body, .. } => {
            ok &= strip_exits(arena, body, finally, inner_labels);
        }
        StructuredBlock::Switch { cases, .. } => {
            for case in cases {
                ok &= strip_exits(arena, &mut case.body, finally, inner_labels);
            }
        }
        StructuredBlock::TryCatch { body, catches, .. } => {
            ok &= strip_exits(arena, body, finally, inner_labels);
            for catch in catches {
                ok &= strip_exits(arena, &mut catch.body, finally, inner_labels);
            }
        }
        other => ok = !is_exit(other, inner_labels),
    }
    ok
}

/// Do the statements just before `end` match `finally`?
fn ends_with(
    arena: &ExprArena<'_>,
    statements: &[StructuredBlock],
    end: usize,
    finally: &[StructuredBlock],
) -> bool {
    end >= finally.len()
        && statements[end - finally.len()..end]
            .iter()
            .zip(finally)
            .all(|(a, b)| same_statement(arena, a, b))
}

/// Structural equality of statements, comparing expressions by shape
pub fn same_statement(arena: &ExprArena<'_>, a: &StructuredBlock, b: &StructuredBlock) -> bool {
    use StructuredBlock as B;
    match (a, b) {
        (B::Empty, B::Empty) => true,
        (B::Instruction(x), B::Instruction(y)) | (B::Throw(x), B::Throw(y)) => arena.deep_eq(*x, *y),
        (B::Return(x), B::Return(y)) => match (x, y) {
            (Some(x), Some(y)) => arena.deep_eq(*x, *y),
            (None, None) => true,
            _ => false,
        },
        (B::Sequence(xs), B::Sequence(ys)) => {
            xs.len() == ys.len()
                && xs.iter().zip(ys).all(|(x, y)| same_statement(arena, x, y))
        }
        (
            B::If {
                condition: c1,
                then: t1,
                otherwise: o1,
            },
            B::If {
                condition: c2,
                then: t2,
                otherwise: o2,
            },
        ) => {
            arena.deep_eq(*c1, *c2)
                && same_statement(arena, t1, t2)
                && match (o1, o2) {
                    (Some(o1), Some(o2)) => same_statement(arena, o1, o2),
                    (None, None) => true,
                    _ => false,
                }
        }
        (B::Break(x), B::Break(y)) | (B::Continue(x), B::Continue(y)) => x == y,
        (B::Jump(x), B::Jump(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::{ExprId, MonitorKind};
    use crate::locals::LocalId;
    use crate::util::Offset;

    fn monitor_exit(arena: &mut ExprArena<'_>) -> StructuredBlock {
        let lock = arena.leaf(Operator::LocalLoad(LocalId(1)), Offset(0));
        StructuredBlock::Instruction(arena.push(
            Operator::Monitor(MonitorKind::Exit),
            vec![lock],
            Offset(1),
        ))
    }

    fn call(arena: &mut ExprArena<'_>, value: i32) -> ExprId {
        arena.leaf(
            Operator::Constant(crate::expr::ConstantValue::Int(value)),
            Offset(value as usize),
        )
    }

    #[test]
    fn copies_before_every_exit() {
        let mut arena = ExprArena::new();
        let finally = vec![monitor_exit(&mut arena)];

        let value = call(&mut arena, 3);
        let copy_a = monitor_exit(&mut arena);
        let copy_b = monitor_exit(&mut arena);
        let condition = call(&mut arena, 4);
        let body = StructuredBlock::sequence(vec![
            StructuredBlock::Instruction(call(&mut arena, 2)),
            StructuredBlock::If {
                condition,
                then: Box::new(StructuredBlock::sequence(vec![
                    copy_a,
                    StructuredBlock::Return(Some(value)),
                ])),
                otherwise: None,
            },
            copy_b,
        ]);

        let body = strip_copies(&arena, &body, &finally).unwrap();
        assert_eq!(body.statements().len(), 2);
        assert!(matches!(
            body.statements()[1],
            StructuredBlock::If { ref then, .. } if **then == StructuredBlock::Return(Some(value))
        ));
    }

    #[test]
    fn missing_copy_leaves_block_alone() {
        let mut arena = ExprArena::new();
        let finally = vec![monitor_exit(&mut arena)];
        let copy = monitor_exit(&mut arena);
        let first = call(&mut arena, 1);
        let original = StructuredBlock::sequence(vec![
            copy,
            StructuredBlock::Instruction(first),
            StructuredBlock::Return(None),
        ]);

        assert_eq!(strip_copies(&arena, &original, &finally), None);
        assert!(arena.is_live(first));
    }
}
