use crate::expr::ExprId;
use crate::jvm::code::{BlockId, LabelGenerator};
use crate::jvm::BinaryName;
use std::fmt;

/// Label of a loop, switch, or labeled block (the target of `break` and `continue`)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label{}", self.0)
    }
}

/// Hands out labels in increasing order
#[derive(Clone, Debug, Default)]
pub struct LabelCounter(u32);

impl LabelGenerator<Label> for LabelCounter {
    fn fresh_label(&mut self) -> Label {
        let label = Label(self.0);
        self.0 += 1;
        label
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopKind {
    /// Condition tested before the body
    While,

    /// Condition tested after the body
    DoWhile,

    /// No condition (left with `break`, `return`, or `throw`)
    Infinite,
}

/// Stack manipulation kept as-is
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

impl StackOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            StackOp::Pop => "pop",
            StackOp::Pop2 => "pop2",
            StackOp::Dup => "dup",
            StackOp::DupX1 => "dup_x1",
            StackOp::DupX2 => "dup_x2",
            StackOp::Dup2 => "dup2",
            StackOp::Dup2X1 => "dup2_x1",
            StackOp::Dup2X2 => "dup2_x2",
            StackOp::Swap => "swap",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    pub values: Vec<i32>,
    pub is_default: bool,
    pub body: StructuredBlock,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Catch {
    /// `None` catches everything
    pub catch_type: Option<BinaryName>,

    /// Store of the caught exception into its variable (`LocalStore` of `Thrown`)
    pub binding: Option<ExprId>,

    pub body: StructuredBlock,
}

/// Structured statement tree
#[derive(Clone, Debug, PartialEq)]
pub enum StructuredBlock {
    Empty,

    /// Expression evaluated for its effect
    Instruction(ExprId),

    Sequence(Vec<StructuredBlock>),

    If {
        condition: ExprId,
        then: Box<StructuredBlock>,
        otherwise: Option<Box<StructuredBlock>>,
    },

    Loop {
        label: Label,
        kind: LoopKind,
        condition: Option<ExprId>,
        body: Box<StructuredBlock>,
    },

    Switch {
        label: Label,
        selector: ExprId,
        cases: Vec<Case>,
    },

    TryCatch {
        body: Box<StructuredBlock>,
        catches: Vec<Catch>,
        finally: Option<Box<StructuredBlock>>,
    },

    Labeled {
        label: Label,
        body: Box<StructuredBlock>,
    },

    Break(Label),
    Continue(Label),
    Return(Option<ExprId>),
    Throw(ExprId),

    /// Raw edge to another block of the flow graph
    Jump(BlockId),

    /// Unresolved stack operation, as moves between stack-slot variables
    Special {
        op: StackOp,
        moves: Vec<ExprId>,
    },

    /// Blocks that could not be structured, connected by explicit jumps
    Unstructured(Vec<(BlockId, StructuredBlock)>),
}

impl Default for StructuredBlock {
    fn default() -> Self {
        StructuredBlock::Empty
    }
}

impl StructuredBlock {
    /// Sequence of blocks, with nested sequences and empty blocks flattened away
    pub fn sequence(blocks: Vec<StructuredBlock>) -> StructuredBlock {
        let mut flat = vec![];
        for block in blocks {
            match block {
                StructuredBlock::Empty => (),
                StructuredBlock::Sequence(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => StructuredBlock::Empty,
            1 => flat.pop().unwrap_or_default(),
            _ => StructuredBlock::Sequence(flat),
        }
    }

    /// This block followed by another
    pub fn then(self, next: StructuredBlock) -> StructuredBlock {
        StructuredBlock::sequence(vec![self, next])
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, StructuredBlock::Empty)
    }

    /// Statements, viewing a non-sequence as a sequence of one
    pub fn statements(&self) -> &[StructuredBlock] {
        match self {
            StructuredBlock::Sequence(blocks) => blocks,
            StructuredBlock::Empty => &[],
            other => std::slice::from_ref(other),
        }
    }

    /// Take the statements out of the block
    pub fn into_statements(self) -> Vec<StructuredBlock> {
        match self {
            StructuredBlock::Sequence(blocks) => blocks,
            StructuredBlock::Empty => vec![],
            other => vec![other],
        }
    }

    /// Can control reach the end of the block?
    pub fn completes_normally(&self) -> bool {
        match self {
            StructuredBlock::Break(_)
            | StructuredBlock::Continue(_)
            | StructuredBlock::Return(_)
            | StructuredBlock::Throw(_)
            | StructuredBlock::Jump(_)
            | StructuredBlock::Unstructured(_) => false,
            StructuredBlock::Sequence(blocks) => blocks.last().map_or(true, |b| b.completes_normally()),
            StructuredBlock::If { then, otherwise, .. } => match otherwise {
                None => true,
                Some(otherwise) => then.completes_normally() || otherwise.completes_normally(),
            },
            StructuredBlock::Loop {
                label, kind, body, ..
            } => *kind != LoopKind::Infinite || body.breaks_to(*label),
            StructuredBlock::Switch { label, cases, .. } => {
                !cases.iter().any(|case| case.is_default)
                    || cases.last().map_or(true, |case| case.body.completes_normally())
                    || cases.iter().any(|case| case.body.breaks_to(*label))
            }
            StructuredBlock::TryCatch {
                body,
                catches,
                finally,
            } => {
                let inner = body.completes_normally()
                    || catches.iter().any(|catch| catch.body.completes_normally());
                inner && finally.as_ref().map_or(true, |f| f.completes_normally())
            }
            StructuredBlock::Labeled { label, body } => {
                body.completes_normally() || body.breaks_to(*label)
            }
            StructuredBlock::Empty
            | StructuredBlock::Instruction(_)
            | StructuredBlock::Special { .. } => true,
        }
    }

    /// Does the block contain a `break` out of the given label?
    pub fn breaks_to(&self, label: Label) -> bool {
        let mut found = false;
        self.visit(&mut |block| {
            if *block == StructuredBlock::Break(label) {
                found = true;
            }
        });
        found
    }

    /// Does the block refer to the label (with `break` or `continue`)?
    pub fn refers_to(&self, label: Label) -> bool {
        let mut found = false;
        self.visit(&mut |block| match block {
            StructuredBlock::Break(l) | StructuredBlock::Continue(l) if *l == label => found = true,
            _ => (),
        });
        found
    }

    /// Visit every block in the tree, parents first
    pub fn visit(&self, f: &mut impl FnMut(&StructuredBlock)) {
        f(self);
        self.for_each_child(&mut |child| child.visit(f));
    }

    fn for_each_child(&self, f: &mut impl FnMut(&StructuredBlock)) {
        match self {
            StructuredBlock::Sequence(blocks) => blocks.iter().for_each(f),
            StructuredBlock::If { then, otherwise, .. } => {
                f(then);
                if let Some(otherwise) = otherwise {
                    f(otherwise);
                }
            }
            StructuredBlock::Loop { body, .. } | StructuredBlock::Labeled { body, .. } => f(body),
            StructuredBlock::Switch { cases, .. } => cases.iter().for_each(|case| f(&case.body)),
            StructuredBlock::TryCatch {
                body,
                catches,
                finally,
            } => {
                f(body);
                catches.iter().for_each(|catch| f(&catch.body));
                if let Some(finally) = finally {
                    f(finally);
                }
            }
            StructuredBlock::Unstructured(blocks) => blocks.iter().for_each(|(_, b)| f(b)),
            _ => (),
        }
    }

    /// Visit every block in the tree mutably, children first
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut StructuredBlock)) {
        match self {
            StructuredBlock::Sequence(blocks) => blocks.iter_mut().for_each(|b| b.visit_mut(f)),
            StructuredBlock::If { then, otherwise, .. } => {
                then.visit_mut(f);
                if let Some(otherwise) = otherwise {
                    otherwise.visit_mut(f);
                }
            }
            StructuredBlock::Loop { body, .. } | StructuredBlock::Labeled { body, .. } => {
                body.visit_mut(f)
            }
            StructuredBlock::Switch { cases, .. } => {
                cases.iter_mut().for_each(|case| case.body.visit_mut(f))
            }
            StructuredBlock::TryCatch {
                body,
                catches,
                finally,
            } => {
                body.visit_mut(f);
                catches.iter_mut().for_each(|catch| catch.body.visit_mut(f));
                if let Some(finally) = finally {
                    finally.visit_mut(f);
                }
            }
            StructuredBlock::Unstructured(blocks) => {
                blocks.iter_mut().for_each(|(_, b)| b.visit_mut(f))
            }
            _ => (),
        }
        f(self);
    }

    /// Every expression root held directly by a block of the tree
    pub fn expressions(&self) -> Vec<ExprId> {
        let mut found = vec![];
        self.visit(&mut |block| match block {
            StructuredBlock::Instruction(expr) | StructuredBlock::Throw(expr) => found.push(*expr),
            StructuredBlock::Return(value) => found.extend(value.iter().copied()),
            StructuredBlock::If { condition, .. } | StructuredBlock::Switch { selector: condition, .. } => {
                found.push(*condition)
            }
            StructuredBlock::Loop { condition, .. } => found.extend(condition.iter().copied()),
            StructuredBlock::TryCatch { catches, .. } => {
                found.extend(catches.iter().filter_map(|catch| catch.binding))
            }
            StructuredBlock::Special { moves, .. } => found.extend(moves.iter().copied()),
            _ => (),
        });
        found
    }

    /// Rewrite every expression root held directly by a block of the tree
    pub fn map_expressions(&mut self, f: &mut impl FnMut(ExprId) -> ExprId) {
        self.visit_mut(&mut |block| match block {
            StructuredBlock::Instruction(expr) | StructuredBlock::Throw(expr) => *expr = f(*expr),
            StructuredBlock::Return(Some(value)) => *value = f(*value),
            StructuredBlock::If { condition, .. }
            | StructuredBlock::Switch {
                selector: condition,
                ..
            }
            | StructuredBlock::Loop {
                condition: Some(condition),
                ..
            } => *condition = f(*condition),
            StructuredBlock::TryCatch { catches, .. } => {
                for catch in catches {
                    if let Some(binding) = catch.binding.as_mut() {
                        *binding = f(*binding);
                    }
                }
            }
            StructuredBlock::Special { moves, .. } => {
                for mv in moves {
                    *mv = f(*mv);
                }
            }
            _ => (),
        });
    }

    /// Targets of the raw jumps in the tree
    pub fn jump_targets(&self) -> Vec<BlockId> {
        let mut targets = vec![];
        self.visit(&mut |block| {
            if let StructuredBlock::Jump(target) = block {
                targets.push(*target);
            }
        });
        targets
    }

    /// Replace the raw jumps to `target` (outside of nested fallback blocks)
    pub fn replace_jumps(&mut self, target: BlockId, with: &StructuredBlock) {
        self.visit_mut(&mut |block| {
            if *block == StructuredBlock::Jump(target) {
                *block = with.clone();
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flattened_sequences() {
        let inner = StructuredBlock::sequence(vec![
            StructuredBlock::Instruction(ExprId(0)),
            StructuredBlock::Empty,
            StructuredBlock::Instruction(ExprId(1)),
        ]);
        let outer = inner.then(StructuredBlock::Return(None));
        assert_eq!(outer.statements().len(), 3);
        assert!(!outer.completes_normally());
        assert_eq!(
            StructuredBlock::sequence(vec![StructuredBlock::Empty]),
            StructuredBlock::Empty
        );
    }

    #[test]
    fn loops_and_breaks() {
        let mut labels = LabelCounter::default();
        let label = labels.fresh_label();
        let body = StructuredBlock::If {
            condition: ExprId(0),
            then: Box::new(StructuredBlock::Jump(BlockId(4))),
            otherwise: None,
        };
        let mut infinite = StructuredBlock::Loop {
            label,
            kind: LoopKind::Infinite,
            condition: None,
            body: Box::new(body),
        };
        assert!(!infinite.completes_normally());
        assert_eq!(infinite.jump_targets(), vec![BlockId(4)]);

        infinite.replace_jumps(BlockId(4), &StructuredBlock::Break(label));
        assert!(infinite.completes_normally(), "breaking out completes the loop");
        assert!(infinite.refers_to(label));
        assert_eq!(infinite.expressions(), vec![ExprId(0)]);
    }
}
