//! Expression trees
//!
//! Every value the decompiled method computes is a node in an [`ExprArena`]. Nodes are addressed
//! by [`ExprId`] and never move, so the structured blocks, the local variable table, and the
//! inference worklist can all refer to them by index. Each node knows its parent, which is what
//! lets inference propagate a narrowed type both up and down the tree.
//!
//! Nodes are only ever added. When a subtree gets replaced (by simplification or by inlining a
//! temporary) the old node is marked detached and ignored from then on.

mod constraints;
mod inference;
mod operator;
mod simplify;

pub use constraints::*;
pub use inference::*;
pub use operator::*;
pub use simplify::*;

use crate::types::Type;
use crate::util::Offset;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Handle to a node in an [`ExprArena`]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExprId(pub u32);

impl ExprId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Expression node
#[derive(Debug, Clone)]
pub struct Expr<'g> {
    pub operator: Operator,

    /// Set of types the value may have (narrowed by inference)
    pub ty: Type<'g>,

    pub children: Vec<ExprId>,

    /// Enclosing node, or `None` for the root of a statement or condition
    pub parent: Option<ExprId>,

    /// Offset of the instruction this node was decoded from
    pub address: Offset,

    /// Set after a type conflict: inference leaves the node alone from then on
    pub erroneous: bool,

    /// Set when the node has been replaced and is no longer part of any tree
    pub detached: bool,
}

/// Arena of expression nodes for one method
#[derive(Debug, Clone, Default)]
pub struct ExprArena<'g> {
    nodes: Vec<Expr<'g>>,

    /// Types that roots must be assignable to (the returned value, for instance)
    requirements: HashMap<ExprId, Type<'g>>,
}

impl<'g> ExprArena<'g> {
    pub fn new() -> Self {
        ExprArena {
            nodes: vec![],
            requirements: HashMap::new(),
        }
    }

    /// Require the value of a root to be one of `typ`
    ///
    /// The requirement follows the root through [`ExprArena::replace`].
    pub fn require(&mut self, root: ExprId, typ: Type<'g>) {
        self.requirements.insert(root, typ);
    }

    /// Type a node's context requires of it, apart from its parent's operand constraint
    pub fn requirement(&self, id: ExprId) -> Type<'g> {
        self.requirements.get(&id).copied().unwrap_or(Type::Unknown)
    }

    /// Add a node with the given children, which become parented to the new node
    ///
    /// The type starts out as [`Type::Unknown`].
    pub fn push(&mut self, operator: Operator, children: Vec<ExprId>, address: Offset) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        for child in &children {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Expr {
            operator,
            ty: Type::Unknown,
            children,
            parent: None,
            address,
            erroneous: false,
            detached: false,
        });
        id
    }

    /// Add a leaf node
    pub fn leaf(&mut self, operator: Operator, address: Offset) -> ExprId {
        self.push(operator, vec![], address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ExprId> {
        (0..self.nodes.len() as u32).map(ExprId)
    }

    pub fn get(&self, id: ExprId) -> Option<&Expr<'g>> {
        self.nodes.get(id.index())
    }

    /// Replace the `index`-th child of `parent`, detaching the old child
    pub fn replace_child(&mut self, parent: ExprId, index: usize, with: ExprId) {
        let old = self.nodes[parent.index()].children[index];
        if old == with {
            return;
        }
        self.nodes[old.index()].detached = true;
        self.nodes[old.index()].parent = None;
        self.nodes[parent.index()].children[index] = with;
        self.nodes[with.index()].parent = Some(parent);
    }

    /// Put `with` wherever `old` is (in its parent, if it has one) and detach `old`
    ///
    /// Returns whether `old` was a root, in which case whoever holds the root must be updated.
    pub fn replace(&mut self, old: ExprId, with: ExprId) -> bool {
        match self.nodes[old.index()].parent {
            Some(parent) => {
                let index = self.nodes[parent.index()]
                    .children
                    .iter()
                    .position(|child| *child == old);
                if let Some(index) = index {
                    self.replace_child(parent, index, with);
                }
                false
            }
            None => {
                self.detach(old);
                self.nodes[with.index()].parent = None;
                if let Some(requirement) = self.requirements.remove(&old) {
                    self.requirements.insert(with, requirement);
                }
                true
            }
        }
    }

    /// Mark a node as no longer reachable from any statement
    pub fn detach(&mut self, id: ExprId) {
        self.nodes[id.index()].detached = true;
    }

    /// Is the node still part of a live tree?
    pub fn is_live(&self, mut id: ExprId) -> bool {
        loop {
            let node = &self.nodes[id.index()];
            if node.detached {
                return false;
            }
            match node.parent {
                Some(parent) => id = parent,
                None => return true,
            }
        }
    }

    /// The node and all of its descendants, parents before children
    pub fn descendants(&self, root: ExprId) -> Vec<ExprId> {
        let mut found = vec![];
        let mut to_visit = vec![root];
        while let Some(id) = to_visit.pop() {
            found.push(id);
            to_visit.extend(self.nodes[id.index()].children.iter().rev());
        }
        found
    }

    /// Structural equality of two trees (operators and shapes, not types or addresses)
    pub fn deep_eq(&self, a: ExprId, b: ExprId) -> bool {
        let (a, b) = (&self[a], &self[b]);
        a.operator == b.operator
            && a.children.len() == b.children.len()
            && a.children
                .iter()
                .zip(b.children.iter())
                .all(|(x, y)| self.deep_eq(*x, *y))
    }

    /// Copy a tree, giving every node of the copy the same operator and type
    pub fn deep_clone(&mut self, root: ExprId) -> ExprId {
        let children: Vec<ExprId> = self[root].children.clone();
        let cloned_children = children.into_iter().map(|child| self.deep_clone(child)).collect();
        let node = &self[root];
        let (operator, ty, address) = (node.operator.clone(), node.ty, node.address);
        let id = self.push(operator, cloned_children, address);
        self[id].ty = ty;
        id
    }
}

impl<'g> Index<ExprId> for ExprArena<'g> {
    type Output = Expr<'g>;

    fn index(&self, id: ExprId) -> &Expr<'g> {
        &self.nodes[id.index()]
    }
}

impl<'g> IndexMut<ExprId> for ExprArena<'g> {
    fn index_mut(&mut self, id: ExprId) -> &mut Expr<'g> {
        &mut self.nodes[id.index()]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parent_links() {
        let mut arena = ExprArena::new();
        let one = arena.leaf(Operator::Constant(ConstantValue::Int(1)), Offset(0));
        let two = arena.leaf(Operator::Constant(ConstantValue::Int(2)), Offset(1));
        let sum = arena.push(
            Operator::Binary(BinaryOp::Add, NumericFamily::Int),
            vec![one, two],
            Offset(2),
        );

        assert_eq!(arena[one].parent, Some(sum));
        assert_eq!(arena[sum].parent, None);
        assert_eq!(arena.descendants(sum), vec![sum, one, two]);

        let three = arena.leaf(Operator::Constant(ConstantValue::Int(3)), Offset(3));
        arena.replace_child(sum, 1, three);
        assert!(!arena.is_live(two), "replaced child is detached");
        assert!(arena.is_live(three));
        assert_eq!(arena[sum].children, vec![one, three]);
    }

    #[test]
    fn structural_equality() {
        let mut arena = ExprArena::new();
        let a = arena.leaf(Operator::Constant(ConstantValue::Int(1)), Offset(0));
        let neg_a = arena.push(Operator::Negate(NumericFamily::Int), vec![a], Offset(1));
        let b = arena.leaf(Operator::Constant(ConstantValue::Int(1)), Offset(7));
        let neg_b = arena.push(Operator::Negate(NumericFamily::Int), vec![b], Offset(8));
        let c = arena.leaf(Operator::Constant(ConstantValue::Int(2)), Offset(9));

        assert!(arena.deep_eq(neg_a, neg_b), "addresses don't matter");
        assert!(!arena.deep_eq(a, c));

        let copy = arena.deep_clone(neg_a);
        assert!(copy != neg_a && arena.deep_eq(copy, neg_a));
        assert_eq!(arena[a].parent, Some(neg_a), "original is untouched");
    }
}
