use super::{BinaryOp, CompareFamily, Comparison, ConstantValue, ExprArena, ExprId, NumericFamily, Operator};
use crate::types::{PrimitiveKinds, Type};

/// Rewrite a tree into a more readable but equivalent form
///
/// Simplified nodes replace the originals in their parents (the originals get detached). The
/// return value is the new root, which differs from `root` if the root itself was rewritten.
///
/// Rewrites:
///
///   - `!!x` to `x`, and `!` pushed into comparisons, `&&`, and `||`
///   - `lcmp`/`fcmp`/`dcmp` compared against `0` to a direct comparison
///   - `b == 0` to `!b` (and friends) when `b` is a `boolean`
///   - `x + 0`, `x * 1`, and similar identities to `x`
pub fn simplify(arena: &mut ExprArena<'_>, root: ExprId) -> ExprId {
    let children = arena[root].children.clone();
    for child in children {
        simplify(arena, child);
    }

    let mut current = root;
    while let Some(next) = simplify_node(arena, current) {
        log::trace!("Simplified {:?} to {:?}", current, next);
        arena.replace(current, next);
        current = next;
    }
    current
}

fn simplify_node(arena: &mut ExprArena<'_>, id: ExprId) -> Option<ExprId> {
    let node = &arena[id];
    let address = node.address;
    match (&node.operator, node.children.as_slice()) {
        (Operator::Not, [inner]) => {
            let inner = *inner;
            let inner_node = &arena[inner];
            match (&inner_node.operator, inner_node.children.as_slice()) {
                (Operator::Not, [operand]) => Some(*operand),
                (Operator::Compare(cmp, family), operands) => {
                    let operator = Operator::Compare(!*cmp, *family);
                    let operands = operands.to_vec();
                    Some(boolean_node(arena, operator, operands, address))
                }
                (Operator::LogicalAnd, [left, right]) => {
                    let (left, right) = (*left, *right);
                    Some(de_morgan(arena, Operator::LogicalOr, left, right, address))
                }
                (Operator::LogicalOr, [left, right]) => {
                    let (left, right) = (*left, *right);
                    Some(de_morgan(arena, Operator::LogicalAnd, left, right, address))
                }
                _ => None,
            }
        }

        (Operator::Compare(cmp, CompareFamily::Numeric(NumericFamily::Int)), [left, right]) => {
            let (cmp, left, right) = (*cmp, *left, *right);
            let left_node = &arena[left];
            match (&left_node.operator, &arena[right].operator) {
                (Operator::Cmp(family, _), Operator::Constant(ConstantValue::Int(0))) => {
                    let operator = Operator::Compare(cmp, CompareFamily::Numeric(*family));
                    let operands = left_node.children.clone();
                    Some(boolean_node(arena, operator, operands, address))
                }
                (_, Operator::Constant(ConstantValue::Int(value @ (0 | 1))))
                    if cmp.is_equality() && left_node.ty == Type::BOOLEAN =>
                {
                    let is_true = (cmp == Comparison::Eq) == (*value == 1);
                    if is_true {
                        Some(left)
                    } else {
                        let negated = boolean_node(arena, Operator::Not, vec![left], address);
                        Some(simplify(arena, negated))
                    }
                }
                _ => None,
            }
        }

        (Operator::Binary(op, family @ (NumericFamily::Int | NumericFamily::Long)), [left, right]) => {
            let (op, family, left, right) = (*op, *family, *left, *right);
            let identity = match op {
                BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Or
                | BinaryOp::Xor
                | BinaryOp::Shl
                | BinaryOp::Shr
                | BinaryOp::UShr => 0,
                BinaryOp::Mul | BinaryOp::Div => 1,
                BinaryOp::Rem | BinaryOp::And => return None,
            };
            let is_identity = match arena[right].operator {
                Operator::Constant(ConstantValue::Int(value)) => value == identity,
                Operator::Constant(ConstantValue::Long(value)) => value == identity as i64,
                _ => false,
            };
            let natural = PrimitiveKinds::from(family.base_type());
            let same_type = match arena[left].ty {
                Type::Primitive(kinds) => kinds.contains(natural) && !kinds.contains(PrimitiveKinds::BOOLEAN),
                _ => false,
            };
            if is_identity && same_type {
                Some(left)
            } else {
                None
            }
        }

        _ => None,
    }
}

/// New node of type `boolean`
fn boolean_node(
    arena: &mut ExprArena<'_>,
    operator: Operator,
    children: Vec<ExprId>,
    address: crate::util::Offset,
) -> ExprId {
    let id = arena.push(operator, children, address);
    arena[id].ty = Type::BOOLEAN;
    id
}

/// `!(a && b)` to `!a || !b` (or the dual)
fn de_morgan(
    arena: &mut ExprArena<'_>,
    combinator: Operator,
    left: ExprId,
    right: ExprId,
    address: crate::util::Offset,
) -> ExprId {
    let not_left = boolean_node(arena, Operator::Not, vec![left], address);
    let not_left = simplify(arena, not_left);
    let not_right = boolean_node(arena, Operator::Not, vec![right], address);
    let not_right = simplify(arena, not_right);
    boolean_node(arena, combinator, vec![not_left, not_right], address)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::locals::LocalId;
    use crate::util::Offset;

    fn int(arena: &mut ExprArena<'_>, value: i32) -> ExprId {
        let id = arena.leaf(Operator::Constant(ConstantValue::Int(value)), Offset(0));
        arena[id].ty = Type::INT;
        id
    }

    fn boolean(arena: &mut ExprArena<'_>, local: u32) -> ExprId {
        let id = arena.leaf(Operator::LocalLoad(LocalId(local)), Offset(0));
        arena[id].ty = Type::BOOLEAN;
        id
    }

    #[test]
    fn boolean_comparisons() {
        let mut arena = ExprArena::new();
        let flag = boolean(&mut arena, 0);
        let zero = int(&mut arena, 0);
        let compare = arena.push(
            Operator::Compare(Comparison::Eq, CompareFamily::Numeric(NumericFamily::Int)),
            vec![flag, zero],
            Offset(1),
        );

        let simplified = simplify(&mut arena, compare);
        assert_eq!(arena[simplified].operator, Operator::Not);
        assert_eq!(arena[simplified].children, vec![flag]);
        assert_eq!(arena[flag].parent, Some(simplified));
        assert!(!arena.is_live(compare));
    }

    #[test]
    fn negation_pushing() {
        let mut arena = ExprArena::new();
        let a = int(&mut arena, 1);
        let b = int(&mut arena, 2);
        let less = arena.push(
            Operator::Compare(Comparison::Lt, CompareFamily::Numeric(NumericFamily::Int)),
            vec![a, b],
            Offset(0),
        );
        let flag = boolean(&mut arena, 0);
        let and = arena.push(Operator::LogicalAnd, vec![less, flag], Offset(0));
        let not = arena.push(Operator::Not, vec![and], Offset(0));

        let simplified = simplify(&mut arena, not);
        assert_eq!(arena[simplified].operator, Operator::LogicalOr);
        let children = arena[simplified].children.clone();
        assert_eq!(
            arena[children[0]].operator,
            Operator::Compare(Comparison::Ge, CompareFamily::Numeric(NumericFamily::Int))
        );
        assert_eq!(arena[children[1]].operator, Operator::Not);

        let double = arena.push(Operator::Not, vec![children[1]], Offset(0));
        assert_eq!(simplify(&mut arena, double), flag, "double negation cancels");
    }

    #[test]
    fn three_way_comparisons() {
        let mut arena = ExprArena::new();
        let a = arena.leaf(Operator::Constant(ConstantValue::Long(3)), Offset(0));
        let b = arena.leaf(Operator::Constant(ConstantValue::Long(4)), Offset(1));
        let cmp = arena.push(Operator::Cmp(NumericFamily::Long, None), vec![a, b], Offset(2));
        let zero = int(&mut arena, 0);
        let compare = arena.push(
            Operator::Compare(Comparison::Gt, CompareFamily::Numeric(NumericFamily::Int)),
            vec![cmp, zero],
            Offset(3),
        );

        let simplified = simplify(&mut arena, compare);
        assert_eq!(
            arena[simplified].operator,
            Operator::Compare(Comparison::Gt, CompareFamily::Numeric(NumericFamily::Long))
        );
        assert_eq!(arena[simplified].children, vec![a, b]);
    }

    #[test]
    fn identities() {
        let mut arena = ExprArena::new();
        let x = int(&mut arena, 7);
        let zero = int(&mut arena, 0);
        let sum = arena.push(
            Operator::Binary(BinaryOp::Add, NumericFamily::Int),
            vec![x, zero],
            Offset(0),
        );
        let one = int(&mut arena, 1);
        let product = arena.push(
            Operator::Binary(BinaryOp::Mul, NumericFamily::Int),
            vec![sum, one],
            Offset(0),
        );
        assert_eq!(simplify(&mut arena, product), x);

        let y = int(&mut arena, 7);
        let two = int(&mut arena, 2);
        let rem = arena.push(
            Operator::Binary(BinaryOp::Rem, NumericFamily::Int),
            vec![y, two],
            Offset(0),
        );
        assert_eq!(simplify(&mut arena, rem), rem, "nothing to do");
    }
}
