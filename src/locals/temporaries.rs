use super::{LocalTable, Slot};
use crate::expr::{ExprArena, ExprId, Operator};
use crate::flow::StructuredBlock;

/// Inline temporaries that are written once and read once right afterwards
///
/// `statements` is a straight-line list of statements and `exits` the expressions evaluated after
/// it (a branch condition or switch selector). A `t = value` statement whose variable is only
/// read in the following statement (or in the exit, if it is the last statement) is removed and
/// `value` takes the place of the read. The variable is then removed from the table. Temporaries
/// are kept when that would move `value` past something it could observe or affect.
///
/// Returns the number of temporaries inlined.
pub fn inline_temporaries<'g>(
    arena: &mut ExprArena<'g>,
    locals: &mut LocalTable<'g>,
    statements: &mut Vec<StructuredBlock>,
    exits: &mut [ExprId],
) -> usize {
    let mut inlined = 0;
    let mut index = 0;
    while index < statements.len() {
        let store = match statements[index] {
            StructuredBlock::Instruction(expr) => expr,
            _ => {
                index += 1;
                continue;
            }
        };
        let local = match arena[store].operator {
            Operator::LocalStore {
                local,
                value_used: false,
            } => local,
            _ => {
                index += 1;
                continue;
            }
        };

        let variable = locals.variable(local);
        let live_reads: Vec<ExprId> = variable
            .reads
            .iter()
            .filter(|read| arena.is_live(**read))
            .copied()
            .collect();
        let is_candidate = matches!(variable.slot, Slot::Temp(_))
            && !variable.is_parameter
            && locals.write_count(local, arena) == 1
            && live_reads.len() == 1;
        if !is_candidate {
            index += 1;
            continue;
        }
        let read = live_reads[0];

        // the read has to be in the next thing evaluated
        let next_roots: Vec<ExprId> = match statements.get(index + 1) {
            Some(next) => next.expressions(),
            None => exits.to_vec(),
        };
        let root_of_read = root_of(arena, read);
        if !next_roots.contains(&root_of_read) {
            index += 1;
            continue;
        }

        let value = match arena[store].children.first() {
            Some(value) => *value,
            None => {
                index += 1;
                continue;
            }
        };
        if !can_move(arena, value, &evaluated_before(arena, root_of_read, read)) {
            index += 1;
            continue;
        }
        log::trace!("Inlining temporary {} into {:?}", local, read);
        let was_root = arena.replace(read, value);
        if was_root {
            let mut rewrite = |expr: ExprId| if expr == read { value } else { expr };
            match statements.get_mut(index + 1) {
                Some(next) => next.map_expressions(&mut rewrite),
                None => exits.iter_mut().for_each(|e| *e = rewrite(*e)),
            }
        }
        arena.detach(store);
        locals.remove(local);
        statements.remove(index);
        inlined += 1;
    }
    inlined
}

/// Can `value` be evaluated after the `earlier` nodes instead of before them?
fn can_move(arena: &ExprArena<'_>, value: ExprId, earlier: &[ExprId]) -> bool {
    let moved = arena.descendants(value);
    let value_effects = moved.iter().any(|id| has_effects(&arena[*id].operator));
    let value_reads = moved.iter().any(|id| reads_memory(&arena[*id].operator));
    let stored: Vec<_> = moved
        .iter()
        .filter_map(|id| match arena[*id].operator {
            Operator::LocalStore { local, .. } => Some(local),
            _ => None,
        })
        .collect();

    earlier.iter().all(|id| {
        let operator = &arena[*id].operator;
        let conflicts = (value_effects && has_effects_or_reads(operator))
            || (value_reads && has_effects(operator))
            || matches!(operator, Operator::LocalLoad(local) if stored.contains(local));
        !conflicts
    })
}

fn has_effects(operator: &Operator) -> bool {
    matches!(
        operator,
        Operator::LocalStore { .. }
            | Operator::FieldPut { .. }
            | Operator::ArrayStore { .. }
            | Operator::Invoke { .. }
            | Operator::InvokeDynamic { .. }
            | Operator::New { .. }
            | Operator::Monitor(_)
    )
}

fn reads_memory(operator: &Operator) -> bool {
    matches!(
        operator,
        Operator::FieldGet(_) | Operator::ArrayLoad(_) | Operator::ArrayLength
    )
}

fn has_effects_or_reads(operator: &Operator) -> bool {
    has_effects(operator) || reads_memory(operator)
}

/// Nodes of the tree under `root` evaluated before `target`
fn evaluated_before(arena: &ExprArena<'_>, root: ExprId, target: ExprId) -> Vec<ExprId> {
    fn walk(arena: &ExprArena<'_>, id: ExprId, target: ExprId, out: &mut Vec<ExprId>) -> bool {
        if id == target {
            return true;
        }
        for child in &arena[id].children {
            if walk(arena, *child, target, out) {
                return true;
            }
        }
        out.push(id);
        false
    }

    let mut earlier = vec![];
    walk(arena, root, target, &mut earlier);
    earlier
}

fn root_of(arena: &ExprArena<'_>, mut id: ExprId) -> ExprId {
    while let Some(parent) = arena[id].parent {
        id = parent;
    }
    id
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::{ConstantValue, FieldAccess};
    use crate::expr::{BinaryOp, NumericFamily};
    use crate::jvm::code::{FieldRef, InvokeType, MethodRef};
    use crate::jvm::{BinaryName, FieldType, MethodDescriptor, Name, UnqualifiedName};
    use crate::util::Offset;

    #[test]
    fn single_use_temporary() {
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let temp = locals.create_temporary();

        // t = 5; Main.x = t;
        let five = arena.leaf(Operator::Constant(ConstantValue::Int(5)), Offset(0));
        let store = arena.push(
            Operator::LocalStore {
                local: temp,
                value_used: false,
            },
            vec![five],
            Offset(0),
        );
        locals.add_write(temp, store);
        let load = arena.leaf(Operator::LocalLoad(temp), Offset(1));
        locals.add_read(temp, load);
        let field = FieldRef {
            class: BinaryName::from_string(String::from("Main")).unwrap(),
            name: UnqualifiedName::from_string(String::from("x")).unwrap(),
            descriptor: FieldType::int(),
        };
        let put = arena.push(
            Operator::FieldPut {
                access: FieldAccess {
                    field,
                    is_static: true,
                },
                value_used: false,
            },
            vec![load],
            Offset(2),
        );

        let mut statements = vec![
            StructuredBlock::Instruction(store),
            StructuredBlock::Instruction(put),
        ];
        assert_eq!(
            inline_temporaries(&mut arena, &mut locals, &mut statements, &mut []),
            1
        );
        assert_eq!(statements, vec![StructuredBlock::Instruction(put)]);
        assert_eq!(arena[put].children, vec![five]);
        assert!(locals.variable(temp).removed);
    }

    #[test]
    fn bytecode_slots_stay() {
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let local = locals.create(Slot::Bytecode(1), crate::types::Type::Unknown);
        let five = arena.leaf(Operator::Constant(ConstantValue::Int(5)), Offset(0));
        let store = arena.push(
            Operator::LocalStore {
                local,
                value_used: false,
            },
            vec![five],
            Offset(0),
        );
        locals.add_write(local, store);
        let load = arena.leaf(Operator::LocalLoad(local), Offset(1));
        locals.add_read(local, load);

        let mut statements = vec![StructuredBlock::Instruction(store)];
        let mut exits = [load];
        assert_eq!(
            inline_temporaries(&mut arena, &mut locals, &mut statements, &mut exits),
            0,
            "source variables are never inlined"
        );
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn evaluation_order_is_kept() {
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let temp = locals.create_temporary();
        let main = BinaryName::from_string(String::from("Main")).unwrap();

        // t = Main.next(); Main.x = Main.y + t;
        let call = arena.leaf(
            Operator::Invoke {
                kind: InvokeType::Static,
                method: MethodRef {
                    class: main.clone(),
                    name: UnqualifiedName::from_string(String::from("next")).unwrap(),
                    descriptor: MethodDescriptor {
                        parameters: vec![],
                        return_type: Some(FieldType::int()),
                    },
                },
            },
            Offset(0),
        );
        let store = arena.push(
            Operator::LocalStore {
                local: temp,
                value_used: false,
            },
            vec![call],
            Offset(1),
        );
        locals.add_write(temp, store);
        let field = |name: &str| FieldAccess {
            field: FieldRef {
                class: main.clone(),
                name: UnqualifiedName::from_string(String::from(name)).unwrap(),
                descriptor: FieldType::int(),
            },
            is_static: true,
        };
        let get = arena.leaf(Operator::FieldGet(field("y")), Offset(2));
        let load = arena.leaf(Operator::LocalLoad(temp), Offset(3));
        locals.add_read(temp, load);
        let sum = arena.push(
            Operator::Binary(BinaryOp::Add, NumericFamily::Int),
            vec![get, load],
            Offset(4),
        );
        let put = arena.push(
            Operator::FieldPut {
                access: field("x"),
                value_used: false,
            },
            vec![sum],
            Offset(5),
        );

        let mut statements = vec![
            StructuredBlock::Instruction(store),
            StructuredBlock::Instruction(put),
        ];
        assert_eq!(
            inline_temporaries(&mut arena, &mut locals, &mut statements, &mut []),
            0,
            "the call has to run before the field is read"
        );
        assert_eq!(statements.len(), 2);
        assert!(!locals.variable(temp).removed);
    }
}
