use super::{Constraints, ExprArena, ExprId, Operator};
use crate::decompile::{Diagnostic, DiagnosticKind};
use crate::locals::{LocalId, LocalTable};
use crate::types::{Type, TypeContext};
use crate::util::Offset;
use std::collections::{HashMap, VecDeque};

/// Worklist fixpoint that narrows every node and local variable to the types its uses and
/// definitions allow
///
/// Each node taken off the queue gets three things done to it:
///
///   1. pull: its type is intersected with its operator's result constraint (and, for a root,
///      with whatever its statement requires)
///   2. local coupling: loads and stores narrow the variable they touch (and a narrowed variable
///      puts all of its loads and stores back on the queue)
///   3. push: each child is intersected with the operand constraint for its position
///
/// A node whose type changes goes back on the queue along with its parent. Types only shrink and
/// each node may only shrink a bounded number of times, so this terminates.
pub struct Inference<'a, 'g> {
    tcx: TypeContext<'g>,
    arena: &'a mut ExprArena<'g>,
    locals: &'a mut LocalTable<'g>,
    diagnostics: &'a mut Vec<Diagnostic>,

    /// Maximum number of times one node (or variable) may be narrowed in one run
    max_narrowings: usize,

    queue: VecDeque<ExprId>,
    queued: Vec<bool>,
    node_narrowings: HashMap<ExprId, usize>,
    local_narrowings: HashMap<LocalId, usize>,

    /// Number of types changed so far
    changes: usize,
}

impl<'a, 'g> Inference<'a, 'g> {
    pub fn new(
        tcx: TypeContext<'g>,
        arena: &'a mut ExprArena<'g>,
        locals: &'a mut LocalTable<'g>,
        diagnostics: &'a mut Vec<Diagnostic>,
        max_narrowings: usize,
    ) -> Self {
        let queued = vec![false; arena.len()];
        Inference {
            tcx,
            arena,
            locals,
            diagnostics,
            max_narrowings,
            queue: VecDeque::new(),
            queued,
            node_narrowings: HashMap::new(),
            local_narrowings: HashMap::new(),
            changes: 0,
        }
    }

    /// Run to a fixpoint over every live node, returning the number of types that changed
    pub fn run(mut self) -> usize {
        let ids: Vec<ExprId> = self.arena.ids().filter(|id| self.arena.is_live(*id)).collect();
        for id in ids {
            self.enqueue(id);
        }

        while let Some(id) = self.queue.pop_front() {
            self.queued[id.0 as usize] = false;
            if !self.arena.is_live(id) {
                continue;
            }

            let result = self.constraints().result(id);
            self.narrow(id, result);
            let required = self.arena.requirement(id);
            self.narrow(id, required);

            if !self.arena[id].erroneous {
                self.couple_local(id);
            }

            let children = self.arena[id].children.clone();
            for (index, child) in children.into_iter().enumerate() {
                let operand = self.constraints().operand(id, index);
                self.narrow(child, operand);
            }
        }

        log::trace!("Inference settled after {} changes", self.changes);
        self.changes
    }

    fn constraints(&self) -> Constraints<'_, 'g> {
        Constraints {
            tcx: self.tcx,
            arena: &*self.arena,
            locals: &*self.locals,
        }
    }

    fn enqueue(&mut self, id: ExprId) {
        let index = id.0 as usize;
        if index >= self.queued.len() {
            self.queued.resize(index + 1, false);
        }
        if !self.queued[index] {
            self.queued[index] = true;
            self.queue.push_back(id);
        }
    }

    /// Loads and stores share their type with the variable
    fn couple_local(&mut self, id: ExprId) {
        let node = &self.arena[id];
        let address = node.address;
        match node.operator {
            Operator::LocalLoad(local) => {
                let ty = node.ty;
                self.narrow_local(local, ty, address);
            }
            Operator::LocalStore { local, value_used } => {
                let node_ty = node.ty;
                let value_ty = node.children.first().map_or(Type::Unknown, |c| self.arena[*c].ty);
                let assignable = self.tcx.super_types(value_ty);
                self.narrow_local(local, assignable, address);
                if value_used {
                    self.narrow_local(local, node_ty, address);
                }
            }
            _ => (),
        }
    }

    fn narrow(&mut self, id: ExprId, constraint: Type<'g>) {
        let node = &self.arena[id];
        if node.erroneous {
            return;
        }
        let old = node.ty;
        let new = self.tcx.intersect(old, constraint);
        if new == old {
            return;
        }

        if new.is_error() {
            let message = format!(
                "{} has type {} but is required to be {}",
                node.operator, old, constraint
            );
            self.mark_erroneous(id, DiagnosticKind::TypeConflict, message);

            // fall back to what the operator alone says the value is
            let loosest = self.constraints().result(id);
            if !loosest.is_error() && loosest != old {
                self.arena[id].ty = loosest;
                if let Some(parent) = self.arena[id].parent {
                    self.enqueue(parent);
                }
            }
            return;
        }

        let count = self.node_narrowings.entry(id).or_insert(0);
        *count += 1;
        if *count > self.max_narrowings {
            let message = format!("type of {} keeps narrowing (now {})", node.operator, old);
            self.mark_erroneous(id, DiagnosticKind::RecursiveTypeNarrowing, message);
            return;
        }

        self.arena[id].ty = new;
        self.changes += 1;
        self.enqueue(id);
        if let Some(parent) = self.arena[id].parent {
            self.enqueue(parent);
        }
    }

    fn narrow_local(&mut self, local: LocalId, constraint: Type<'g>, address: Offset) {
        let local = self.locals.find(local);
        let variable = self.locals.variable(local);
        if variable.erroneous || variable.removed {
            return;
        }
        let old = variable.ty;
        let new = self.tcx.intersect(old, constraint);
        if new == old {
            return;
        }

        if new.is_error() {
            let message = format!(
                "variable {} has type {} but is required to be {}",
                variable.name.as_deref().unwrap_or("<unnamed>"),
                old,
                constraint
            );
            self.locals.variable_mut(local).erroneous = true;
            let diagnostic = Diagnostic::new(DiagnosticKind::TypeConflict, address, message);
            self.diagnostics.push(diagnostic);
            return;
        }

        let count = self.local_narrowings.entry(local).or_insert(0);
        *count += 1;
        if *count > self.max_narrowings {
            let message = format!("type of variable {} keeps narrowing (now {})", local, old);
            self.locals.variable_mut(local).erroneous = true;
            let kind = DiagnosticKind::RecursiveTypeNarrowing;
            self.diagnostics.push(Diagnostic::new(kind, address, message));
            return;
        }

        self.locals.variable_mut(local).ty = new;
        self.changes += 1;
        for reference in self.locals.references(local) {
            self.enqueue(reference);
        }
    }

    /// Stop inferring a node (and its variable)
    fn mark_erroneous(&mut self, id: ExprId, kind: DiagnosticKind, message: String) {
        let node = &mut self.arena[id];
        node.erroneous = true;
        let address = node.address;
        if let Some(local) = node.operator.local() {
            self.locals.variable_mut(local).erroneous = true;
        }
        self.diagnostics.push(Diagnostic::new(kind, address, message));
    }
}

/// Infer types for every live node, returning the number of types that changed
pub fn infer<'g>(
    tcx: TypeContext<'g>,
    arena: &mut ExprArena<'g>,
    locals: &mut LocalTable<'g>,
    diagnostics: &mut Vec<Diagnostic>,
    max_narrowings: usize,
) -> usize {
    Inference::new(tcx, arena, locals, diagnostics, max_narrowings).run()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::{
        int_constant_kinds, ArrayElement, BinaryOp, Comparison, CompareFamily, ConstantValue,
        NumericFamily,
    };
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
    use crate::jvm::code::{InvokeType, MethodRef};
    use crate::jvm::{BinaryName, Name, ParseDescriptor, MethodDescriptor, UnqualifiedName};
    use crate::locals::Slot;
    use crate::types::TypeArenas;

    fn store<'g>(
        arena: &mut ExprArena<'g>,
        locals: &mut LocalTable<'g>,
        local: LocalId,
        value: ExprId,
    ) -> ExprId {
        let id = arena.push(
            Operator::LocalStore {
                local,
                value_used: false,
            },
            vec![value],
            Offset(0),
        );
        locals.add_write(local, id);
        id
    }

    fn load<'g>(arena: &mut ExprArena<'g>, locals: &mut LocalTable<'g>, local: LocalId) -> ExprId {
        let id = arena.leaf(Operator::LocalLoad(local), Offset(0));
        locals.add_read(local, id);
        id
    }

    #[test]
    fn booleans_from_comparisons() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        // flag = 1; if (flag == 0) ... ; flag ^ other
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let flag = locals.create(Slot::Bytecode(1), Type::Unknown);
        let other = locals.create_parameter(0, Type::BOOLEAN, None);

        let one = arena.leaf(Operator::Constant(ConstantValue::Int(1)), Offset(0));
        store(&mut arena, &mut locals, flag, one);
        let flag_load = load(&mut arena, &mut locals, flag);
        let other_load = load(&mut arena, &mut locals, other);
        let xor = arena.push(
            Operator::Binary(BinaryOp::Xor, NumericFamily::Int),
            vec![flag_load, other_load],
            Offset(3),
        );

        let mut diagnostics = vec![];
        let changes = infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert!(changes > 0);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(arena[xor].ty, Type::BOOLEAN);
        assert_eq!(locals.ty(flag), Type::BOOLEAN, "xor with a boolean makes a boolean");
        assert_eq!(arena[one].ty, Type::BOOLEAN);

        let again = infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert_eq!(again, 0, "inference is idempotent");
    }

    #[test]
    fn interface_use_narrows_variable() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let list = locals.create(Slot::Bytecode(0), Type::Unknown);
        let init = MethodDescriptor::parse("()V").unwrap();

        for class in [BinaryName::ARRAYLIST, BinaryName::LINKEDLIST] {
            let new = arena.leaf(
                Operator::New {
                    class,
                    constructor: init.clone(),
                },
                Offset(0),
            );
            store(&mut arena, &mut locals, list, new);
        }
        let receiver = load(&mut arena, &mut locals, list);
        let size = MethodRef {
            class: BinaryName::LIST,
            name: UnqualifiedName::from_string(String::from("size")).unwrap(),
            descriptor: MethodDescriptor::parse("()I").unwrap(),
        };
        arena.push(
            Operator::Invoke {
                kind: InvokeType::Interface,
                method: size,
            },
            vec![receiver],
            Offset(5),
        );

        let mut diagnostics = vec![];
        infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(
            locals.ty(list).to_string(),
            "<java.util.List-java.util.AbstractList>"
        );
        assert!(tcx.hint(locals.ty(list)) == tcx.class(&BinaryName::LIST));
    }

    #[test]
    fn conflicts_are_reported_once() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        // (String) constant compared with an int
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let text = arena.leaf(
            Operator::Constant(ConstantValue::String(String::from("x"))),
            Offset(0),
        );
        let zero = arena.leaf(Operator::Constant(ConstantValue::Int(0)), Offset(1));
        let compare = arena.push(
            Operator::Compare(Comparison::Lt, CompareFamily::Numeric(NumericFamily::Int)),
            vec![text, zero],
            Offset(2),
        );

        let mut diagnostics = vec![];
        infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::TypeConflict);
        assert!(arena[text].erroneous);
        assert!(arena[text].ty == tcx.class(&BinaryName::STRING), "type of the constant itself");
        assert_eq!(arena[compare].ty, Type::BOOLEAN);

        infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert_eq!(diagnostics.len(), 1, "no duplicate diagnostics");
    }

    #[test]
    fn conflicts_fall_back_to_the_operator_type() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        // !1, where the 1 is also required to be an int
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let one = arena.leaf(Operator::Constant(ConstantValue::Int(1)), Offset(0));
        arena.require(one, Type::U_INT);
        let not = arena.push(Operator::Not, vec![one], Offset(1));

        let mut diagnostics = vec![];
        infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::TypeConflict);
        assert!(arena[one].erroneous);
        assert_eq!(
            arena[one].ty,
            Type::Primitive(int_constant_kinds(1)),
            "narrowing before the conflict is undone"
        );
        assert_eq!(arena[not].ty, Type::BOOLEAN);
    }

    #[test]
    fn returned_values_meet_the_return_type() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let one = arena.leaf(Operator::Constant(ConstantValue::Int(1)), Offset(0));
        arena.require(one, tcx.sub_types(Type::BOOLEAN));
        let list = locals.create(Slot::Bytecode(0), Type::Unknown);
        let new = arena.leaf(
            Operator::New {
                class: BinaryName::ARRAYLIST,
                constructor: MethodDescriptor::parse("()V").unwrap(),
            },
            Offset(1),
        );
        store(&mut arena, &mut locals, list, new);
        let returned = load(&mut arena, &mut locals, list);
        arena.require(returned, tcx.sub_types(tcx.class(&BinaryName::LIST)));

        // the requirement moves along when the root is replaced
        let replacement = arena.leaf(Operator::LocalLoad(list), Offset(3));
        locals.add_read(list, replacement);
        assert!(arena.replace(returned, replacement));

        let mut diagnostics = vec![];
        infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(arena[one].ty, Type::BOOLEAN);
        assert!(tcx.hint(locals.ty(list)) == tcx.class(&BinaryName::LIST));
    }

    #[test]
    fn array_elements() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        // bytes[0] = 1 where bytes is a boolean[] parameter
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let flags = locals.create_parameter(0, tcx.array(Type::BOOLEAN), None);
        let array = load(&mut arena, &mut locals, flags);
        let index = arena.leaf(Operator::Constant(ConstantValue::Int(0)), Offset(1));
        let value = arena.leaf(Operator::Constant(ConstantValue::Int(1)), Offset(2));
        arena.push(
            Operator::ArrayStore {
                element: ArrayElement::Primitive(crate::types::PrimitiveKinds::BOOL_BYTE),
                value_used: false,
            },
            vec![array, index, value],
            Offset(3),
        );

        let mut diagnostics = vec![];
        infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(arena[value].ty, Type::BOOLEAN);
        assert_eq!(tcx.hint(arena[index].ty), Type::INT);
    }
}
