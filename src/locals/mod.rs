//! Local variables
//!
//! Bytecode only has numbered slots, and compilers happily reuse one slot for several unrelated
//! source variables (or keep one source variable in several slots). Decoding starts by giving
//! every single load and store its own [`LocalVariable`]. The [`resolver`] then merges the ones
//! connected by data flow, using a union-find forest over [`LocalId`]s:
//!
//!   - only the representative of a set carries the authoritative type and name
//!   - the representative is the member with the most references (ties go to the older one)
//!   - every operator of an absorbed variable is re-pointed at the survivor, so the expression
//!     trees never need to go through `find`

pub mod resolver;
pub mod temporaries;

use crate::expr::ExprArena;
use crate::expr::ExprId;
use crate::types::{Type, TypeContext};
use std::fmt;

/// Handle to a local variable in a [`LocalTable`]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LocalId(pub u32);

impl LocalId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a variable lives
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Slot {
    /// Local variable slot in the bytecode
    Bytecode(u16),

    /// Operand stack entry (at this depth) that is live across a block boundary
    Stack(u16),

    /// Temporary introduced while resolving stack operations
    Temp(u32),
}

#[derive(Debug, Clone)]
pub struct LocalVariable<'g> {
    pub slot: Slot,
    pub ty: Type<'g>,

    /// Name from the debug table (or, after naming, the final name)
    pub name: Option<String>,

    /// `LocalLoad` nodes
    pub reads: Vec<ExprId>,

    /// `LocalStore` nodes
    pub writes: Vec<ExprId>,

    /// Union-find parent (`None` for a representative)
    parent: Option<LocalId>,

    /// Logically deleted (a compiler temporary that got inlined)
    pub removed: bool,

    /// Involved in a type conflict, so inference no longer narrows it
    pub erroneous: bool,

    /// Parameters (and `this`) are written once on entry
    pub is_parameter: bool,
}

impl<'g> LocalVariable<'g> {
    fn references(&self) -> usize {
        self.reads.len() + self.writes.len()
    }
}

#[derive(Debug)]
pub enum Error {
    /// Merging two variables would leave no possible type
    TypeConflict {
        first: LocalId,
        second: LocalId,
        message: String,
    },
}

/// All local variables of one method
#[derive(Debug, Clone, Default)]
pub struct LocalTable<'g> {
    variables: Vec<LocalVariable<'g>>,
    next_temp: u32,
}

impl<'g> LocalTable<'g> {
    pub fn new() -> Self {
        LocalTable {
            variables: vec![],
            next_temp: 0,
        }
    }

    /// Fresh variable, in a set of its own
    pub fn create(&mut self, slot: Slot, ty: Type<'g>) -> LocalId {
        let id = LocalId(self.variables.len() as u32);
        self.variables.push(LocalVariable {
            slot,
            ty,
            name: None,
            reads: vec![],
            writes: vec![],
            parent: None,
            removed: false,
            erroneous: false,
            is_parameter: false,
        });
        id
    }

    /// Fresh variable in a new temporary slot
    pub fn create_temporary(&mut self) -> LocalId {
        let slot = Slot::Temp(self.next_temp);
        self.next_temp += 1;
        self.create(slot, Type::Unknown)
    }

    pub fn create_parameter(&mut self, slot: u16, ty: Type<'g>, name: Option<String>) -> LocalId {
        let id = self.create(Slot::Bytecode(slot), ty);
        let variable = &mut self.variables[id.index()];
        variable.is_parameter = true;
        variable.name = name;
        id
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Representative of the set containing `id`
    pub fn find(&self, mut id: LocalId) -> LocalId {
        while let Some(parent) = self.variables[id.index()].parent {
            id = parent;
        }
        id
    }

    /// Like [`LocalTable::find`], but also compresses the path
    pub fn find_compress(&mut self, id: LocalId) -> LocalId {
        let root = self.find(id);
        let mut current = id;
        while let Some(parent) = self.variables[current.index()].parent {
            if parent != root {
                self.variables[current.index()].parent = Some(root);
            }
            current = parent;
        }
        root
    }

    /// The representative variable
    pub fn variable(&self, id: LocalId) -> &LocalVariable<'g> {
        &self.variables[self.find(id).index()]
    }

    pub fn variable_mut(&mut self, id: LocalId) -> &mut LocalVariable<'g> {
        let root = self.find_compress(id);
        &mut self.variables[root.index()]
    }

    pub fn ty(&self, id: LocalId) -> Type<'g> {
        self.variable(id).ty
    }

    pub fn add_read(&mut self, id: LocalId, expr: ExprId) {
        self.variable_mut(id).reads.push(expr);
    }

    pub fn add_write(&mut self, id: LocalId, expr: ExprId) {
        self.variable_mut(id).writes.push(expr);
    }

    /// Representatives that haven't been removed, in creation order
    pub fn representatives(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.variables
            .iter()
            .enumerate()
            .filter(|(_, variable)| variable.parent.is_none() && !variable.removed)
            .map(|(index, _)| LocalId(index as u32))
    }

    /// Every load and store node of the variable
    pub fn references(&self, id: LocalId) -> Vec<ExprId> {
        let variable = self.variable(id);
        variable
            .reads
            .iter()
            .chain(variable.writes.iter())
            .copied()
            .collect()
    }

    /// Union the sets of two variables, returning the new representative
    ///
    /// The survivor is whichever has more references (ties favour the lower id), the type is the
    /// intersection of both types, and every operator of the absorbed variable gets retargeted.
    /// If the types don't intersect, nothing is merged.
    pub fn merge(
        &mut self,
        tcx: TypeContext<'g>,
        arena: &mut ExprArena<'g>,
        a: LocalId,
        b: LocalId,
    ) -> Result<LocalId, Error> {
        let (a, b) = (self.find_compress(a), self.find_compress(b));
        if a == b {
            return Ok(a);
        }

        let (first, second) = (&self.variables[a.index()], &self.variables[b.index()]);
        let ty = tcx.intersect(first.ty, second.ty);
        if ty.is_error() && !first.ty.is_error() && !second.ty.is_error() {
            return Err(Error::TypeConflict {
                first: a,
                second: b,
                message: format!("{} and {} have no common type", first.ty, second.ty),
            });
        }

        let (survivor, absorbed) = match first.references().cmp(&second.references()) {
            std::cmp::Ordering::Greater => (a, b),
            std::cmp::Ordering::Less => (b, a),
            std::cmp::Ordering::Equal => (a.min(b), a.max(b)),
        };
        log::trace!("Merging {} into {}", absorbed, survivor);

        let absorbed_var = &mut self.variables[absorbed.index()];
        absorbed_var.parent = Some(survivor);
        let reads = std::mem::take(&mut absorbed_var.reads);
        let writes = std::mem::take(&mut absorbed_var.writes);
        let name = absorbed_var.name.take();
        let is_parameter = absorbed_var.is_parameter;
        let erroneous = absorbed_var.erroneous;

        for expr in reads.iter().chain(writes.iter()) {
            arena[*expr].operator.retarget(survivor);
        }

        let survivor_var = &mut self.variables[survivor.index()];
        survivor_var.ty = ty;
        survivor_var.reads.extend(reads);
        survivor_var.writes.extend(writes);
        if survivor_var.name.is_none() {
            survivor_var.name = name;
        }
        survivor_var.is_parameter |= is_parameter;
        survivor_var.erroneous |= erroneous;
        Ok(survivor)
    }

    /// Logically delete a variable (and its whole set)
    pub fn remove(&mut self, id: LocalId) {
        self.variable_mut(id).removed = true;
    }

    /// Number of assignments that are still part of the method (the parameter binding counts)
    pub fn write_count(&self, id: LocalId, arena: &ExprArena<'g>) -> usize {
        let variable = self.variable(id);
        let live_writes = variable
            .writes
            .iter()
            .filter(|write| arena.is_live(**write))
            .count();
        live_writes + usize::from(variable.is_parameter)
    }

    /// Is the variable assigned exactly once?
    pub fn is_constant_single_assignment(&self, id: LocalId, arena: &ExprArena<'g>) -> bool {
        self.write_count(id, arena) == 1
    }

    /// Could the variable be declared `final`?
    pub fn is_final_eligible(&self, id: LocalId, arena: &ExprArena<'g>) -> bool {
        self.write_count(id, arena) <= 1
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::Operator;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
    use crate::jvm::BinaryName;
    use crate::types::{TypeArenas, TypeContext};
    use crate::util::Offset;

    #[test]
    fn union_by_references() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let a = locals.create(Slot::Bytecode(1), Type::Unknown);
        let b = locals.create(Slot::Bytecode(1), Type::BOOL_U_INT);
        for _ in 0..2 {
            let load = arena.leaf(Operator::LocalLoad(b), Offset(0));
            locals.add_read(b, load);
        }
        let load_a = arena.leaf(Operator::LocalLoad(a), Offset(1));
        locals.add_read(a, load_a);

        let survivor = locals.merge(tcx, &mut arena, a, b).unwrap();
        assert_eq!(survivor, b, "more references wins");
        assert_eq!(locals.find(a), b);
        assert_eq!(arena[load_a].operator, Operator::LocalLoad(b), "retargeted");
        assert_eq!(locals.references(a).len(), 3);
        assert_eq!(locals.ty(a), Type::BOOL_U_INT);

        let string = locals.create(Slot::Bytecode(1), tcx.class(&BinaryName::STRING));
        assert!(
            locals.merge(tcx, &mut arena, a, string).is_err(),
            "int and String don't merge"
        );
        assert_eq!(locals.find(string), string, "failed merges leave both sets alone");
    }

    #[test]
    fn merge_is_transitive() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let ids: Vec<LocalId> = (0..4)
            .map(|_| locals.create(Slot::Bytecode(0), Type::Unknown))
            .collect();
        locals.merge(tcx, &mut arena, ids[0], ids[1]).unwrap();
        locals.merge(tcx, &mut arena, ids[2], ids[3]).unwrap();
        locals.merge(tcx, &mut arena, ids[1], ids[3]).unwrap();

        let root = locals.find(ids[0]);
        assert!(ids.iter().all(|id| locals.find(*id) == root));
        assert_eq!(root, ids[0], "ties go to the lowest id");
        assert_eq!(locals.representatives().count(), 1);
    }

    #[test]
    fn assignments() {
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let param = locals.create_parameter(0, Type::INT, Some(String::from("n")));
        assert!(locals.is_constant_single_assignment(param, &arena));

        let value = arena.leaf(Operator::Nop, Offset(0));
        let store = arena.push(
            Operator::LocalStore {
                local: param,
                value_used: false,
            },
            vec![value],
            Offset(0),
        );
        locals.add_write(param, store);
        assert!(!locals.is_final_eligible(param, &arena));

        arena.detach(store);
        assert!(locals.is_final_eligible(param, &arena), "dead stores don't count");

        locals.remove(param);
        assert_eq!(locals.representatives().count(), 0);
    }
}
