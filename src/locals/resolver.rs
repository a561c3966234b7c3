//! Reaching definitions over the block graph, used to merge the per-access variables the decoder
//! creates into source-level variables
//!
//! A load gets merged with every store that may reach it. Since merging is transitive, two stores
//! that reach a common load end up as one variable, while a slot reused for unrelated values
//! (with no load seeing both) stays split into separate variables.
//!
//! Loads reached by a single definition are merged right away. A load where several definitions
//! meet becomes a [`PendingJoin`], which the structurer merges once the blocks involved have been
//! folded together, so that each branch is typed on its own before the join sees both.

use super::{LocalId, LocalTable, Slot};
use crate::decompile::{Diagnostic, DiagnosticKind};
use crate::expr::{ExprArena, ExprId};
use crate::jvm::code::{BlockId, LocalVariableEntry};
use crate::jvm::Name;
use crate::types::TypeContext;
use crate::util::Offset;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Load,
    Store,
}

/// One load or store of a slot, in execution order within its block
#[derive(Copy, Clone, Debug)]
pub struct LocalAccess {
    pub slot: Slot,
    pub local: LocalId,
    pub kind: AccessKind,

    /// The `LocalLoad` or `LocalStore` node
    pub expr: ExprId,

    /// A `long` or `double` store also clobbers the next slot
    pub wide: bool,
}

/// Accesses and edges of one block
#[derive(Clone, Debug, Default)]
pub struct BlockAccesses {
    pub accesses: Vec<LocalAccess>,
    pub successors: Vec<BlockId>,

    /// Handlers protecting the block
    pub handlers: Vec<BlockId>,
}

type Definitions = BTreeMap<Slot, BTreeSet<LocalId>>;

/// Load reached by definitions from more than one place
#[derive(Clone, Debug)]
pub struct PendingJoin {
    /// Variable of the load
    pub load: LocalId,

    /// The `LocalLoad` node
    pub expr: ExprId,

    pub definitions: Vec<LocalId>,

    /// Blocks of the load and of every definition (the entry block for parameters)
    pub blocks: BTreeSet<BlockId>,
}

pub struct Resolver<'a, 'g> {
    tcx: TypeContext<'g>,
    arena: &'a mut ExprArena<'g>,
    locals: &'a mut LocalTable<'g>,
    diagnostics: &'a mut Vec<Diagnostic>,

    /// Definitions reaching the start of each block, from the last `resolve`
    reaching: BTreeMap<BlockId, Definitions>,
}

impl<'a, 'g> Resolver<'a, 'g> {
    pub fn new(
        tcx: TypeContext<'g>,
        arena: &'a mut ExprArena<'g>,
        locals: &'a mut LocalTable<'g>,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Resolver {
            tcx,
            arena,
            locals,
            diagnostics,
            reaching: BTreeMap::new(),
        }
    }

    /// Merge every load with the definitions reaching it, returning the loads where definitions
    /// from several blocks meet
    ///
    /// `entry_definitions` are the variables defined on entry (parameters). The returned joins
    /// still have to be merged with [`Resolver::join`].
    pub fn resolve(
        &mut self,
        entry: BlockId,
        blocks: &BTreeMap<BlockId, BlockAccesses>,
        entry_definitions: &[(Slot, LocalId)],
    ) -> Vec<PendingJoin> {
        self.reaching = reaching_definitions(entry, blocks, entry_definitions);

        let mut defined_in: BTreeMap<LocalId, BlockId> = entry_definitions
            .iter()
            .map(|(_, local)| (*local, entry))
            .collect();
        for (block, accesses) in blocks {
            for access in &accesses.accesses {
                if access.kind == AccessKind::Store {
                    defined_in.insert(access.local, *block);
                }
            }
        }

        let mut merges = 0;
        let mut joins = vec![];
        for (block, accesses) in blocks {
            let mut current = self.reaching.get(block).cloned().unwrap_or_default();
            for access in &accesses.accesses {
                match access.kind {
                    AccessKind::Load => {
                        let definitions: Vec<LocalId> = current
                            .get(&access.slot)
                            .map_or(vec![], |defs| defs.iter().copied().collect());
                        let mut involved: BTreeSet<BlockId> = definitions
                            .iter()
                            .filter_map(|definition| defined_in.get(definition).copied())
                            .collect();
                        involved.insert(*block);
                        if involved.len() > 1 && definitions.len() > 1 {
                            joins.push(PendingJoin {
                                load: access.local,
                                expr: access.expr,
                                definitions,
                                blocks: involved,
                            });
                            continue;
                        }
                        let address = self.arena[access.expr].address;
                        for definition in definitions {
                            self.merge(access.local, definition, address);
                            merges += 1;
                        }
                    }
                    AccessKind::Store => store(&mut current, access),
                }
            }
        }
        log::debug!(
            "Resolved locals with {} reaching definitions ({} joins left for structuring)",
            merges,
            joins.len()
        );
        joins
    }

    /// Merge a load with the definitions meeting at it
    pub fn join(&mut self, join: &PendingJoin) -> LocalId {
        let address = self.arena[join.expr].address;
        let mut representative = self.locals.find(join.load);
        for definition in &join.definitions {
            representative = self.merge(representative, *definition, address);
        }
        log::trace!("Joined {} definitions at {}", join.definitions.len(), address);
        representative
    }

    /// Variable holding `slot` just before the `index`-th access of `block`
    ///
    /// The definitions reaching that point get merged. If none reach it, a fresh variable is
    /// created (the slot is read before anything wrote it).
    pub fn bind(
        &mut self,
        blocks: &BTreeMap<BlockId, BlockAccesses>,
        slot: Slot,
        block: BlockId,
        index: usize,
    ) -> LocalId {
        let mut current = self.reaching.get(&block).cloned().unwrap_or_default();
        let mut address = Offset::default();
        if let Some(accesses) = blocks.get(&block) {
            for access in accesses.accesses.iter().take(index) {
                if access.kind == AccessKind::Store {
                    store(&mut current, access);
                }
            }
            if let Some(access) = accesses.accesses.get(index) {
                address = self.arena[access.expr].address;
            }
        }

        let definitions: Vec<LocalId> = current
            .get(&slot)
            .map_or(vec![], |defs| defs.iter().copied().collect());
        let (first, rest) = match definitions.split_first() {
            Some(split) => split,
            None => return self.locals.create(slot, crate::types::Type::Unknown),
        };
        let mut representative = self.locals.find(*first);
        for definition in rest {
            representative = self.merge(representative, *definition, address);
        }
        representative
    }

    /// Merge the variables covered by each debug table entry, and name and type them
    pub fn apply_debug_table(
        &mut self,
        table: &[LocalVariableEntry],
        blocks: &BTreeMap<BlockId, BlockAccesses>,
    ) {
        for entry in table {
            let covered: Vec<(LocalId, ExprId)> = blocks
                .iter()
                .filter(|(block, _)| entry.covers(entry.slot, **block))
                .flat_map(|(_, accesses)| accesses.accesses.iter())
                .filter(|access| access.slot == Slot::Bytecode(entry.slot))
                .map(|access| (access.local, access.expr))
                .collect();
            let (first, _) = match covered.first() {
                Some(first) => *first,
                None => continue,
            };

            let mut representative = first;
            for (local, expr) in &covered[1..] {
                let address = self.arena[*expr].address;
                representative = self.merge(representative, *local, address);
            }

            let declared = self.tcx.field_type(&entry.descriptor);
            let variable = self.locals.variable_mut(representative);
            let narrowed = self.tcx.intersect(variable.ty, declared);
            if narrowed.is_error() {
                let message = format!(
                    "'{}' is declared as {} but used as {}",
                    entry.name.as_str(),
                    entry.descriptor,
                    variable.ty
                );
                variable.erroneous = true;
                let address = self.arena[covered[0].1].address;
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::TypeConflict,
                    address,
                    message,
                ));
            } else {
                variable.ty = narrowed;
            }
            if variable.name.is_none() {
                variable.name = Some(String::from(entry.name.as_str()));
            }
        }
    }

    /// Merge two variables, reporting a conflict instead of failing
    fn merge(&mut self, a: LocalId, b: LocalId, address: Offset) -> LocalId {
        match self.locals.merge(self.tcx, self.arena, a, b) {
            Ok(survivor) => survivor,
            Err(super::Error::TypeConflict { message, .. }) => {
                for id in [a, b] {
                    self.locals.variable_mut(id).erroneous = true;
                }
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::TypeConflict,
                    address,
                    message,
                ));
                self.locals.find(a)
            }
        }
    }
}

fn store(definitions: &mut Definitions, access: &LocalAccess) {
    let mut only = BTreeSet::new();
    only.insert(access.local);
    definitions.insert(access.slot, only);
    if let (true, Slot::Bytecode(slot)) = (access.wide, access.slot) {
        definitions.remove(&Slot::Bytecode(slot.wrapping_add(1)));
    }
}

fn union_into(target: &mut Definitions, source: &Definitions) -> bool {
    let mut changed = false;
    for (slot, defs) in source {
        let entry = target.entry(*slot).or_default();
        for def in defs {
            changed |= entry.insert(*def);
        }
    }
    changed
}

/// Definitions reaching the start of each block
fn reaching_definitions(
    entry: BlockId,
    blocks: &BTreeMap<BlockId, BlockAccesses>,
    entry_definitions: &[(Slot, LocalId)],
) -> BTreeMap<BlockId, Definitions> {
    let mut reaching: BTreeMap<BlockId, Definitions> = BTreeMap::new();
    let mut initial = Definitions::new();
    for (slot, local) in entry_definitions {
        initial.entry(*slot).or_default().insert(*local);
    }
    reaching.insert(entry, initial);

    let mut queue: VecDeque<BlockId> = VecDeque::new();
    queue.push_back(entry);
    while let Some(block) = queue.pop_front() {
        let accesses = match blocks.get(&block) {
            Some(accesses) => accesses,
            None => continue,
        };
        let incoming = reaching.get(&block).cloned().unwrap_or_default();

        // everything defined anywhere in the block may be live when an exception is thrown
        let mut current = incoming.clone();
        let mut exceptional = incoming;
        for access in &accesses.accesses {
            if access.kind == AccessKind::Store {
                store(&mut current, access);
                exceptional
                    .entry(access.slot)
                    .or_default()
                    .insert(access.local);
            }
        }

        for (successor, outgoing) in accesses
            .successors
            .iter()
            .map(|s| (s, &current))
            .chain(accesses.handlers.iter().map(|h| (h, &exceptional)))
        {
            let is_new = !reaching.contains_key(successor);
            let target = reaching.entry(*successor).or_default();
            if union_into(target, outgoing) || is_new {
                queue.push_back(*successor);
            }
        }
    }
    reaching
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::Operator;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
    use crate::jvm::{BaseType, BinaryName, FieldType, UnqualifiedName};
    use crate::types::{Type, TypeArenas};
    use crate::util::Offset;

    struct Builder<'g> {
        arena: ExprArena<'g>,
        locals: LocalTable<'g>,
    }

    impl<'g> Builder<'g> {
        fn access(&mut self, slot: u16, kind: AccessKind, ty: Type<'g>) -> LocalAccess {
            let local = self.locals.create(Slot::Bytecode(slot), ty);
            let operator = match kind {
                AccessKind::Load => Operator::LocalLoad(local),
                AccessKind::Store => Operator::LocalStore {
                    local,
                    value_used: false,
                },
            };
            let expr = self.arena.leaf(operator, Offset(0));
            match kind {
                AccessKind::Load => self.locals.add_read(local, expr),
                AccessKind::Store => self.locals.add_write(local, expr),
            }
            LocalAccess {
                slot: Slot::Bytecode(slot),
                local,
                kind,
                expr,
                wide: false,
            }
        }
    }

    #[test]
    fn loads_merge_with_reaching_stores() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);
        let string = tcx.class(&BinaryName::STRING);

        let mut b = Builder {
            arena: ExprArena::new(),
            locals: LocalTable::new(),
        };
        // b0: if .. b1 else b2; b1: x = 1; b2: x = 2; b3: use x; x = "s"; use x
        let store_1 = b.access(1, AccessKind::Store, Type::U_INT);
        let store_2 = b.access(1, AccessKind::Store, Type::U_INT);
        let load_int = b.access(1, AccessKind::Load, Type::Unknown);
        let store_string = b.access(1, AccessKind::Store, string);
        let load_string = b.access(1, AccessKind::Load, Type::Unknown);

        let mut blocks = BTreeMap::new();
        let block = |accesses: Vec<LocalAccess>, successors: Vec<u32>| BlockAccesses {
            accesses,
            successors: successors.into_iter().map(BlockId).collect(),
            handlers: vec![],
        };
        blocks.insert(BlockId(0), block(vec![], vec![1, 2]));
        blocks.insert(BlockId(1), block(vec![store_1], vec![3]));
        blocks.insert(BlockId(2), block(vec![store_2], vec![3]));
        blocks.insert(
            BlockId(3),
            block(vec![load_int, store_string, load_string], vec![]),
        );

        let mut diagnostics = vec![];
        let mut resolver = Resolver::new(tcx, &mut b.arena, &mut b.locals, &mut diagnostics);
        let joins = resolver.resolve(BlockId(0), &blocks, &[]);
        assert_eq!(joins.len(), 1, "only the load after the if sees two stores");
        assert_eq!(joins[0].load, load_int.local);
        assert_eq!(
            joins[0].blocks,
            [1, 2, 3].into_iter().map(BlockId).collect::<BTreeSet<_>>()
        );
        let at_join = resolver.bind(&blocks, Slot::Bytecode(1), BlockId(3), 0);
        let joined = resolver.join(&joins[0]);
        let after_reuse = resolver.bind(&blocks, Slot::Bytecode(1), BlockId(3), 2);
        let never_written = resolver.bind(&blocks, Slot::Bytecode(7), BlockId(3), 0);

        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let int_var = b.locals.find(load_int.local);
        assert_eq!(b.locals.find(at_join), int_var);
        assert_eq!(b.locals.find(joined), int_var);
        assert_eq!(after_reuse, b.locals.find(store_string.local));
        assert!(b.locals.variable(never_written).writes.is_empty());
        assert_eq!(b.locals.find(store_1.local), int_var);
        assert_eq!(b.locals.find(store_2.local), int_var);
        assert_eq!(b.locals.ty(int_var), Type::U_INT);
        assert_eq!(b.locals.find(load_string.local), b.locals.find(store_string.local));
        assert_ne!(
            b.locals.find(load_string.local),
            int_var,
            "reused slot gets a new variable"
        );
    }

    #[test]
    fn handlers_see_definitions_inside_protected_blocks() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let mut b = Builder {
            arena: ExprArena::new(),
            locals: LocalTable::new(),
        };
        let first = b.access(2, AccessKind::Store, Type::INT);
        let second = b.access(2, AccessKind::Store, Type::INT);
        let in_handler = b.access(2, AccessKind::Load, Type::Unknown);

        let mut blocks = BTreeMap::new();
        blocks.insert(
            BlockId(0),
            BlockAccesses {
                accesses: vec![first, second],
                successors: vec![],
                handlers: vec![BlockId(1)],
            },
        );
        blocks.insert(
            BlockId(1),
            BlockAccesses {
                accesses: vec![in_handler],
                successors: vec![],
                handlers: vec![],
            },
        );

        let mut diagnostics = vec![];
        let mut resolver = Resolver::new(tcx, &mut b.arena, &mut b.locals, &mut diagnostics);
        for join in resolver.resolve(BlockId(0), &blocks, &[]) {
            resolver.join(&join);
        }
        let var = b.locals.find(in_handler.local);
        assert_eq!(b.locals.find(first.local), var, "killed store still reaches the handler");
        assert_eq!(b.locals.find(second.local), var);
    }

    #[test]
    fn parameters_merge_at_joins() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let mut b = Builder {
            arena: ExprArena::new(),
            locals: LocalTable::new(),
        };
        // b0: if .. b1 else b2; b1: p = 3; b2: use p (either the parameter or the store)
        let overwrite = b.access(0, AccessKind::Store, Type::U_INT);
        let parameter = b.locals.create_parameter(0, Type::INT, None);
        let load = b.access(0, AccessKind::Load, Type::Unknown);

        let mut blocks = BTreeMap::new();
        let block = |accesses: Vec<LocalAccess>, successors: Vec<u32>| BlockAccesses {
            accesses,
            successors: successors.into_iter().map(BlockId).collect(),
            handlers: vec![],
        };
        blocks.insert(BlockId(0), block(vec![], vec![1, 2]));
        blocks.insert(BlockId(1), block(vec![overwrite], vec![2]));
        blocks.insert(BlockId(2), block(vec![load], vec![]));

        let mut diagnostics = vec![];
        let mut resolver = Resolver::new(tcx, &mut b.arena, &mut b.locals, &mut diagnostics);
        let joins = resolver.resolve(BlockId(0), &blocks, &[(Slot::Bytecode(0), parameter)]);
        let bound = resolver.bind(&blocks, Slot::Bytecode(0), BlockId(2), 0);

        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(joins.len(), 1);
        assert_eq!(
            b.locals.find(parameter),
            b.locals.find(overwrite.local),
            "a parameter without writes still merges"
        );
        assert_eq!(b.locals.find(bound), b.locals.find(parameter));
        assert_ne!(
            b.locals.find(load.local),
            b.locals.find(parameter),
            "the load waits for its join"
        );
    }

    #[test]
    fn debug_table_names_and_types() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let mut b = Builder {
            arena: ExprArena::new(),
            locals: LocalTable::new(),
        };
        let store = b.access(1, AccessKind::Store, Type::BOOL_U_INT);
        let load = b.access(1, AccessKind::Load, Type::Unknown);
        let mut blocks = BTreeMap::new();
        blocks.insert(
            BlockId(0),
            BlockAccesses {
                accesses: vec![store, load],
                successors: vec![],
                handlers: vec![],
            },
        );
        let table = vec![LocalVariableEntry {
            slot: 1,
            name: UnqualifiedName::from_string(String::from("count")).unwrap(),
            descriptor: FieldType::Base(BaseType::Short),
            range: None,
        }];

        let mut diagnostics = vec![];
        let mut resolver = Resolver::new(tcx, &mut b.arena, &mut b.locals, &mut diagnostics);
        resolver.apply_debug_table(&table, &blocks);

        let var = b.locals.find(load.local);
        assert_eq!(b.locals.find(store.local), var);
        assert_eq!(b.locals.variable(var).name.as_deref(), Some("count"));
        assert_eq!(b.locals.ty(var), Type::SHORT);
    }
}
