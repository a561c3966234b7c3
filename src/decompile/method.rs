use super::decoder::{validate, Decoded, Decoder};
use super::{Diagnostic, DiagnosticKind, Error, LocalSummary, MethodOutput, Settings};
use crate::expr::{infer, simplify, ExprArena, ExprId};
use crate::flow::{Exit, FlowGraph, Reinference, StructuredBlock, Structurer};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{LocalVariableEntry, MethodInfo};
use crate::jvm::Name;
use crate::locals::resolver::Resolver;
use crate::locals::temporaries::inline_temporaries;
use crate::locals::{LocalId, LocalTable, Slot};
use crate::types::{Type, TypeContext};
use crate::util::Offset;
use std::collections::{BTreeSet, HashSet};

/// Runs every stage of the analysis on one method at a time
pub struct MethodAnalyzer<'a, 'g> {
    tcx: TypeContext<'g>,
    settings: &'a Settings,
}

impl<'a, 'g> MethodAnalyzer<'a, 'g> {
    pub fn new(tcx: TypeContext<'g>, settings: &'a Settings) -> Self {
        MethodAnalyzer { tcx, settings }
    }

    pub fn analyze(&self, method: &MethodInfo) -> Result<MethodOutput<'g>, Error> {
        log::info!("Analyzing {}", method.qualified_name());
        validate(&method.code)?;

        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let mut diagnostics = vec![];

        let Decoded {
            mut graph,
            accesses,
            entry_definitions,
        } = Decoder::new(
            self.tcx,
            method,
            &mut arena,
            &mut locals,
            self.settings.resolve_stack_operations,
        )
        .decode()?;

        let mut resolver = Resolver::new(self.tcx, &mut arena, &mut locals, &mut diagnostics);
        let joins = resolver.resolve(graph.entry, &accesses, &entry_definitions);
        if self.settings.use_debug_names {
            let table = &method.code.local_variable_table;
            resolver.apply_debug_table(table, &accesses);
            name_parameters(&mut locals, &entry_definitions, table, graph.entry);
        }

        if self.settings.inline_temporaries {
            let inlined = inline_graph(&mut graph, &mut arena, &mut locals);
            log::debug!("Inlined {} temporaries", inlined);
        }

        let max_narrowings = self.settings.max_narrowings;
        infer(
            self.tcx,
            &mut arena,
            &mut locals,
            &mut diagnostics,
            max_narrowings,
        );

        let mut root = Structurer::new(graph, &mut arena, &mut diagnostics)
            .with_finally_detection(self.settings.detect_finally)
            .with_condition_merging(self.settings.combine_conditions)
            .with_inference(Reinference {
                tcx: self.tcx,
                locals: &mut locals,
                max_narrowings,
                joins,
            })
            .structure();

        root.map_expressions(&mut |expr| simplify(&mut arena, expr));
        infer(
            self.tcx,
            &mut arena,
            &mut locals,
            &mut diagnostics,
            max_narrowings,
        );

        let summaries = name_locals(self.tcx, &arena, &mut locals);
        report_guessed_classes(&summaries, &arena, &locals, &mut diagnostics);
        log::info!(
            "Finished {} ({} variables, {} diagnostics)",
            method.qualified_name(),
            summaries.len(),
            diagnostics.len()
        );
        Ok(MethodOutput::new(
            method,
            root,
            arena,
            summaries,
            diagnostics,
        ))
    }
}

/// Name parameters that are never read (so the debug table didn't reach them)
fn name_parameters(
    locals: &mut LocalTable<'_>,
    parameters: &[(Slot, LocalId)],
    table: &[LocalVariableEntry],
    entry: crate::jvm::code::BlockId,
) {
    for (slot, local) in parameters {
        let slot = match slot {
            Slot::Bytecode(slot) => *slot,
            _ => continue,
        };
        let representative = locals.find(*local);
        let variable = locals.variable_mut(representative);
        if variable.name.is_some() {
            continue;
        }
        if let Some(entry) = table.iter().find(|e| e.covers(slot, entry)) {
            variable.name = Some(String::from(entry.name.as_str()));
        }
    }
}

/// Inline temporaries in each straight-line block of the graph
fn inline_graph<'g>(
    graph: &mut FlowGraph,
    arena: &mut ExprArena<'g>,
    locals: &mut LocalTable<'g>,
) -> usize {
    let mut inlined = 0;
    for node in graph.nodes.values_mut() {
        let mut statements = std::mem::take(&mut node.block).into_statements();
        let mut exits: Vec<ExprId> = node.exit.expression().into_iter().collect();
        inlined += inline_temporaries(arena, locals, &mut statements, &mut exits);
        if let Some(expr) = exits.first() {
            match &mut node.exit {
                Exit::Branch { condition, .. } => *condition = *expr,
                Exit::Switch { selector, .. } => *selector = *expr,
                Exit::None | Exit::Jump(_) => (),
            }
        }
        node.block = StructuredBlock::sequence(statements);
    }
    inlined
}

/// Pick a unique name for every variable still in use, parameters first
fn name_locals<'g>(
    tcx: TypeContext<'g>,
    arena: &ExprArena<'g>,
    locals: &mut LocalTable<'g>,
) -> Vec<LocalSummary<'g>> {
    let mut used: Vec<LocalId> = locals
        .representatives()
        .filter(|id| {
            let variable = locals.variable(*id);
            variable.is_parameter
                || locals
                    .references(*id)
                    .into_iter()
                    .any(|expr| arena.is_live(expr))
        })
        .collect();
    used.sort_by_key(|id| {
        let variable = locals.variable(*id);
        (!variable.is_parameter, variable.slot, *id)
    });

    let mut taken = HashSet::new();
    let mut summaries = vec![];
    for id in used {
        let is_final = locals.is_final_eligible(id, arena);
        let variable = locals.variable_mut(id);
        let base = match (&variable.name, variable.slot) {
            (Some(name), _) => name.clone(),
            (None, Slot::Stack(depth)) => format!("stack_{}", depth),
            (None, _) => tcx.default_name(variable.ty),
        };
        let name = unique_name(&mut taken, base);
        variable.name = Some(name.clone());
        summaries.push(LocalSummary {
            id,
            slot: variable.slot,
            name,
            ty: variable.ty,
            declared: tcx.hint(variable.ty),
            is_parameter: variable.is_parameter,
            is_final,
        });
    }
    summaries
}

fn unique_name(taken: &mut HashSet<String>, base: String) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    (1..)
        .map(|suffix| format!("{}{}", base, suffix))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or(base)
}

/// Warn about variables declared with a class whose hierarchy had to be guessed
fn report_guessed_classes(
    summaries: &[LocalSummary<'_>],
    arena: &ExprArena<'_>,
    locals: &LocalTable<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut reported = BTreeSet::new();
    for summary in summaries {
        let class = match summary.declared {
            Type::Class(set) => match set.single() {
                Some(class) => class,
                None => continue,
            },
            _ => continue,
        };
        if !ClassGraph::has_guessed_ancestor(class) || !reported.insert(class.name.clone()) {
            continue;
        }
        let address = locals
            .references(summary.id)
            .first()
            .map_or(Offset(0), |expr| arena[*expr].address);
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::HierarchyUnavailable,
            address,
            format!(
                "'{}' has type {}, whose hierarchy is guessed",
                summary.name, class.name
            ),
        ));
    }
}
