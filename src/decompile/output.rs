use super::Diagnostic;
use crate::expr::ExprArena;
use crate::flow::StructuredBlock;
use crate::jvm::code::MethodInfo;
use crate::jvm::{BinaryName, MethodAccessFlags, MethodDescriptor, UnqualifiedName};
use crate::locals::{LocalId, Slot};
use crate::types::Type;

/// Everything known about a decompiled method, ready to be rendered
#[derive(Debug)]
pub struct MethodOutput<'g> {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub access_flags: MethodAccessFlags,

    /// Structured body
    pub root: StructuredBlock,

    /// Typed expression nodes the body refers to
    pub arena: ExprArena<'g>,

    /// Variables still used by the body, parameters first
    pub locals: Vec<LocalSummary<'g>>,

    pub diagnostics: Vec<Diagnostic>,
}

impl<'g> MethodOutput<'g> {
    pub(super) fn new(
        method: &MethodInfo,
        root: StructuredBlock,
        arena: ExprArena<'g>,
        locals: Vec<LocalSummary<'g>>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        MethodOutput {
            class: method.class.clone(),
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            access_flags: method.access_flags,
            root,
            arena,
            locals,
            diagnostics,
        }
    }

    /// Summary of a variable, by the id its loads and stores refer to
    pub fn local(&self, id: LocalId) -> Option<&LocalSummary<'g>> {
        self.locals.iter().find(|local| local.id == id)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Declared parameters (`this` excluded), in order
    pub fn parameters(&self) -> impl Iterator<Item = &LocalSummary<'g>> {
        self.locals
            .iter()
            .filter(|local| local.is_parameter && local.name != "this")
    }
}

/// Resolved local variable
#[derive(Clone, Debug)]
pub struct LocalSummary<'g> {
    pub id: LocalId,
    pub slot: Slot,
    pub name: String,

    /// Inferred set of types
    pub ty: Type<'g>,

    /// Single type to declare the variable with
    pub declared: Type<'g>,

    pub is_parameter: bool,

    /// Assigned at most once
    pub is_final: bool,
}
