use crate::jvm::code::{BasicBlock, BlockId};
use crate::jvm::{
    BinaryName, FieldType, MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName,
};
use std::collections::{BTreeMap, BTreeSet};

/// Semantic representation of a method body
///
/// Blocks are keyed by label and the label order is the layout order of the blocks. Protected
/// ranges of the exception table start and end on block boundaries.
#[derive(Debug, Clone, Default)]
pub struct Code {
    /// Basic blocks in the code
    pub blocks: BTreeMap<BlockId, BasicBlock>,

    /// Exception handlers, innermost first (the order the JVM searches them in)
    pub exception_table: Vec<ExceptionHandler>,

    /// Debug names of local variables
    pub local_variable_table: Vec<LocalVariableEntry>,
}

impl Code {
    /// First block, where execution starts
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.keys().next().copied()
    }

    /// Handlers that protect a block
    pub fn handlers_of(&self, block: BlockId) -> impl Iterator<Item = &ExceptionHandler> {
        self.exception_table
            .iter()
            .filter(move |handler| handler.covers(block))
    }

    /// Normal and exceptional successors of a block
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        let mut successors = self
            .blocks
            .get(&block)
            .map_or(vec![], |b| b.branch_end.1.successors());
        successors.extend(self.handlers_of(block).map(|handler| handler.handler));
        successors
    }

    /// Blocks reachable from the entry, following normal and exceptional edges
    pub fn reachable_blocks(&self) -> BTreeSet<BlockId> {
        let mut reachable = BTreeSet::new();
        let mut to_visit: Vec<BlockId> = self.entry().into_iter().collect();
        while let Some(block) = to_visit.pop() {
            if reachable.insert(block) {
                to_visit.extend(self.successors(block));
            }
        }
        reachable
    }
}

/// Entry in the exception table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First protected block
    pub start: BlockId,

    /// First block past the protected range
    pub end: BlockId,

    /// Handler entry block
    pub handler: BlockId,

    /// Caught class (`None` catches everything, as for `finally`)
    pub catch_type: Option<BinaryName>,
}

impl ExceptionHandler {
    pub fn covers(&self, block: BlockId) -> bool {
        self.start <= block && block < self.end
    }
}

/// Entry in the local variable debug table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub slot: u16,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,

    /// Blocks (start inclusive, end exclusive) where the entry applies, or everywhere if missing
    pub range: Option<(BlockId, BlockId)>,
}

impl LocalVariableEntry {
    pub fn covers(&self, slot: u16, block: BlockId) -> bool {
        self.slot == slot
            && self
                .range
                .map_or(true, |(start, end)| start <= block && block < end)
    }
}

/// A method, along with the code to decompile
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub access_flags: MethodAccessFlags,
    pub code: Code,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Local slot and type of every declared parameter (not including `this`)
    pub fn parameter_slots(&self) -> Vec<(u16, FieldType<BinaryName>)> {
        let mut slot: u16 = if self.is_static() { 0 } else { 1 };
        self.descriptor
            .parameters
            .iter()
            .map(|parameter| {
                let this_slot = slot;
                slot += if parameter.is_wide() { 2 } else { 1 };
                (this_slot, parameter.clone())
            })
            .collect()
    }

    /// Human readable `Class.name` identifier, for logs and diagnostics
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class, self.name.as_str())
    }
}
