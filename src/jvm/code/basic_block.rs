use crate::jvm::code::{BranchInstruction, Instruction};
use crate::util::Offset;

/// A JVM method code body is made up of a sequence of basic blocks.
///
/// Each instruction carries its offset in the method, which is what diagnostics refer to.
#[derive(Debug, PartialEq, Clone)]
pub struct BasicBlock {
    /// Straight-line instructions in the block
    pub instructions: Vec<(Offset, Instruction)>,

    /// Branch instruction to close the block
    pub branch_end: (Offset, BranchInstruction),
}

impl BasicBlock {
    /// Offset of the first instruction in the block
    pub fn start_offset(&self) -> Offset {
        self.instructions
            .first()
            .map_or(self.branch_end.0, |(offset, _)| *offset)
    }

    /// Does this block consist of nothing but a jump?
    pub fn is_trivial_jump(&self) -> bool {
        self.instructions.is_empty()
            && matches!(
                self.branch_end.1,
                BranchInstruction::Goto(_) | BranchInstruction::FallThrough(_)
            )
    }
}
