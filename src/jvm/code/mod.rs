//! Bytecode representation
//!
//! ### Structure
//!
//! Method bodies are essentially just a CFG of basic blocks, with an operand stack and a stack of
//! local variables. We split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions (the body of the basic blocks)
//!   - [`BranchInstruction`] for instructions that may branch (the end of the basic blocks)
//!
//! With these, we can represent the method [`Code`] as an ordered sequence of [`BasicBlock`]s
//! plus the exception table. This is the form the decompiler consumes: splitting a raw code array
//! into blocks belongs to whatever reads the class file (or to [`listing`], for text).
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod basic_block;
mod code;
mod instructions;
mod label;
pub mod listing;

pub use basic_block::*;
pub use code::*;
pub use instructions::*;
pub use label::*;
