//! Control flow structuring
//!
//! Decoding produces a [`FlowGraph`]: one node per basic block, each holding a list of statements
//! and an [`Exit`] (a jump, a two-way branch on a condition, or a `switch`). The [`Structurer`]
//! collapses that graph, one recognized shape at a time, into a single [`StructuredBlock`] tree of
//! sequences, conditionals, loops, `switch`es, and `try`s. Control flow that doesn't fit is kept
//! with explicit jumps rather than rejected.
//!
//! [`flatten`] goes the other way, which is what lets tests check that structuring preserved the
//! control flow of a method.

mod dominators;
mod finally;
mod flatten;
mod graph;
mod matchers;
mod structured;
mod structurer;

pub use dominators::*;
pub use finally::same_statement;
pub use flatten::*;
pub use graph::*;
pub use structured::*;
pub use structurer::{Reinference, Structurer};
