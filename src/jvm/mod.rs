//! Model of the JVM side of decompilation
//!
//! This covers names and descriptors, the class hierarchy that the type lattice consults, and the
//! block-structured method code that the decompiler consumes. Nothing here parses class files:
//! method bodies come in already split into basic blocks (see [`code::listing`] for a textual
//! format that produces them).

mod access_flags;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
