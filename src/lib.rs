//! Typed, structured decompilation of JVM method bodies
//!
//! The pipeline for one method lives in [`decompile`]. It builds on the type lattice in
//! [`types`], the expression trees in [`expr`], local variable resolution in [`locals`], and
//! control flow structuring in [`flow`]. [`render`] prints the result as Java-like source.

pub mod decompile;
pub mod expr;
pub mod flow;
pub mod jvm;
pub mod locals;
pub mod render;
pub mod types;
pub mod util;
