//! Method analysis driver
//!
//! [`MethodAnalyzer`] takes one method through every stage: decoding the blocks into expression
//! trees, resolving bytecode slots into variables, type inference, structuring the control flow,
//! simplification, and finally naming the variables. [`analyze_methods`] does the same for many
//! methods at once.

mod batch;
mod decoder;
mod diagnostics;
mod errors;
mod method;
mod output;
mod settings;

pub use batch::analyze_methods;
pub use decoder::{validate, Decoded, Decoder};
pub use diagnostics::*;
pub use errors::*;
pub use method::MethodAnalyzer;
pub use output::*;
pub use settings::*;
