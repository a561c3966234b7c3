/// Knobs for the analysis of a method
///
/// Every feature is on by default. Turning one off keeps the corresponding bytecode idiom as-is
/// in the output, which is mostly useful when debugging the decompiler itself.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Turn `dup`, `swap`, and friends into expressions
    ///
    /// When off, stack shuffles stay in the output as [`crate::flow::StackOp`] blocks over
    /// explicit stack slot variables.
    pub resolve_stack_operations: bool,

    /// Fold temporaries that are assigned once and immediately used once back into their use
    pub inline_temporaries: bool,

    /// Recognize `finally` blocks from the code compilers duplicate on every exit
    pub detect_finally: bool,

    /// Fold chains of conditional branches into `&&` and `||`
    pub combine_conditions: bool,

    /// Name (and type) variables from the local variable table, when there is one
    pub use_debug_names: bool,

    /// How many times inference may narrow one node before giving up on it
    pub max_narrowings: usize,

    /// Worker threads for batch analysis (`0` picks one per CPU)
    pub workers: usize,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            resolve_stack_operations: true,
            inline_temporaries: true,
            detect_finally: true,
            combine_conditions: true,
            use_debug_names: true,
            max_narrowings: 32,
            workers: 0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new()
    }
}
