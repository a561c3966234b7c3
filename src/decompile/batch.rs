use super::{Error, MethodAnalyzer, MethodOutput, Settings};
use crate::jvm::code::MethodInfo;
use crate::types::TypeContext;
use rayon::prelude::*;

/// Analyze many methods in parallel, returning one result per method (in order)
///
/// Methods are independent: an error in one is reported in its slot and the others carry on. The
/// class graph behind `tcx` is shared by every worker.
pub fn analyze_methods<'g>(
    tcx: TypeContext<'g>,
    methods: &[MethodInfo],
    settings: &Settings,
) -> Vec<Result<MethodOutput<'g>, Error>> {
    let analyze_all = || {
        methods
            .par_iter()
            .map(|method| MethodAnalyzer::new(tcx, settings).analyze(method))
            .collect()
    };

    match rayon::ThreadPoolBuilder::new()
        .num_threads(settings.workers)
        .thread_name(|index| format!("jdecomp-{}", index))
        .build()
    {
        Ok(pool) => pool.install(analyze_all),
        Err(err) => {
            log::warn!("Could not start analysis workers ({}), running inline", err);
            methods
                .iter()
                .map(|method| MethodAnalyzer::new(tcx, settings).analyze(method))
                .collect()
        }
    }
}
