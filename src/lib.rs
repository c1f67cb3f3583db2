//! Kei compiler mid-end: typed AST lowering, mem2reg, and de-SSA.
//!
//! The pipeline glue layer (§4.7). The checker, parser, and emitter are
//! external collaborators (§2 Non-goals); this crate starts from an
//! already-typed [`ast::Program`] plus its [`checker::CheckResult`]
//! contract and produces the IR the emitter consumes.

pub mod ast;
pub mod cfg;
pub mod checker;
pub mod dessa;
pub mod dominance;
pub mod ir;
pub mod lower;
pub mod mem2reg;
pub mod printer;
pub mod settings;
pub mod utils;

use anyhow::Context;
use log::debug;

use ir::Module;
use settings::PipelineSettings;
use utils::Result;

/// Runs lowering and whichever of mem2reg/de-SSA `settings` asks for,
/// over one typed program, in one pipeline call.
///
/// Mirrors the teacher's staged `IRGenerator::generate` ->
/// `optimize::run` driver, but generalized to make each stage optional
/// per [`PipelineSettings`]. `anyhow::Context` is attached at each step
/// so a failure names which stage (and, via the error variant, which
/// function/block) it happened in.
pub fn run_pipeline(program: &ast::Program, check: &checker::CheckResult, module_name: &str, settings: PipelineSettings) -> anyhow::Result<Module> {
    debug!("lowering module `{module_name}`");
    let module = lower::lower_program(program, check, module_name).with_context(|| format!("lowering module `{module_name}`"))?;

    run_post_lowering(module, module_name, settings)
}

/// Like [`run_pipeline`] but for one module among several that will
/// later be merged (§5); threads the module's import prefix through to
/// the lowerer.
pub fn run_pipeline_with_prefix(
    program: &ast::Program,
    check: &checker::CheckResult,
    module_name: &str,
    module_prefix: Option<String>,
    settings: PipelineSettings,
) -> anyhow::Result<Module> {
    debug!("lowering module `{module_name}` (prefix {module_prefix:?})");
    let module = lower::lower_program_with_prefix(program, check, module_name, module_prefix)
        .with_context(|| format!("lowering module `{module_name}`"))?;

    run_post_lowering(module, module_name, settings)
}

fn run_post_lowering(mut module: Module, module_name: &str, settings: PipelineSettings) -> anyhow::Result<Module> {
    // De-SSA without mem2reg would clear φ-nodes mem2reg never inserted,
    // silently discarding the program's real data flow (the Open
    // Question in §9, resolved here rather than left to the caller).
    let run_mem2reg = settings.run_mem2reg || settings.run_dessa;

    if run_mem2reg {
        debug!("running mem2reg on `{module_name}`");
        module = mem2reg::run(module).with_context(|| format!("mem2reg on module `{module_name}`"))?;
    }

    if settings.run_dessa {
        debug!("running de-SSA on `{module_name}`");
        module = dessa::run(module).with_context(|| format!("de-SSA on module `{module_name}`"))?;
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckResult;

    fn empty_check() -> CheckResult {
        CheckResult::default()
    }

    #[test]
    fn empty_program_lowers_to_empty_module() {
        let program = ast::Program { items: vec![] };
        let module = run_pipeline(&program, &empty_check(), "empty", PipelineSettings::default()).unwrap();
        assert_eq!(module.name, "empty");
        assert!(module.functions.is_empty());
    }

    #[test]
    fn lowering_only_settings_skip_mem2reg_and_dessa() {
        let program = ast::Program { items: vec![] };
        let module = run_pipeline(&program, &empty_check(), "m", PipelineSettings::lowering_only()).unwrap();
        assert!(module.functions.is_empty());
    }

    #[test]
    fn requesting_dessa_alone_still_runs_mem2reg() {
        // Exercises the Open Question resolution directly: constructing
        // a settings value that asks for dessa without mem2reg must not
        // panic or silently drop phi data; run_post_lowering upgrades it.
        let settings = PipelineSettings { run_mem2reg: false, run_dessa: true };
        let program = ast::Program { items: vec![] };
        let module = run_pipeline(&program, &empty_check(), "m", settings).unwrap();
        assert!(module.functions.is_empty());
    }
}
