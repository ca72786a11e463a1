//! Template compiler front end: lexer, recursive-descent parser, optimizer,
//! and linker. Produces a `liquidil_bytecode::Program` ready for
//! `liquidil-vm` to execute.

pub mod builder;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod link;
pub mod optimize;
pub mod parser;

pub use error::{CompileError, CompileResult, Pos};
pub use diagnostics::Diagnostics;
pub use link::LinkError;
pub use optimize::{Optimizer, PassSet};

use liquidil_bytecode::Program;

/// Compiles a template through the full pipeline: parse → optimize →
/// link. Optimizer passes are selected via the `LIQUIDIL_PASSES`
/// environment variable; absent, all passes run.
pub fn compile(source: &str) -> CompileResult<Program> {
    compile_with(source, &Optimizer::from_env())
}

/// Like `compile`, but with an explicit `Optimizer` instead of reading
/// `LIQUIDIL_PASSES` from the environment — used by the CLI's `passes`
/// subcommand and by tests that want deterministic pass selection.
pub fn compile_with(source: &str, optimizer: &Optimizer) -> CompileResult<Program> {
    let (ir, mut interner, register_count) = parser::parse(source)?;
    let optimized = optimizer.run(ir, &mut interner);
    let linked = link::link(optimized).map_err(|err| match err {
        LinkError::UnresolvedLabel(label) => CompileError::UnresolvedJumpTarget { label },
    })?;
    Ok(Program::new(linked, interner, register_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_simple_template() {
        let program = compile("hello {{ name }}!").unwrap();
        assert!(!program.is_empty());
    }

    #[test]
    fn surfaces_parse_errors() {
        let err = compile("{% if x %}").unwrap_err();
        assert!(matches!(err, CompileError::ExpectedEndTag { .. }));
    }
}
