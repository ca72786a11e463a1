//! `liquidil parse <src> [-p <spec>]`: run the parser and optimizer without
//! linking, and print the resulting unlinked IL (symbolic `Label` targets
//! still visible, unlike `compile`'s linked listing).

use std::path::Path;

use liquidil_bytecode::dump::dump_ir;
use liquidil_compiler::optimize::{Optimizer, PassSet};
use liquidil_compiler::{Diagnostics, parser};

use crate::error::{CliError, CliResult};

pub fn run(src: &Path, passes: Option<&str>) -> CliResult<()> {
    let source = std::fs::read_to_string(src)?;
    let file = src.display().to_string();

    let (ir, mut interner, _register_count) = match parser::parse(&source) {
        Ok(parsed) => parsed,
        Err(err) => {
            let diagnostics = Diagnostics::new(&file, &source);
            eprintln!("{}", diagnostics.render(&err));
            return Err(CliError::Compile(err));
        }
    };

    let optimizer = Optimizer::new(PassSet::parse(passes));
    let optimized = optimizer.run(ir, &mut interner);
    print!("{}", dump_ir(&optimized, &interner));
    Ok(())
}
