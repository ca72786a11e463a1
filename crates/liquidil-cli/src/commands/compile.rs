//! `liquidil compile <path>`: run the full parse → optimize → link
//! pipeline and print the linked instruction listing.

use std::path::Path;

use liquidil_compiler::Diagnostics;

use crate::error::{CliError, CliResult};

pub fn run(path: &Path) -> CliResult<()> {
    let source = std::fs::read_to_string(path)?;
    let file = path.display().to_string();
    match liquidil_compiler::compile(&source) {
        Ok(program) => {
            print!("{}", program.dump());
            Ok(())
        }
        Err(err) => {
            let diagnostics = Diagnostics::new(&file, &source);
            eprintln!("{}", diagnostics.render(&err));
            Err(CliError::Compile(err))
        }
    }
}
