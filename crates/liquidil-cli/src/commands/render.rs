//! `liquidil render <path> [--json assigns] [--strict]`: compile and run a
//! template against a file-system-backed partial resolver rooted at the
//! template's own directory.

use std::collections::HashMap;
use std::path::Path;

use liquidil_bytecode::Value;
use liquidil_compiler::Diagnostics;
use liquidil_vm::{BuiltinFilters, DirFileSystem, Vm};

use crate::error::{CliError, CliResult};

pub fn run(path: &Path, json: Option<&str>, strict: bool) -> CliResult<()> {
    let source = std::fs::read_to_string(path)?;
    let file = path.display().to_string();

    let program = match liquidil_compiler::compile(&source) {
        Ok(program) => program,
        Err(err) => {
            let diagnostics = Diagnostics::new(&file, &source);
            eprintln!("{}", diagnostics.render(&err));
            return Err(CliError::Compile(err));
        }
    };

    let assigns = match json {
        Some(text) => json_object_to_assigns(serde_json::from_str(text)?)?,
        None => HashMap::new(),
    };

    let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let fs = DirFileSystem::new(root);
    let filters = BuiltinFilters::new();
    let mut vm = Vm::new(&filters, &fs).render_errors(!strict);

    match vm.render(&program, &source, file.as_str().into(), assigns) {
        Ok(output) => {
            print!("{output}");
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.render());
            Err(CliError::Runtime(err))
        }
    }
}

fn json_object_to_assigns(value: serde_json::Value) -> CliResult<HashMap<String, Value>> {
    match value {
        serde_json::Value::Object(map) => Ok(map.into_iter().map(|(k, v)| (k, json_to_value(v))).collect()),
        _ => Err(CliError::AssignsNotAnObject),
    }
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => Value::list(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => {
            let mut entries = indexmap::IndexMap::new();
            for (k, v) in map {
                entries.insert(k, json_to_value(v));
            }
            Value::map(entries)
        }
    }
}
