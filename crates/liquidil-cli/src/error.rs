//! Top-level CLI error, wrapping each crate's own error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Compile(#[from] liquidil_compiler::CompileError),

    #[error("{0}")]
    Runtime(#[from] liquidil_vm::RuntimeError),

    #[error("invalid --json assigns: {0}")]
    Json(#[from] serde_json::Error),

    #[error("--json assigns must be an object")]
    AssignsNotAnObject,
}

pub type CliResult<T> = Result<T, CliError>;
