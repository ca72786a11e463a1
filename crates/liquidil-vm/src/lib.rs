//! Runtime VM for executing compiled liquidil templates.
//!
//! This crate provides the stack machine that executes `liquidil_bytecode::
//! Program`s against a scope of assigned variables, producing rendered
//! output text.

pub mod engine;
pub mod error;
pub mod filesystem;
pub mod filters;
pub mod value;

pub use engine::{Scope, Vm, VmLimits};
pub use error::{ErrorContext, RuntimeError, RuntimeResult};
pub use filesystem::{DirFileSystem, FileSystemProvider, MapFileSystem};
pub use filters::{BuiltinFilters, FilterError, FilterTable};
