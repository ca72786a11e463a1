//! Runtime engine: the VM and Scope/Context.

mod scope;
mod vm;

pub use scope::{ForIterState, ForLoopDrop, Interrupt, Scope, TablerowIterState, TablerowLoopDrop};
pub use vm::{Vm, VmLimits};
