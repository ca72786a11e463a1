//! Re-exports the runtime `Value` domain and drop protocol at
//! `liquidil_vm::value`. The types themselves live in `liquidil-bytecode`
//! so the compiler crate (constant folding, `ConstLit::to_value`) and
//! this crate share one definition instead of two.

pub use liquidil_bytecode::value::{Drop, ErrorMarker, List, LiquidDrop, Map, SourceLocation, Value};
