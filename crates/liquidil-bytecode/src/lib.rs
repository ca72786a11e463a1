//! IL opcode set, instruction encoding, the `Value` domain, and the linked
//! `Program` container shared by the compiler and VM crates.
//!
//! This crate has no opinion on parsing or execution; it only defines the
//! vocabulary both sides agree on, the way an ISA manual sits between a
//! compiler and a CPU.

pub mod dump;
pub mod instr;
pub mod program;
pub mod span;
pub mod value;

pub use instr::{
    CompareOp, InstrKind, Instruction, InstructionIR, Label, Opcode, PartialName, StepId,
};
pub use program::Program;
pub use span::{LineIndex, Span};
pub use value::{ConstLit, CycleValue, Drop as ValueDrop, ErrorMarker, List, LiquidDrop, Map, SourceLocation, Value};

pub use liquidil_core::{Interner, Symbol};
