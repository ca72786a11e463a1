//! The linked program container the VM executes.

use liquidil_core::Interner;

use crate::instr::Instruction;
use crate::span::Span;

/// A fully linked, optimized template program: one flat instruction
/// vector addressed by `StepId`, plus the interner needed to resolve the
/// `Symbol`s embedded in instruction operands.
///
/// Immutable and `Send + Sync` once built, so a
/// single compiled `Program` can be rendered concurrently from multiple
/// threads against independent `Scope`s.
#[derive(Debug)]
pub struct Program {
    instructions: Vec<Instruction>,
    interner: Interner,
    /// Number of `StoreTemp`/`LoadTemp` register slots the parser used
    /// (e.g. one per `case`/`when` subject).
    register_count: u32,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>, interner: Interner, register_count: u32) -> Self {
        Self { instructions, interner, register_count }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub fn register_count(&self) -> u32 {
        self.register_count
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn span_at(&self, ip: usize) -> Option<Span> {
        self.instructions.get(ip).and_then(|i| i.span)
    }

    pub fn dump(&self) -> String {
        crate::dump::dump_linked(&self.instructions, &self.interner)
    }
}
