//! IL builder: appends instructions with parallel span metadata and mints
//! fresh label IDs. The parser is the only consumer; kept separate so
//! optimizer passes can reuse the same "append with span" discipline when
//! they synthesize replacement instructions.

use liquidil_bytecode::{InstrKind, InstructionIR, Label, Span};

#[derive(Default)]
pub struct Builder {
    instructions: Vec<InstructionIR>,
    next_label: u32,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_label(&mut self) -> Label {
        let label = Label::from_raw(self.next_label);
        self.next_label += 1;
        label
    }

    /// Emits `LABEL(label)` as a marker instruction at the current
    /// position (erased by the linker after resolving jump targets).
    pub fn place_label(&mut self, label: Label) {
        self.instructions.push(InstructionIR::new(InstrKind::Nop).labeled(label));
    }

    pub fn emit(&mut self, kind: InstrKind<Label>, span: Span) -> usize {
        let idx = self.instructions.len();
        self.instructions.push(InstructionIR::new(kind).spanned(span));
        idx
    }

    pub fn emit_unspanned(&mut self, kind: InstrKind<Label>) -> usize {
        let idx = self.instructions.len();
        self.instructions.push(InstructionIR::new(kind));
        idx
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut InstructionIR> {
        self.instructions.get_mut(idx)
    }

    pub fn get(&self, idx: usize) -> Option<&InstructionIR> {
        self.instructions.get(idx)
    }

    pub fn last_mut(&mut self) -> Option<&mut InstructionIR> {
        self.instructions.last_mut()
    }

    /// Removes and returns every instruction from `idx` onward. Used to
    /// reorder a run of just-emitted instructions (e.g. `for`'s `limit`/
    /// `offset` clauses, which the grammar accepts in any order but whose
    /// stack contract requires a canonical push order).
    pub fn truncate_from(&mut self, idx: usize) -> Vec<InstructionIR> {
        self.instructions.split_off(idx)
    }

    pub fn extend(&mut self, instrs: Vec<InstructionIR>) {
        self.instructions.extend(instrs);
    }

    pub fn finish(self) -> Vec<InstructionIR> {
        self.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_labels_are_distinct() {
        let mut b = Builder::new();
        let l0 = b.fresh_label();
        let l1 = b.fresh_label();
        assert_ne!(l0, l1);
    }

    #[test]
    fn emit_tracks_index() {
        let mut b = Builder::new();
        let i0 = b.emit_unspanned(InstrKind::Pop);
        let i1 = b.emit_unspanned(InstrKind::Dup);
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(b.len(), 2);
    }
}
