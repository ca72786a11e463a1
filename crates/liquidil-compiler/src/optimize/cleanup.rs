//! Passes 7, 9, 11, 13: the structural cleanup passes that don't
//! need constant evaluation — dropping `NOOP`s, merging adjacent
//! `WRITE_RAW`s (run twice, once before and once after dead-code
//! elimination re-exposes new adjacencies), and deleting jumps that
//! target the position immediately following them (pass 8).
//!
//! Each pass is a total function over the instruction vector, with its
//! own inline test module.

use liquidil_bytecode::{InstrKind, InstructionIR, Interner};

/// Pass 7: drop `NOOP` instructions that carry no label (a labeled NOOP
/// is a live jump target and must survive for the linker).
pub fn remove_noop(program: Vec<InstructionIR>) -> Vec<InstructionIR> {
    program
        .into_iter()
        .filter(|instr| instr.label.is_some() || !matches!(instr.kind, InstrKind::Nop))
        .collect()
}

/// Passes 9 & 11: concatenate runs of adjacent `WRITE_RAW` instructions
/// (neither carrying a label, so merging can't skip a jump target) into
/// one.
pub fn merge_raw_writes(program: Vec<InstructionIR>, interner: &mut Interner) -> Vec<InstructionIR> {
    let mut out: Vec<InstructionIR> = Vec::with_capacity(program.len());

    for instr in program {
        if instr.label.is_none() {
            if let InstrKind::WriteRaw(sym) = &instr.kind {
                if let Some(prev) = out.last() {
                    if prev.label.is_none() {
                        if let InstrKind::WriteRaw(prev_sym) = &prev.kind {
                            let merged = format!("{}{}", interner.resolve(*prev_sym), interner.resolve(*sym));
                            let merged_sym = interner.intern_owned(merged);
                            let span = prev.span.zip(instr.span).map(|(a, b)| a.merge(b)).or(instr.span).or(prev.span);
                            out.pop();
                            let mut folded = InstructionIR::new(InstrKind::WriteRaw(merged_sym));
                            folded.span = span;
                            out.push(folded);
                            continue;
                        }
                    }
                }
            }
        }
        out.push(instr);
    }

    out
}

/// Pass 8: an unconditional `JUMP` whose target label is attached to the
/// very next instruction is a no-op; delete it. Conditional jumps are
/// left alone since dropping them would also drop the pop of their
/// condition operand.
pub fn remove_jump_to_next(program: Vec<InstructionIR>) -> Vec<InstructionIR> {
    let mut result = Vec::with_capacity(program.len());
    for (i, instr) in program.iter().enumerate() {
        if let InstrKind::Jump(target) = &instr.kind {
            if let Some(next) = program.get(i + 1) {
                if next.label == Some(*target) {
                    continue;
                }
            }
        }
        result.push(instr.clone());
    }
    result
}

/// Pass 10: delete unreachable code — any run of instructions between an
/// unconditional transfer (`Jump`, `Break`, `Continue`, `ForEnd` acting as
/// a loop-back point is not unconditional so excluded) and the next label.
pub fn remove_unreachable(program: Vec<InstructionIR>) -> Vec<InstructionIR> {
    let mut out: Vec<InstructionIR> = Vec::with_capacity(program.len());
    let mut dead = false;

    for instr in program {
        if instr.label.is_some() {
            dead = false;
        }
        if dead {
            continue;
        }
        let terminates = matches!(instr.kind, InstrKind::Jump(_));
        out.push(instr);
        if terminates {
            dead = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidil_bytecode::Label;

    #[test]
    fn remove_noop_drops_unlabeled_nops() {
        let program = vec![InstructionIR::new(InstrKind::Nop), InstructionIR::new(InstrKind::Pop)];
        let out = remove_noop(program);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn remove_noop_keeps_labeled_nops() {
        let label = Label::from_raw(0);
        let program = vec![InstructionIR::new(InstrKind::Nop).labeled(label)];
        let out = remove_noop(program);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn merges_adjacent_raw_writes() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        let program = vec![
            InstructionIR::new(InstrKind::WriteRaw(a)),
            InstructionIR::new(InstrKind::WriteRaw(b)),
        ];
        let out = merge_raw_writes(program, &mut interner);
        assert_eq!(out.len(), 1);
        match &out[0].kind {
            InstrKind::WriteRaw(sym) => assert_eq!(interner.resolve(*sym), "foobar"),
            _ => panic!(),
        }
    }

    #[test]
    fn removes_jump_to_immediately_following_label() {
        let label = Label::from_raw(0);
        let program = vec![
            InstructionIR::new(InstrKind::Jump(label)),
            InstructionIR::new(InstrKind::Dup).labeled(label),
        ];
        let out = remove_jump_to_next(program);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].kind, InstrKind::Dup));
    }

    #[test]
    fn removes_code_after_unconditional_jump() {
        let label = Label::from_raw(0);
        let program = vec![
            InstructionIR::new(InstrKind::Jump(label)),
            InstructionIR::new(InstrKind::Pop), // unreachable
            InstructionIR::new(InstrKind::Nop).labeled(label),
            InstructionIR::new(InstrKind::Dup),
        ];
        let out = remove_unreachable(program);
        assert_eq!(out.len(), 3);
        assert!(!out.iter().any(|i| matches!(i.kind, InstrKind::Pop)));
    }
}
