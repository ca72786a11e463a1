//! Passes 4, 5 & 20: fuse a chain of lookups (and, where that chain ends
//! in a write, the write itself) into one instruction, so a dotted
//! property access after a computed index — `collection[0].name.first`,
//! or a bare `{{ var.path }}` — pays for one dispatch instead of one per
//! segment.
//!
//! The parser already collapses a *leading* dot-chain off an identifier
//! directly into `FindVarPath` (`parser.rs::parse_identifier_chain`); the
//! cases these passes clean up are the ones that can't be known at parse
//! time to be chain-collapsible there — a dot-chain resuming after a
//! `[...]` index, or ending in `WriteValue`.

use liquidil_bytecode::{InstrKind, InstructionIR};

/// Passes 4 & 5: merge a run of two or more adjacent, unlabeled
/// `LookupConstKey` instructions into one `LookupConstPath`, and merge an
/// unlabeled `FindVar` immediately followed by one or more unlabeled
/// `LookupConstKey` into a `FindVarPath`. Neither fires across a label,
/// since a labeled instruction is a jump target that must stay addressable.
pub fn collapse_const_key_chains(program: Vec<InstructionIR>) -> Vec<InstructionIR> {
    let mut out: Vec<InstructionIR> = Vec::with_capacity(program.len());

    for instr in program {
        if instr.label.is_none() {
            if let InstrKind::LookupConstKey(sym) = &instr.kind {
                let sym = *sym;
                if let Some(prev) = out.last() {
                    if prev.label.is_none() {
                        match &prev.kind {
                            InstrKind::LookupConstKey(prev_sym) => {
                                let span = merge_spans(prev.span, instr.span);
                                let prev_sym = *prev_sym;
                                out.pop();
                                let mut folded = InstructionIR::new(InstrKind::LookupConstPath(vec![prev_sym, sym]));
                                folded.span = span;
                                out.push(folded);
                                continue;
                            }
                            InstrKind::LookupConstPath(path) => {
                                let mut path = path.clone();
                                path.push(sym);
                                let span = merge_spans(prev.span, instr.span);
                                out.pop();
                                let mut folded = InstructionIR::new(InstrKind::LookupConstPath(path));
                                folded.span = span;
                                out.push(folded);
                                continue;
                            }
                            InstrKind::FindVar(base) => {
                                let base = *base;
                                let span = merge_spans(prev.span, instr.span);
                                out.pop();
                                let mut folded = InstructionIR::new(InstrKind::FindVarPath(base, vec![sym]));
                                folded.span = span;
                                out.push(folded);
                                continue;
                            }
                            InstrKind::FindVarPath(base, path) => {
                                let base = *base;
                                let mut path = path.clone();
                                path.push(sym);
                                let span = merge_spans(prev.span, instr.span);
                                out.pop();
                                let mut folded = InstructionIR::new(InstrKind::FindVarPath(base, path));
                                folded.span = span;
                                out.push(folded);
                                continue;
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        out.push(instr);
    }

    out
}

/// Pass 20: fuse a lookup immediately followed by `WriteValue` into a
/// single `WriteVar`/`WriteVarPath` step, for the common case of a bare
/// `{{ var }}` or `{{ var.path }}` with no intervening filter or bracket
/// access. Run after [`collapse_const_key_chains`] so a chain that was
/// just fused into one `FindVarPath` is itself eligible here.
pub fn fuse_var_writes(program: Vec<InstructionIR>) -> Vec<InstructionIR> {
    let mut out: Vec<InstructionIR> = Vec::with_capacity(program.len());

    for instr in program {
        if instr.label.is_none() && matches!(instr.kind, InstrKind::WriteValue) {
            if let Some(prev) = out.last() {
                if prev.label.is_none() {
                    match &prev.kind {
                        InstrKind::FindVar(sym) => {
                            let sym = *sym;
                            let span = merge_spans(prev.span, instr.span);
                            out.pop();
                            let mut folded = InstructionIR::new(InstrKind::WriteVar(sym));
                            folded.span = span;
                            out.push(folded);
                            continue;
                        }
                        InstrKind::FindVarPath(base, path) => {
                            let base = *base;
                            let path = path.clone();
                            let span = merge_spans(prev.span, instr.span);
                            out.pop();
                            let mut folded = InstructionIR::new(InstrKind::WriteVarPath(base, path));
                            folded.span = span;
                            out.push(folded);
                            continue;
                        }
                        _ => {}
                    }
                }
            }
        }
        out.push(instr);
    }

    out
}

fn merge_spans(
    a: Option<liquidil_bytecode::Span>,
    b: Option<liquidil_bytecode::Span>,
) -> Option<liquidil_bytecode::Span> {
    a.zip(b).map(|(x, y)| x.merge(y)).or(b).or(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidil_core::Interner;

    #[test]
    fn collapses_two_lookup_const_keys_into_one_path() {
        let mut interner = Interner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let program = vec![
            InstructionIR::new(InstrKind::LookupKey),
            InstructionIR::new(InstrKind::LookupConstKey(a)),
            InstructionIR::new(InstrKind::LookupConstKey(b)),
        ];
        let out = collapse_const_key_chains(program);
        assert_eq!(out.len(), 2);
        match &out[1].kind {
            InstrKind::LookupConstPath(path) => assert_eq!(path, &vec![a, b]),
            other => panic!("expected LookupConstPath, got {other:?}"),
        }
    }

    #[test]
    fn collapses_find_var_then_lookup_const_key_into_find_var_path() {
        let mut interner = Interner::new();
        let base = interner.intern("x");
        let key = interner.intern("y");
        let program = vec![InstructionIR::new(InstrKind::FindVar(base)), InstructionIR::new(InstrKind::LookupConstKey(key))];
        let out = collapse_const_key_chains(program);
        assert_eq!(out.len(), 1);
        match &out[0].kind {
            InstrKind::FindVarPath(b, path) => {
                assert_eq!(*b, base);
                assert_eq!(path, &vec![key]);
            }
            other => panic!("expected FindVarPath, got {other:?}"),
        }
    }

    #[test]
    fn does_not_collapse_across_a_label() {
        use liquidil_bytecode::Label;
        let mut interner = Interner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let label = Label::from_raw(0);
        let program = vec![
            InstructionIR::new(InstrKind::LookupConstKey(a)),
            InstructionIR::new(InstrKind::LookupConstKey(b)).labeled(label),
        ];
        let out = collapse_const_key_chains(program);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn fuses_find_var_and_write_value_into_write_var() {
        let mut interner = Interner::new();
        let sym = interner.intern("name");
        let program = vec![InstructionIR::new(InstrKind::FindVar(sym)), InstructionIR::new(InstrKind::WriteValue)];
        let out = fuse_var_writes(program);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0].kind, InstrKind::WriteVar(s) if *s == sym));
    }

    #[test]
    fn fuses_find_var_path_and_write_value_into_write_var_path() {
        let mut interner = Interner::new();
        let base = interner.intern("user");
        let key = interner.intern("name");
        let program = vec![
            InstructionIR::new(InstrKind::FindVarPath(base, vec![key])),
            InstructionIR::new(InstrKind::WriteValue),
        ];
        let out = fuse_var_writes(program);
        assert_eq!(out.len(), 1);
        match &out[0].kind {
            InstrKind::WriteVarPath(b, path) => {
                assert_eq!(*b, base);
                assert_eq!(path, &vec![key]);
            }
            other => panic!("expected WriteVarPath, got {other:?}"),
        }
    }

    #[test]
    fn leaves_unrelated_write_value_alone() {
        let program = vec![InstructionIR::new(InstrKind::ConstInt(1)), InstructionIR::new(InstrKind::WriteValue)];
        let out = fuse_var_writes(program);
        assert_eq!(out.len(), 2);
    }
}
