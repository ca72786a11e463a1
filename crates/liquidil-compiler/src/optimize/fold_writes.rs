//! Pass 3: collapse `CONST_*; WRITE_VALUE` into `WRITE_RAW(s)`.
//! Pass 13: remove the resulting `WRITE_RAW("")` no-ops.
//!
//! Both passes need the interner (to stringify a constant into a fresh
//! `WRITE_RAW` symbol), so they're grouped in one module that takes
//! `&mut Interner` rather than forcing every other pass to thread one
//! through.

use liquidil_bytecode::{ConstLit, InstrKind, InstructionIR, Interner, Symbol};

fn const_lit(kind: &InstrKind<liquidil_bytecode::Label>) -> Option<ConstLit> {
    match kind {
        InstrKind::ConstNil => Some(ConstLit::Nil),
        InstrKind::ConstBool(b) => Some(ConstLit::Bool(*b)),
        InstrKind::ConstInt(i) => Some(ConstLit::Int(*i)),
        InstrKind::ConstFloat(bits) => Some(ConstLit::Float(*bits)),
        InstrKind::ConstString(sym) => Some(ConstLit::String(sym.as_u32().to_string().into())), // placeholder tag, resolved via interner below
        _ => None,
    }
}

fn stringify(lit: &ConstLit, interner: &Interner, string_sym: Option<Symbol>) -> String {
    match lit {
        ConstLit::Nil => String::new(),
        ConstLit::Bool(b) => b.to_string(),
        ConstLit::Int(i) => i.to_string(),
        ConstLit::Float(bits) => {
            let f = f64::from_bits(*bits);
            if f.fract() == 0.0 { format!("{f:.1}") } else { f.to_string() }
        }
        ConstLit::String(_) => interner.resolve(string_sym.expect("string literal needs its symbol")).to_string(),
    }
}

/// Pass 3: `CONST_*; WRITE_VALUE` -> `WRITE_RAW(stringified)`.
pub fn fold_constant_writes(program: Vec<InstructionIR>, interner: &mut Interner) -> Vec<InstructionIR> {
    let mut out: Vec<InstructionIR> = Vec::with_capacity(program.len());

    for instr in program {
        if let InstrKind::WriteValue = &instr.kind {
            if let Some(prev) = out.last() {
                if prev.label.is_none() {
                    let string_sym = match &prev.kind {
                        InstrKind::ConstString(sym) => Some(*sym),
                        _ => None,
                    };
                    if let Some(lit) = const_lit(&prev.kind) {
                        let text = stringify(&lit, interner, string_sym);
                        let span = instr.span.or(prev.span);
                        out.pop();
                        let raw_sym = interner.intern_owned(text);
                        let mut folded = InstructionIR::new(InstrKind::WriteRaw(raw_sym));
                        folded.span = span;
                        out.push(folded);
                        continue;
                    }
                }
            }
        }
        out.push(instr);
    }

    out
}

/// Pass 13: delete `WRITE_RAW("")` (empty-string raw writes contribute
/// nothing to output and clutter the merge-raw-writes passes).
pub fn remove_empty_writes(program: Vec<InstructionIR>, interner: &Interner) -> Vec<InstructionIR> {
    program
        .into_iter()
        .filter(|instr| match &instr.kind {
            InstrKind::WriteRaw(sym) => instr.label.is_some() || !interner.resolve(*sym).is_empty(),
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_const_int_write() {
        let mut interner = Interner::new();
        let program = vec![
            InstructionIR::new(InstrKind::ConstInt(42)),
            InstructionIR::new(InstrKind::WriteValue),
        ];
        let out = fold_constant_writes(program, &mut interner);
        assert_eq!(out.len(), 1);
        match &out[0].kind {
            InstrKind::WriteRaw(sym) => assert_eq!(interner.resolve(*sym), "42"),
            _ => panic!("expected write_raw"),
        }
    }

    #[test]
    fn collapses_const_string_write() {
        let mut interner = Interner::new();
        let sym = interner.intern("hi");
        let program = vec![
            InstructionIR::new(InstrKind::ConstString(sym)),
            InstructionIR::new(InstrKind::WriteValue),
        ];
        let out = fold_constant_writes(program, &mut interner);
        match &out[0].kind {
            InstrKind::WriteRaw(sym) => assert_eq!(interner.resolve(*sym), "hi"),
            _ => panic!("expected write_raw"),
        }
    }

    #[test]
    fn removes_empty_raw_writes() {
        let mut interner = Interner::new();
        let empty = interner.intern("");
        let nonempty = interner.intern("x");
        let program = vec![
            InstructionIR::new(InstrKind::WriteRaw(empty)),
            InstructionIR::new(InstrKind::WriteRaw(nonempty)),
        ];
        let out = remove_empty_writes(program, &interner);
        assert_eq!(out.len(), 1);
    }
}
