//! Pass 1: fold constant unary/comparison ops — evaluate
//! `IS_TRUTHY`-equivalent checks, `LogicalNot`, and `Compare` when both
//! operands are compile-time constants.
//!
//! This workspace has no standalone `IS_TRUTHY` opcode (truthiness is
//! folded into `JumpIfFalse`/`JumpIfTrue` at the VM level), so this pass
//! covers `LogicalNot` over a constant and `Compare` over two constant
//! pushes, the two cases the parser can actually produce a constant
//! operand pair for.

use liquidil_bytecode::{CompareOp, ConstLit, InstrKind, InstructionIR};

fn const_lit(kind: &InstrKind<liquidil_bytecode::Label>) -> Option<ConstLit> {
    match kind {
        InstrKind::ConstNil => Some(ConstLit::Nil),
        InstrKind::ConstBool(b) => Some(ConstLit::Bool(*b)),
        InstrKind::ConstInt(i) => Some(ConstLit::Int(*i)),
        InstrKind::ConstFloat(bits) => Some(ConstLit::Float(*bits)),
        InstrKind::ConstString(_) => None, // needs the interner to compare; left to a later pass
        _ => None,
    }
}

fn truthy(lit: &ConstLit) -> bool {
    !matches!(lit, ConstLit::Nil | ConstLit::Bool(false))
}

fn compare_numeric(op: CompareOp, a: f64, b: f64) -> Option<bool> {
    Some(match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        CompareOp::Contains => return None,
    })
}

pub fn run(program: Vec<InstructionIR>) -> Vec<InstructionIR> {
    let mut out: Vec<InstructionIR> = Vec::with_capacity(program.len());

    for instr in program {
        // LogicalNot over a preceding constant bool/int push: fold to the
        // negated constant, replacing both instructions.
        if let InstrKind::LogicalNot = &instr.kind {
            if let Some(prev) = out.last() {
                if prev.label.is_none() {
                    if let Some(lit) = const_lit(&prev.kind) {
                        let span = instr.span.or(prev.span);
                        out.pop();
                        let mut folded = InstructionIR::new(InstrKind::ConstBool(!truthy(&lit)));
                        folded.span = span;
                        out.push(folded);
                        continue;
                    }
                }
            }
        }

        // Compare over two preceding constant pushes (neither carrying an
        // incoming label, so reordering the pair is observationally safe).
        if let InstrKind::Compare(op) = &instr.kind {
            if out.len() >= 2 {
                let rhs = out[out.len() - 1].clone();
                let lhs = out[out.len() - 2].clone();
                if rhs.label.is_none() && lhs.label.is_none() {
                    if let (Some(lhs_lit), Some(rhs_lit)) = (const_lit(&lhs.kind), const_lit(&rhs.kind)) {
                        if let (Some(a), Some(b)) = (lhs_lit.as_f64(), rhs_lit.as_f64()) {
                            if let Some(result) = compare_numeric(*op, a, b) {
                                let span = instr.span.or(rhs.span).or(lhs.span);
                                out.pop();
                                out.pop();
                                let mut folded = InstructionIR::new(InstrKind::ConstBool(result));
                                folded.span = span;
                                out.push(folded);
                                continue;
                            }
                        }
                    }
                }
            }
        }

        out.push(instr);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidil_bytecode::Label;

    #[test]
    fn folds_not_of_constant() {
        let program = vec![
            InstructionIR::new(InstrKind::ConstBool(false)),
            InstructionIR::new(InstrKind::LogicalNot),
        ];
        let out = run(program);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].kind, InstrKind::ConstBool(true)));
    }

    #[test]
    fn folds_constant_comparison() {
        let program = vec![
            InstructionIR::new(InstrKind::ConstInt(1)),
            InstructionIR::new(InstrKind::ConstInt(2)),
            InstructionIR::new(InstrKind::Compare(CompareOp::Lt)),
        ];
        let out = run(program);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].kind, InstrKind::ConstBool(true)));
    }

    #[test]
    fn does_not_fold_across_a_label() {
        let label = Label::from_raw(0);
        let program = vec![
            InstructionIR::new(InstrKind::ConstInt(1)),
            InstructionIR::new(InstrKind::ConstInt(2)).labeled(label),
            InstructionIR::new(InstrKind::Compare(CompareOp::Lt)),
        ];
        let out = run(program);
        assert_eq!(out.len(), 3);
    }
}
