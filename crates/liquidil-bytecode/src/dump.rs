//! Human-readable instruction listings, used by the `liquidil passes`/
//! `liquidil compile --dump-il` CLI surfaces and by optimizer-pass tests
//! that assert on textual IL rather than hand-building `InstrKind` values.

use std::fmt::Write as _;

use liquidil_core::Interner;

use crate::instr::{CompareOp, Instruction, InstructionIR, Opcode};
use crate::value::ConstLit;

fn opcode_mnemonic(op: Opcode) -> &'static str {
    match op {
        Opcode::ConstNil => "const_nil",
        Opcode::ConstBool => "const_bool",
        Opcode::ConstInt => "const_int",
        Opcode::ConstFloat => "const_float",
        Opcode::ConstString => "const_string",
        Opcode::ConstRange => "const_range",
        Opcode::ConstEmpty => "const_empty",
        Opcode::ConstBlank => "const_blank",
        Opcode::BuildRange => "build_range",
        Opcode::WriteRaw => "write_raw",
        Opcode::WriteValue => "write_value",
        Opcode::FindVar => "find_var",
        Opcode::FindVarPath => "find_var_path",
        Opcode::FindVarDynamic => "find_var_dynamic",
        Opcode::LookupConstKey => "lookup_const_key",
        Opcode::LookupConstPath => "lookup_const_path",
        Opcode::LookupKey => "lookup_key",
        Opcode::WriteVar => "write_var",
        Opcode::WriteVarPath => "write_var_path",
        Opcode::Assign => "assign",
        Opcode::CaptureBegin => "capture_begin",
        Opcode::CaptureEnd => "capture_end",
        Opcode::Increment => "increment",
        Opcode::Decrement => "decrement",
        Opcode::Pop => "pop",
        Opcode::Dup => "dup",
        Opcode::StoreTemp => "store_temp",
        Opcode::LoadTemp => "load_temp",
        Opcode::Compare => "compare",
        Opcode::CaseCompare => "case_compare",
        Opcode::LogicalNot => "logical_not",
        Opcode::Jump => "jump",
        Opcode::JumpIfFalse => "jump_if_false",
        Opcode::JumpIfTrue => "jump_if_true",
        Opcode::JumpIfInterrupt => "jump_if_interrupt",
        Opcode::CallFilter => "call_filter",
        Opcode::BuildHash => "build_hash",
        Opcode::ForBegin => "for_begin",
        Opcode::ForNext => "for_next",
        Opcode::ForEnd => "for_end",
        Opcode::TablerowBegin => "tablerow_begin",
        Opcode::TablerowNext => "tablerow_next",
        Opcode::TablerowEnd => "tablerow_end",
        Opcode::Break => "break",
        Opcode::Continue => "continue",
        Opcode::CycleStep => "cycle_step",
        Opcode::CycleStepVar => "cycle_step_var",
        Opcode::IfchangedBegin => "ifchanged_begin",
        Opcode::IfchangedEnd => "ifchanged_end",
        Opcode::Render => "render",
        Opcode::Include => "include",
        Opcode::Nop => "nop",
        Opcode::Halt => "halt",
    }
}

fn compare_op_str(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Le => "le",
        CompareOp::Gt => "gt",
        CompareOp::Ge => "ge",
        CompareOp::Contains => "contains",
    }
}

#[allow(dead_code)]
fn const_lit_str(lit: &ConstLit, interner: &Interner) -> String {
    match lit {
        ConstLit::Nil => "nil".to_string(),
        ConstLit::Bool(b) => b.to_string(),
        ConstLit::Int(i) => i.to_string(),
        ConstLit::Float(bits) => f64::from_bits(*bits).to_string(),
        ConstLit::String(s) => format!("{s:?}"),
    }
}

/// Renders a pre-link program (labels as `L<n>`) one instruction per line.
pub fn dump_ir(program: &[InstructionIR], interner: &Interner) -> String {
    let mut out = String::new();
    for instr in program {
        if let Some(label) = instr.label {
            let _ = writeln!(out, "{label}:");
        }
        let _ = write!(out, "    {}", opcode_mnemonic(instr.kind.opcode()));
        write_operands_ir(&mut out, instr, interner);
        let _ = writeln!(out);
    }
    out
}

/// Renders a linked program (targets as `#<n>`) one instruction per line,
/// each prefixed with its absolute step index.
pub fn dump_linked(program: &[Instruction], interner: &Interner) -> String {
    let mut out = String::new();
    for (i, instr) in program.iter().enumerate() {
        let _ = write!(out, "{i:>4}: {}", opcode_mnemonic(instr.kind.opcode()));
        write_operands_linked(&mut out, instr, interner);
        let _ = writeln!(out);
    }
    out
}

fn write_operands_ir(out: &mut String, instr: &InstructionIR, interner: &Interner) {
    use crate::instr::InstrKind::*;
    match &instr.kind {
        ConstBool(b) => {
            let _ = write!(out, " {b}");
        }
        ConstInt(i) => {
            let _ = write!(out, " {i}");
        }
        ConstFloat(bits) => {
            let _ = write!(out, " {}", f64::from_bits(*bits));
        }
        ConstString(sym) => {
            let _ = write!(out, " {:?}", interner.resolve(*sym));
        }
        ConstRange(a, b) => {
            let _ = write!(out, " {a}..{b}");
        }
        WriteRaw(sym) => {
            let _ = write!(out, " {:?}", interner.resolve(*sym));
        }
        FindVar(sym) => {
            let _ = write!(out, " {}", interner.resolve(*sym));
        }
        FindVarPath(base, path) => {
            let _ = write!(out, " {}", interner.resolve(*base));
            for seg in path {
                let _ = write!(out, ".{}", interner.resolve(*seg));
            }
        }
        LookupConstKey(sym) | Assign(sym) | CaptureBegin(sym) | Increment(sym)
        | Decrement(sym) | WriteVar(sym) => {
            let _ = write!(out, " {}", interner.resolve(*sym));
        }
        LookupConstPath(path) => {
            for (i, seg) in path.iter().enumerate() {
                let sep = if i == 0 { " " } else { "." };
                let _ = write!(out, "{sep}{}", interner.resolve(*seg));
            }
        }
        WriteVarPath(base, path) => {
            let _ = write!(out, " {}", interner.resolve(*base));
            for seg in path {
                let _ = write!(out, ".{}", interner.resolve(*seg));
            }
        }
        Compare(op) => {
            let _ = write!(out, " {}", compare_op_str(*op));
        }
        Jump(t) | JumpIfFalse(t) | JumpIfTrue(t) | JumpIfInterrupt(t) => {
            let _ = write!(out, " {t}");
        }
        CallFilter { name, arg_count } => {
            let _ = write!(out, " {}/{}", interner.resolve(*name), arg_count);
        }
        BuildHash(n) => {
            let _ = write!(out, " {n}");
        }
        ForBegin { var, exit, .. } => {
            let _ = write!(out, " {} -> {exit}", interner.resolve(*var));
        }
        ForNext { exit } => {
            let _ = write!(out, " -> {exit}");
        }
        TablerowBegin { var, exit, .. } => {
            let _ = write!(out, " {} -> {exit}", interner.resolve(*var));
        }
        TablerowNext { exit } => {
            let _ = write!(out, " -> {exit}");
        }
        IfchangedBegin { exit } => {
            let _ = write!(out, " -> {exit}");
        }
        Render { name, .. } | Include { name } => {
            if let crate::instr::PartialName::Const(sym) = name {
                let _ = write!(out, " {:?}", interner.resolve(*sym));
            } else {
                let _ = write!(out, " <dynamic>");
            }
        }
        _ => {}
    }
    let _ = instr; // span intentionally omitted from the default dump
}

fn write_operands_linked(out: &mut String, instr: &Instruction, interner: &Interner) {
    use crate::instr::InstrKind::*;
    match &instr.kind {
        Jump(t) | JumpIfFalse(t) | JumpIfTrue(t) | JumpIfInterrupt(t) => {
            let _ = write!(out, " {t}");
        }
        ForNext { exit } | TablerowNext { exit } => {
            let _ = write!(out, " -> {exit}");
        }
        FindVar(sym) => {
            let _ = write!(out, " {}", interner.resolve(*sym));
        }
        ConstString(sym) | WriteRaw(sym) => {
            let _ = write!(out, " {:?}", interner.resolve(*sym));
        }
        ConstInt(i) => {
            let _ = write!(out, " {i}");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{InstrKind, Label};

    #[test]
    fn dump_ir_resolves_symbols() {
        let mut interner = Interner::new();
        let sym = interner.intern("name");
        let program = vec![InstructionIR::new(InstrKind::FindVar(sym))];
        let text = dump_ir(&program, &interner);
        assert_eq!(text.trim(), "find_var name");
    }

    #[test]
    fn dump_ir_renders_labels() {
        let mut interner = Interner::new();
        let label = Label::from_raw(0);
        let program = vec![InstructionIR::new(InstrKind::Jump(label)).labeled(label)];
        let text = dump_ir(&program, &interner);
        assert!(text.contains("L0:"));
        assert!(text.contains("jump L0"));
    }
}
