//! Linker: resolves every `Label` operand to an absolute `StepId`,
//! erasing label-marker instructions in the process.
//!
//! Runs after the optimizer: every optimizer pass's contract operates on
//! `LABEL`/`JUMP(label)` terms throughout — including pass 21, "strip
//! LABEL, reindex jumps to the following instruction" — which only makes
//! sense pre-link, so linking has to come last.

use std::collections::HashMap;

use liquidil_bytecode::{InstrKind, Instruction, InstructionIR, Label, StepId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("unresolved label L{0}")]
    UnresolvedLabel(u32),
}

/// A bare `LABEL` marker carries no opcode of its own and is dropped once
/// its position has been recorded.
fn is_bare_label_marker(instr: &InstructionIR) -> bool {
    instr.label.is_some() && matches!(instr.kind, InstrKind::Nop) && instr.span.is_none()
}

pub fn link(program: Vec<InstructionIR>) -> Result<Vec<Instruction>, LinkError> {
    let mut positions: HashMap<Label, u32> = HashMap::new();
    let mut kept: Vec<InstructionIR> = Vec::with_capacity(program.len());

    for instr in program {
        if let Some(label) = instr.label {
            positions.insert(label, kept.len() as u32);
        }
        if is_bare_label_marker(&instr) {
            continue;
        }
        kept.push(instr);
    }

    let resolve = |label: &Label| -> Result<StepId, LinkError> {
        positions
            .get(label)
            .map(|&idx| StepId::from_raw(idx))
            .ok_or(LinkError::UnresolvedLabel(label.as_u32()))
    };

    kept.into_iter().map(|instr| resolve_instruction(instr, &resolve)).collect()
}

fn resolve_instruction(
    instr: InstructionIR,
    resolve: &impl Fn(&Label) -> Result<StepId, LinkError>,
) -> Result<Instruction, LinkError> {
    let kind = resolve_kind(instr.kind, resolve)?;
    Ok(Instruction { kind, span: instr.span })
}

fn resolve_kind(
    kind: InstrKind<Label>,
    resolve: &impl Fn(&Label) -> Result<StepId, LinkError>,
) -> Result<InstrKind<StepId>, LinkError> {
    use InstrKind::*;
    Ok(match kind {
        ConstNil => ConstNil,
        ConstBool(b) => ConstBool(b),
        ConstInt(i) => ConstInt(i),
        ConstFloat(f) => ConstFloat(f),
        ConstString(s) => ConstString(s),
        ConstRange(a, b) => ConstRange(a, b),
        ConstEmpty => ConstEmpty,
        ConstBlank => ConstBlank,
        BuildRange => BuildRange,
        WriteRaw(s) => WriteRaw(s),
        WriteValue => WriteValue,
        FindVar(s) => FindVar(s),
        FindVarPath(base, path) => FindVarPath(base, path),
        FindVarDynamic => FindVarDynamic,
        LookupConstKey(s) => LookupConstKey(s),
        LookupConstPath(path) => LookupConstPath(path),
        LookupKey => LookupKey,
        WriteVar(s) => WriteVar(s),
        WriteVarPath(base, path) => WriteVarPath(base, path),
        Assign(s) => Assign(s),
        CaptureBegin(s) => CaptureBegin(s),
        CaptureEnd => CaptureEnd,
        Increment(s) => Increment(s),
        Decrement(s) => Decrement(s),
        Pop => Pop,
        Dup => Dup,
        StoreTemp(i) => StoreTemp(i),
        LoadTemp(i) => LoadTemp(i),
        Compare(op) => Compare(op),
        CaseCompare => CaseCompare,
        LogicalNot => LogicalNot,
        Jump(l) => Jump(resolve(&l)?),
        JumpIfFalse(l) => JumpIfFalse(resolve(&l)?),
        JumpIfTrue(l) => JumpIfTrue(resolve(&l)?),
        JumpIfInterrupt(l) => JumpIfInterrupt(resolve(&l)?),
        CallFilter { name, arg_count } => CallFilter { name, arg_count },
        BuildHash(n) => BuildHash(n),
        ForBegin { var, reversed, exit } => ForBegin { var, reversed, exit: resolve(&exit)? },
        ForNext { exit } => ForNext { exit: resolve(&exit)? },
        ForEnd => ForEnd,
        TablerowBegin { var, exit } => TablerowBegin { var, exit: resolve(&exit)? },
        TablerowNext { exit } => TablerowNext { exit: resolve(&exit)? },
        TablerowEnd => TablerowEnd,
        Break => Break,
        Continue => Continue,
        CycleStep { group, values } => CycleStep { group, values },
        CycleStepVar { group, values } => CycleStepVar { group, values },
        IfchangedBegin { exit } => IfchangedBegin { exit: resolve(&exit)? },
        IfchangedEnd => IfchangedEnd,
        Render { name, with_var, for_each, arg_count, isolated } => {
            Render { name, with_var, for_each, arg_count, isolated }
        }
        Include { name } => Include { name },
        Nop => Nop,
        Halt => Halt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidil_bytecode::Opcode;

    #[test]
    fn resolves_forward_jump_and_erases_label() {
        let l0 = Label::from_raw(0);
        let program = vec![
            InstructionIR::new(InstrKind::Jump(l0)),
            InstructionIR::new(InstrKind::Pop),
            InstructionIR::new(InstrKind::Nop).labeled(l0),
            InstructionIR::new(InstrKind::Dup),
        ];
        let linked = link(program).unwrap();
        assert_eq!(linked.len(), 3);
        match &linked[0].kind {
            InstrKind::Jump(step) => assert_eq!(step.as_u32(), 2),
            _ => panic!("expected jump"),
        }
        assert_eq!(linked[2].opcode(), Opcode::Dup);
    }

    #[test]
    fn unresolved_label_is_an_error() {
        let program = vec![InstructionIR::new(InstrKind::Jump(Label::from_raw(9)))];
        assert_eq!(link(program), Err(LinkError::UnresolvedLabel(9)));
    }
}
