//! IL opcode set and instruction encoding.
//!
//! Two encodings share the same opcode space: `InstructionIR` is what the
//! parser emits directly (no separate AST) with symbolic `Label` branch
//! targets; `Instruction` is what the linker produces by resolving
//! every `Label` to an absolute `StepId`. The optimizer runs entirely
//! on `InstructionIR`; the VM only ever sees `Instruction`.

use std::fmt;

use liquidil_core::Symbol;

use crate::value::{ConstLit, CycleValue};

/// Opcode tag, `repr(u8)` so a linked program can be stored as a flat byte
/// stream if a host wants to persist it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    // --- Constants ---
    ConstNil,
    ConstBool,
    ConstInt,
    ConstFloat,
    ConstString,
    ConstRange,
    ConstEmpty,
    ConstBlank,
    BuildRange,

    // --- Output ---
    WriteRaw,
    WriteValue,

    // --- Variable access ---
    FindVar,
    FindVarPath,
    FindVarDynamic,
    LookupConstKey,
    LookupConstPath,
    LookupKey,
    WriteVar,
    WriteVarPath,

    // --- Assignment ---
    Assign,
    CaptureBegin,
    CaptureEnd,
    Increment,
    Decrement,

    // --- Stack manipulation ---
    Pop,
    Dup,
    StoreTemp,
    LoadTemp,

    // --- Arithmetic / comparisons ---
    Compare,
    CaseCompare,
    LogicalNot,

    // --- Control flow ---
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    JumpIfInterrupt,

    // --- Filters ---
    CallFilter,
    BuildHash,

    // --- Loops ---
    ForBegin,
    ForNext,
    ForEnd,
    TablerowBegin,
    TablerowNext,
    TablerowEnd,
    Break,
    Continue,

    // --- Cycle / ifchanged ---
    CycleStep,
    CycleStepVar,
    IfchangedBegin,
    IfchangedEnd,

    // --- Includes/partials ---
    Render,
    Include,

    // --- Misc ---
    Nop,
    Halt,
}

/// A compile-time branch target, resolved away by the linker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Label(u32);

impl Label {
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// An absolute index into a linked `Program`'s instruction vector.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct StepId(u32);

impl StepId {
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Render/include call target: either a compile-time-known name (partial
/// resolution through the `FileSystemProvider` always happens at render
/// time, never at link time) or a dynamic name expression already
/// evaluated and sitting on the stack.
#[derive(Clone, PartialEq, Debug)]
pub enum PartialName {
    Const(Symbol),
    Dynamic,
}

/// `COMPARE`/`CASE_COMPARE` operator tag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

/// Payload shared by both `InstructionIR` and `Instruction`, generic over
/// the branch-target representation (`Label` before linking, `StepId`
/// after).
#[derive(Clone, PartialEq, Debug)]
pub enum InstrKind<Target> {
    ConstNil,
    ConstBool(bool),
    ConstInt(i64),
    ConstFloat(u64),
    ConstString(Symbol),
    ConstRange(i64, i64),
    ConstEmpty,
    ConstBlank,
    BuildRange,

    WriteRaw(Symbol),
    WriteValue,

    FindVar(Symbol),
    FindVarPath(Symbol, Vec<Symbol>),
    FindVarDynamic,
    LookupConstKey(Symbol),
    /// Fusion of a run of two or more consecutive `LookupConstKey`
    /// instructions into one, so a dotted-property chain after a
    /// computed index (`collection[0].name.first`) pays for one lookup
    /// dispatch instead of one per segment. Emitted only by the
    /// optimizer; the parser itself still emits plain `LookupConstKey`.
    LookupConstPath(Vec<Symbol>),
    LookupKey,
    /// Fusion of `FindVar(s); WriteValue` into a single step — the
    /// common case of a bare `{{ var }}` with no path or filters.
    /// Emitted only by the optimizer.
    WriteVar(Symbol),
    /// Fusion of `FindVarPath(base, path); WriteValue`. Emitted only by
    /// the optimizer.
    WriteVarPath(Symbol, Vec<Symbol>),

    Assign(Symbol),
    CaptureBegin(Symbol),
    CaptureEnd,
    Increment(Symbol),
    Decrement(Symbol),

    Pop,
    Dup,
    StoreTemp(u16),
    LoadTemp(u16),

    Compare(CompareOp),
    CaseCompare,
    LogicalNot,

    Jump(Target),
    JumpIfFalse(Target),
    JumpIfTrue(Target),
    JumpIfInterrupt(Target),

    CallFilter { name: Symbol, arg_count: u16 },
    /// Pops `2n` items (key, value alternating, top-of-stack-last key
    /// first) and pushes the built map. Used for a filter's trailing
    /// keyword arguments.
    BuildHash(u16),

    /// Stack, bottom to top: collection, offset (or `nil`/the string
    /// `"continue"` sentinel), limit (or `nil`) — so the VM pops limit
    /// first, then offset, then the collection. The parser always emits
    /// them in this canonical order regardless of `limit:`/`offset:`
    /// source order. Builds the iterator and jumps to `exit` only if the
    /// slice is empty (so an `else` clause can run); otherwise falls
    /// through into the body.
    ForBegin { var: Symbol, reversed: bool, exit: Target },
    /// Branches to `exit` when the iterator is exhausted; otherwise
    /// falls through with the next item pushed.
    ForNext { exit: Target },
    ForEnd,
    /// Stack, bottom to top: collection, offset, limit, cols (each `nil`
    /// if unspecified) — popped cols first, then limit, offset, and
    /// finally the collection. Same canonical-order and branch-on-empty
    /// contract as `ForBegin`.
    TablerowBegin { var: Symbol, exit: Target },
    TablerowNext { exit: Target },
    TablerowEnd,
    Break,
    Continue,

    CycleStep { group: Option<Symbol>, values: Vec<CycleValue> },
    CycleStepVar { group: Option<Symbol>, values: Vec<CycleValue> },
    IfchangedBegin { exit: Target },
    IfchangedEnd,

    /// `with_var`/`for_each` describe the bound-variable clause: `with
    /// expr` (`for_each=false`, binds one value) or `for expr`
    /// (`for_each=true`, iterates arrays and, for `render` only, ranges
    /// and enumerable drops — everything else still renders once). The
    /// symbol is the binding name after `as` resolution (defaulting to
    /// the partial's own name, or `it` for a dynamic name). `arg_count`
    /// keyword `(name, value)` pairs are pushed just before this
    /// instruction, mirroring `BUILD_HASH`'s convention; the VM merges
    /// them with the bound value at the call site rather than
    /// pre-building a map here, since keyword-vs-bound-variable
    /// precedence differs between `render` and `include`.
    Render { name: PartialName, with_var: Option<Symbol>, for_each: bool, arg_count: u16, isolated: bool },
    Include { name: PartialName },

    Nop,
    /// Explicit end-of-program marker; the optimizer doesn't emit it, the
    /// parser appends exactly one to every compiled template or partial.
    /// The VM treats reaching the end of the instruction stream without
    /// one the same way, so this is a clarity aid for `dump`, not a
    /// behavior the VM depends on.
    Halt,
}

impl<Target> InstrKind<Target> {
    pub fn opcode(&self) -> Opcode {
        match self {
            InstrKind::ConstNil => Opcode::ConstNil,
            InstrKind::ConstBool(_) => Opcode::ConstBool,
            InstrKind::ConstInt(_) => Opcode::ConstInt,
            InstrKind::ConstFloat(_) => Opcode::ConstFloat,
            InstrKind::ConstString(_) => Opcode::ConstString,
            InstrKind::ConstRange(_, _) => Opcode::ConstRange,
            InstrKind::ConstEmpty => Opcode::ConstEmpty,
            InstrKind::ConstBlank => Opcode::ConstBlank,
            InstrKind::BuildRange => Opcode::BuildRange,
            InstrKind::WriteRaw(_) => Opcode::WriteRaw,
            InstrKind::WriteValue => Opcode::WriteValue,
            InstrKind::FindVar(_) => Opcode::FindVar,
            InstrKind::FindVarPath(_, _) => Opcode::FindVarPath,
            InstrKind::FindVarDynamic => Opcode::FindVarDynamic,
            InstrKind::LookupConstKey(_) => Opcode::LookupConstKey,
            InstrKind::LookupConstPath(_) => Opcode::LookupConstPath,
            InstrKind::LookupKey => Opcode::LookupKey,
            InstrKind::WriteVar(_) => Opcode::WriteVar,
            InstrKind::WriteVarPath(_, _) => Opcode::WriteVarPath,
            InstrKind::Assign(_) => Opcode::Assign,
            InstrKind::CaptureBegin(_) => Opcode::CaptureBegin,
            InstrKind::CaptureEnd => Opcode::CaptureEnd,
            InstrKind::Increment(_) => Opcode::Increment,
            InstrKind::Decrement(_) => Opcode::Decrement,
            InstrKind::Pop => Opcode::Pop,
            InstrKind::Dup => Opcode::Dup,
            InstrKind::StoreTemp(_) => Opcode::StoreTemp,
            InstrKind::LoadTemp(_) => Opcode::LoadTemp,
            InstrKind::Compare(_) => Opcode::Compare,
            InstrKind::CaseCompare => Opcode::CaseCompare,
            InstrKind::LogicalNot => Opcode::LogicalNot,
            InstrKind::Jump(_) => Opcode::Jump,
            InstrKind::JumpIfFalse(_) => Opcode::JumpIfFalse,
            InstrKind::JumpIfTrue(_) => Opcode::JumpIfTrue,
            InstrKind::JumpIfInterrupt(_) => Opcode::JumpIfInterrupt,
            InstrKind::CallFilter { .. } => Opcode::CallFilter,
            InstrKind::BuildHash(_) => Opcode::BuildHash,
            InstrKind::ForBegin { .. } => Opcode::ForBegin,
            InstrKind::ForNext { .. } => Opcode::ForNext,
            InstrKind::ForEnd => Opcode::ForEnd,
            InstrKind::TablerowBegin { .. } => Opcode::TablerowBegin,
            InstrKind::TablerowNext { .. } => Opcode::TablerowNext,
            InstrKind::TablerowEnd => Opcode::TablerowEnd,
            InstrKind::Break => Opcode::Break,
            InstrKind::Continue => Opcode::Continue,
            InstrKind::CycleStep { .. } => Opcode::CycleStep,
            InstrKind::CycleStepVar { .. } => Opcode::CycleStepVar,
            InstrKind::IfchangedBegin { .. } => Opcode::IfchangedBegin,
            InstrKind::IfchangedEnd => Opcode::IfchangedEnd,
            InstrKind::Render { .. } => Opcode::Render,
            InstrKind::Include { .. } => Opcode::Include,
            InstrKind::Nop => Opcode::Nop,
            InstrKind::Halt => Opcode::Halt,
        }
    }

    /// The branch targets this instruction carries, in operand order.
    /// `ForNext`/`TablerowNext` carry two (fallthrough isn't implicit: the
    /// optimizer's branch-fusion passes need both explicit).
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            InstrKind::Jump(t)
            | InstrKind::JumpIfFalse(t)
            | InstrKind::JumpIfTrue(t)
            | InstrKind::JumpIfInterrupt(t)
            | InstrKind::ForBegin { exit: t, .. }
            | InstrKind::TablerowBegin { exit: t, .. }
            | InstrKind::IfchangedBegin { exit: t }
            | InstrKind::ForNext { exit: t }
            | InstrKind::TablerowNext { exit: t } => vec![t],
            _ => vec![],
        }
    }

    pub fn targets_mut(&mut self) -> Vec<&mut Target> {
        match self {
            InstrKind::Jump(t)
            | InstrKind::JumpIfFalse(t)
            | InstrKind::JumpIfTrue(t)
            | InstrKind::JumpIfInterrupt(t)
            | InstrKind::ForBegin { exit: t, .. }
            | InstrKind::TablerowBegin { exit: t, .. }
            | InstrKind::IfchangedBegin { exit: t }
            | InstrKind::ForNext { exit: t }
            | InstrKind::TablerowNext { exit: t } => vec![t],
            _ => vec![],
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, InstrKind::Jump(_))
    }

    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            InstrKind::JumpIfFalse(_)
                | InstrKind::JumpIfTrue(_)
                | InstrKind::JumpIfInterrupt(_)
                | InstrKind::ForNext { .. }
                | InstrKind::TablerowNext { .. }
        )
    }
}

/// Pre-link instruction: what the parser emits directly, and what every
/// optimizer pass reads and rewrites.
#[derive(Clone, Debug)]
pub struct InstructionIR {
    pub label: Option<Label>,
    pub kind: InstrKind<Label>,
    pub span: Option<crate::span::Span>,
}

impl InstructionIR {
    pub fn new(kind: InstrKind<Label>) -> Self {
        Self { label: None, kind, span: None }
    }

    pub fn labeled(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn spanned(mut self, span: crate::span::Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl From<InstrKind<Label>> for InstructionIR {
    fn from(kind: InstrKind<Label>) -> Self {
        InstructionIR::new(kind)
    }
}

/// Post-link instruction: every `Label` has been resolved to a `StepId`.
/// This is the only encoding the VM executes.
#[derive(Clone, PartialEq, Debug)]
pub struct Instruction {
    pub kind: InstrKind<StepId>,
    pub span: Option<crate::span::Span>,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        self.kind.opcode()
    }
}

/// Constant-pool literal, referenced from `ConstFloat`'s bit pattern and
/// from filter keyword-argument defaults during parsing. Kept distinct
/// from `InstrKind::ConstXxx` because filters need an inline literal
/// operand representation too.
pub type Literal = ConstLit;
