//! The stack-machine interpreter: fetch, dispatch, advance.

use std::collections::HashMap;
use std::rc::Rc;

use liquidil_bytecode::{CompareOp, InstrKind, Instruction, LineIndex, PartialName, Program, Value};

use crate::error::{ErrorContext, RuntimeError, RuntimeResult};
use crate::filesystem::FileSystemProvider;
use crate::filters::FilterTable;

use super::scope::{ForIterState, ForLoopDrop, Interrupt, Scope, TablerowIterState, TablerowLoopDrop};

/// Step/depth limits on a single render.
#[derive(Clone, Copy, Debug)]
pub struct VmLimits {
    max_steps: u32,
    max_render_depth: u32,
}

impl Default for VmLimits {
    fn default() -> Self {
        Self { max_steps: 1_000_000, max_render_depth: 100 }
    }
}

impl VmLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_steps(mut self, n: u32) -> Self {
        self.max_steps = n;
        self
    }

    pub fn max_render_depth(mut self, n: u32) -> Self {
        self.max_render_depth = n;
        self
    }
}

/// Where control goes after an instruction dispatches.
enum Flow {
    Next,
    Jump(usize),
    Halt,
}

/// Owns the filter table, file-system provider, and fuel/depth budget for
/// one or more renders. Cheap to construct per render; the step counter
/// resets with each top-level `render` call, the depth counter with it.
pub struct Vm<'e> {
    filters: &'e dyn FilterTable,
    fs: &'e dyn FileSystemProvider,
    limits: VmLimits,
    render_errors: bool,
    steps_left: u32,
    depth: u32,
}

impl<'e> Vm<'e> {
    pub fn new(filters: &'e dyn FilterTable, fs: &'e dyn FileSystemProvider) -> Self {
        Self {
            filters,
            fs,
            limits: VmLimits::default(),
            render_errors: true,
            steps_left: VmLimits::default().max_steps,
            depth: 0,
        }
    }

    pub fn with_limits(mut self, limits: VmLimits) -> Self {
        self.steps_left = limits.max_steps;
        self.limits = limits;
        self
    }

    /// `render_errors = false` is strict mode: recoverable errors raise
    /// instead of being downgraded to an inline error-marker string.
    pub fn render_errors(mut self, enabled: bool) -> Self {
        self.render_errors = enabled;
        self
    }

    /// Top-level entry point. `file` names the template for diagnostics;
    /// `source` is the text `program` was compiled from, needed because
    /// `Program` itself doesn't retain it.
    pub fn render(
        &mut self,
        program: &Program,
        source: &str,
        file: Rc<str>,
        assigns: HashMap<String, Value>,
    ) -> RuntimeResult<String> {
        self.steps_left = self.limits.max_steps;
        self.depth = 0;
        let line_index = LineIndex::new(source);
        let mut scope = Scope::isolated(program.register_count(), assigns);
        self.run(program, &file, &line_index, &mut scope)?;
        Ok(scope.take_output())
    }

    fn context(&self, program: &Program, file: &Rc<str>, line_index: &LineIndex, ip: usize, scope: &Scope) -> ErrorContext {
        let line = program.span_at(ip).map(|s| line_index.line_col(s.start).0).unwrap_or(0);
        ErrorContext { file: file.clone(), line, partial_output: scope.output().to_string() }
    }

    /// Runs `program` to completion against `scope`, driving the
    /// fetch-dispatch loop until the instruction stream ends.
    fn run(&mut self, program: &Program, file: &Rc<str>, line_index: &LineIndex, scope: &mut Scope) -> RuntimeResult<()> {
        let code = program.instructions();
        let mut ip = 0usize;
        let mut stack: Vec<Value> = Vec::new();

        while ip < code.len() {
            if self.steps_left == 0 {
                return Err(RuntimeError::StepFuelExhausted(self.limits.max_steps));
            }
            self.steps_left -= 1;

            match self.dispatch(program, file, line_index, &code[ip], ip, scope, &mut stack)? {
                Flow::Next => ip += 1,
                Flow::Jump(target) => ip = target,
                Flow::Halt => break,
            }
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        program: &Program,
        file: &Rc<str>,
        line_index: &LineIndex,
        instr: &Instruction,
        ip: usize,
        scope: &mut Scope,
        stack: &mut Vec<Value>,
    ) -> RuntimeResult<Flow> {
        let interner = program.interner();

        macro_rules! pop {
            () => {
                stack.pop().unwrap_or(Value::Nil)
            };
        }
        macro_rules! ctx {
            () => {
                self.context(program, file, line_index, ip, scope)
            };
        }

        match &instr.kind {
            InstrKind::ConstNil => stack.push(Value::Nil),
            InstrKind::ConstBool(b) => stack.push(Value::Bool(*b)),
            InstrKind::ConstInt(i) => stack.push(Value::Int(*i)),
            InstrKind::ConstFloat(bits) => stack.push(Value::Float(f64::from_bits(*bits))),
            InstrKind::ConstString(sym) => stack.push(Value::string(interner.resolve(*sym))),
            InstrKind::ConstRange(a, b) => stack.push(Value::Range(*a, *b)),
            InstrKind::ConstEmpty => stack.push(Value::EmptyLiteral),
            InstrKind::ConstBlank => stack.push(Value::BlankLiteral),
            InstrKind::BuildRange => {
                let end = pop!();
                let start = pop!();
                match (&start, &end) {
                    (Value::Int(a), Value::Int(b)) => stack.push(Value::Range(*a, *b)),
                    _ if self.render_errors => stack.push(Value::error("invalid integer", None)),
                    _ => return Err(RuntimeError::InvalidInteger(ctx!())),
                }
            }

            InstrKind::WriteRaw(sym) => scope.write(interner.resolve(*sym)),
            InstrKind::WriteValue => {
                let v = pop!();
                scope.write(&v.to_output_string());
            }

            InstrKind::FindVar(sym) => stack.push(scope.lookup(interner.resolve(*sym))),
            InstrKind::FindVarPath(base, path) => {
                let mut v = scope.lookup(interner.resolve(*base));
                for key in path {
                    v = v.lookup_const_key(interner.resolve(*key));
                }
                stack.push(v);
            }
            InstrKind::FindVarDynamic => {
                let key = pop!();
                stack.push(scope.lookup(&key.to_output_string()));
            }
            InstrKind::LookupConstKey(sym) => {
                let obj = pop!();
                stack.push(obj.lookup_const_key(interner.resolve(*sym)));
            }
            InstrKind::LookupConstPath(path) => {
                let mut v = pop!();
                for key in path {
                    v = v.lookup_const_key(interner.resolve(*key));
                }
                stack.push(v);
            }
            InstrKind::LookupKey => {
                let key = pop!();
                let obj = pop!();
                stack.push(obj.lookup_key(&key));
            }
            InstrKind::WriteVar(sym) => {
                let v = scope.lookup(interner.resolve(*sym));
                scope.write(&v.to_output_string());
            }
            InstrKind::WriteVarPath(base, path) => {
                let mut v = scope.lookup(interner.resolve(*base));
                for key in path {
                    v = v.lookup_const_key(interner.resolve(*key));
                }
                scope.write(&v.to_output_string());
            }

            InstrKind::Assign(sym) => {
                let v = pop!();
                scope.assign(interner.resolve(*sym), v);
            }
            InstrKind::CaptureBegin(_) => scope.push_capture(),
            InstrKind::CaptureEnd => stack.push(Value::string(scope.pop_capture())),
            InstrKind::Increment(sym) => stack.push(Value::Int(scope.increment(interner.resolve(*sym)))),
            InstrKind::Decrement(sym) => stack.push(Value::Int(scope.decrement(interner.resolve(*sym)))),

            InstrKind::Pop => {
                pop!();
            }
            InstrKind::Dup => {
                let v = stack.last().cloned().unwrap_or(Value::Nil);
                stack.push(v);
            }
            InstrKind::StoreTemp(slot) => {
                let v = stack.last().cloned().unwrap_or(Value::Nil);
                scope.store_temp(*slot, v);
            }
            InstrKind::LoadTemp(slot) => stack.push(scope.load_temp(*slot)),

            InstrKind::Compare(op) => {
                let rhs = pop!();
                let lhs = pop!();
                stack.push(Value::Bool(compare(*op, &lhs, &rhs)));
            }
            InstrKind::CaseCompare => {
                let pattern = pop!();
                let subject = pop!();
                stack.push(Value::Bool(subject.case_compare(&pattern)));
            }
            InstrKind::LogicalNot => {
                let v = pop!();
                stack.push(Value::Bool(!v.is_truthy()));
            }

            InstrKind::Jump(target) => return Ok(Flow::Jump(target.as_usize())),
            InstrKind::JumpIfFalse(target) => {
                let v = pop!();
                if !v.is_truthy() {
                    return Ok(Flow::Jump(target.as_usize()));
                }
            }
            InstrKind::JumpIfTrue(target) => {
                let v = pop!();
                if v.is_truthy() {
                    return Ok(Flow::Jump(target.as_usize()));
                }
            }
            InstrKind::JumpIfInterrupt(target) => {
                if let Some(Interrupt::Break) = scope.take_interrupt() {
                    return Ok(Flow::Jump(target.as_usize()));
                }
            }

            InstrKind::CallFilter { name, arg_count } => {
                let mut args = Vec::with_capacity(*arg_count as usize);
                for _ in 0..*arg_count {
                    args.push(pop!());
                }
                args.reverse();
                let input = pop!();
                let name_str = interner.resolve(*name);
                match self.filters.apply(name_str, input, &args, None, scope) {
                    Ok(v) => stack.push(v),
                    Err(e) => {
                        if self.render_errors {
                            stack.push(Value::Nil);
                        } else {
                            return Err(RuntimeError::FilterFailed {
                                ctx: ctx!(),
                                name: name_str.to_string(),
                                message: e.message,
                            });
                        }
                    }
                }
            }
            InstrKind::BuildHash(n) => {
                let mut pairs = Vec::with_capacity(*n as usize);
                for _ in 0..*n {
                    let value = pop!();
                    let key = pop!();
                    pairs.push((key.to_output_string(), value));
                }
                pairs.reverse();
                let mut map = indexmap::IndexMap::new();
                for (k, v) in pairs {
                    map.insert(k, v);
                }
                stack.push(Value::map(map));
            }

            InstrKind::ForBegin { var, reversed, exit } => {
                let limit = pop!();
                let offset = pop!();
                let collection = pop!();
                let var_name = interner.resolve(*var).to_string();
                let start_offset = resolve_offset(&offset, scope.for_offset(&var_name));
                let items = match slice_collection(&collection, start_offset, &limit) {
                    Some(items) => items,
                    None if self.render_errors => Vec::new(),
                    None => return Err(RuntimeError::InvalidInteger(ctx!())),
                };
                let mut items = items;
                if *reversed {
                    items.reverse();
                }
                if items.is_empty() {
                    return Ok(Flow::Jump(exit.as_usize()));
                }
                let parent = scope.current_forloop();
                scope.push_frame();
                scope.push_for_iter(ForIterState { items, idx: 0, start_offset, parent, var: var_name });
            }
            InstrKind::ForNext { exit } => {
                let Some(state) = scope.current_for_iter_mut() else {
                    return Ok(Flow::Jump(exit.as_usize()));
                };
                let len = state.len() as i64;
                match state.next() {
                    Some(item) => {
                        let idx0 = state.idx as i64 - 1;
                        let parent = state.parent.clone();
                        let var = state.var.clone();
                        if idx0 > 0 {
                            scope.pop_forloop();
                        }
                        let drop = scope.push_forloop(ForLoopDrop { index0: idx0, length: len, parentloop: parent });
                        scope.set_local(&var, item);
                        scope.set_local("forloop", drop);
                    }
                    None => return Ok(Flow::Jump(exit.as_usize())),
                }
            }
            InstrKind::ForEnd => {
                if let Some(state) = scope.pop_for_iter() {
                    scope.set_for_offset(&state.var, state.next_offset());
                }
                scope.pop_forloop();
                scope.pop_frame();
            }

            InstrKind::TablerowBegin { var, exit } => {
                let cols = pop!();
                let limit = pop!();
                let offset = pop!();
                let collection = pop!();
                let items = match slice_collection(&collection, resolve_offset(&offset, 0), &limit) {
                    Some(items) => items,
                    None if self.render_errors => Vec::new(),
                    None => return Err(RuntimeError::InvalidInteger(ctx!())),
                };
                let cols = match cols {
                    Value::Nil => 0,
                    other => other.as_f64().map(|f| f as i64).unwrap_or(0),
                };
                if items.is_empty() {
                    return Ok(Flow::Jump(exit.as_usize()));
                }
                let parent = scope.current_tablerowloop();
                let var_name = interner.resolve(*var).to_string();
                scope.push_frame();
                scope.push_tablerow_iter(TablerowIterState { items, idx: 0, cols, parent, var: var_name });
            }
            InstrKind::TablerowNext { exit } => {
                let Some(state) = scope.current_tablerow_iter_mut() else {
                    return Ok(Flow::Jump(exit.as_usize()));
                };
                let cols = state.cols;
                let len = state.len() as i64;
                match state.next() {
                    Some(item) => {
                        let idx0 = state.idx as i64 - 1;
                        let parent = state.parent.clone();
                        let var = state.var.clone();
                        if idx0 > 0 {
                            scope.write("</td>");
                            if cols > 0 && idx0 % cols == 0 {
                                scope.write("</tr>\n");
                            }
                        }
                        if idx0 == 0 || (cols > 0 && idx0 % cols == 0) {
                            let row = if cols > 0 { idx0 / cols } else { 0 } + 1;
                            scope.write(&format!("<tr class=\"row{row}\">"));
                            if row == 1 {
                                scope.write("\n");
                            }
                        }
                        let col0 = if cols > 0 { idx0 % cols } else { idx0 };
                        scope.write(&format!("<td class=\"col{}\">", col0 + 1));
                        if idx0 > 0 {
                            scope.pop_tablerowloop();
                        }
                        let drop = scope.push_tablerowloop(TablerowLoopDrop { index0: idx0, length: len, cols, parentloop: parent });
                        scope.set_local(&var, item);
                        scope.set_local("tablerowloop", drop);
                    }
                    None => return Ok(Flow::Jump(exit.as_usize())),
                }
            }
            InstrKind::TablerowEnd => {
                if scope.pop_tablerow_iter().is_some() {
                    scope.write("</td></tr>\n");
                } else {
                    scope.write("<tr class=\"row1\">\n</tr>\n");
                }
                scope.pop_tablerowloop();
                scope.pop_frame();
            }
            InstrKind::Break => scope.raise(Interrupt::Break),
            InstrKind::Continue => scope.raise(Interrupt::Continue),

            InstrKind::CycleStep { group, values } | InstrKind::CycleStepVar { group, values } => {
                let identity = cycle_identity(interner, *group, values);
                let idx = scope.cycle_step(&identity, values.len());
                let value = values.get(idx).map(|v| resolve_cycle_value(v, interner, scope)).unwrap_or(Value::Nil);
                stack.push(value);
            }
            InstrKind::IfchangedBegin { exit } => {
                let v = pop!();
                let s = v.to_output_string();
                if scope.ifchanged_check(ip, &s) {
                    stack.push(v);
                } else {
                    return Ok(Flow::Jump(exit.as_usize()));
                }
            }
            InstrKind::IfchangedEnd => {}

            InstrKind::Render { name, with_var, for_each, arg_count, isolated } => {
                let mut kwargs = Vec::with_capacity(*arg_count as usize);
                for _ in 0..*arg_count {
                    let value = pop!();
                    let key = pop!();
                    kwargs.push((key.to_output_string(), value));
                }
                kwargs.reverse();
                let with_value = if with_var.is_some() { Some(pop!()) } else { None };
                let resolved_name = match resolve_partial_name(name, interner, stack) {
                    Some(n) => n,
                    None if self.render_errors => {
                        scope.write(&RuntimeError::PartialNameType(ctx!()).render());
                        return Ok(Flow::Next);
                    }
                    None => return Err(RuntimeError::PartialNameType(ctx!())),
                };
                return self.call_partial(
                    program,
                    file,
                    line_index,
                    &resolved_name,
                    *with_var,
                    with_value,
                    *for_each,
                    kwargs,
                    *isolated,
                    scope,
                    ip,
                );
            }
            InstrKind::Include { name } => {
                let resolved_name = match resolve_partial_name(name, interner, stack) {
                    Some(n) => n,
                    None if self.render_errors => {
                        scope.write(&RuntimeError::PartialNameType(ctx!()).render());
                        return Ok(Flow::Next);
                    }
                    None => return Err(RuntimeError::PartialNameType(ctx!())),
                };
                return self.call_partial(program, file, line_index, &resolved_name, None, None, false, Vec::new(), false, scope, ip);
            }

            InstrKind::Nop => {}
            InstrKind::Halt => return Ok(Flow::Halt),
        }
        Ok(Flow::Next)
    }

    /// `with_var` names the bound-variable alias (after `as` resolution);
    /// `for_each` says whether `with_value` is the single bound value or
    /// the target of a `for` clause to be expanded per `expand_for_target`.
    /// `kwargs` are the call's keyword arguments. Precedence between the
    /// bound value and a same-named keyword argument is asymmetric: when
    /// `with`/`for`'s value is `nil`, an isolated `render` call lets a
    /// same-named keyword argument win; a shared-scope `include` always
    /// lets the bound value override.
    #[allow(clippy::too_many_arguments)]
    fn call_partial(
        &mut self,
        caller_program: &Program,
        file: &Rc<str>,
        line_index: &LineIndex,
        name: &str,
        with_var: Option<liquidil_bytecode::Symbol>,
        with_value: Option<Value>,
        for_each: bool,
        kwargs: Vec<(String, Value)>,
        isolated: bool,
        scope: &mut Scope,
        ip: usize,
    ) -> RuntimeResult<Flow> {
        if self.depth >= self.limits.max_render_depth {
            return Err(RuntimeError::RenderDepthExceeded(self.limits.max_render_depth));
        }
        let source = self.fs.read(name).ok_or_else(|| RuntimeError::UnresolvedPartial {
            ctx: self.context(caller_program, file, line_index, ip, scope),
            name: name.to_string(),
        })?;
        let child = liquidil_compiler::compile(&source).map_err(|_| RuntimeError::UnresolvedPartial {
            ctx: self.context(caller_program, file, line_index, ip, scope),
            name: name.to_string(),
        })?;
        let child_line_index = LineIndex::new(&source);
        let partial_file: Rc<str> = name.into();
        let alias = with_var.map(|sym| caller_program.interner().resolve(sym).to_string());

        let bound_items: Vec<Option<Value>> = match (&alias, with_value) {
            (Some(_), Some(value)) if for_each => expand_for_target(&value, isolated).into_iter().map(Some).collect(),
            (Some(_), Some(value)) => vec![Some(value)],
            _ => vec![None],
        };
        let keyword_wins_on_nil = isolated && !for_each;

        self.depth += 1;
        let outcome = (|| -> RuntimeResult<Option<String>> {
            if isolated {
                let mut rendered = String::new();
                for bound in &bound_items {
                    let mut args: HashMap<String, Value> = kwargs.iter().cloned().collect();
                    if let (Some(name), Some(value)) = (&alias, bound) {
                        merge_bound_arg(&mut args, name, value.clone(), keyword_wins_on_nil);
                    }
                    let mut child_scope = Scope::isolated(child.register_count(), args);
                    self.run(&child, &partial_file, &child_line_index, &mut child_scope)?;
                    rendered.push_str(&child_scope.take_output());
                }
                Ok(Some(rendered))
            } else {
                for (key, value) in &kwargs {
                    scope.set_local(key, value.clone());
                }
                scope.ensure_registers(child.register_count());
                for bound in &bound_items {
                    if let (Some(name), Some(value)) = (&alias, bound) {
                        scope.set_local(name, value.clone());
                    }
                    self.run(&child, &partial_file, &child_line_index, scope)?;
                }
                Ok(None)
            }
        })();
        self.depth -= 1;

        let rendered = outcome?;
        if let Some(text) = rendered {
            scope.write(&text);
        }
        Ok(Flow::Next)
    }
}

/// Expands a `render`/`include for` target into the per-call values to
/// bind. Arrays always iterate; ranges and enumerable drops only iterate
/// for an isolated (`render`) call — under `include` (and for hashes,
/// strings, and scalars in both cases), the target renders once as a
/// single value.
fn expand_for_target(value: &Value, isolated: bool) -> Vec<Value> {
    match value {
        Value::List(items) => items.as_ref().clone(),
        Value::Range(a, b) if isolated => {
            if a <= b {
                (*a..=*b).map(Value::Int).collect()
            } else {
                Vec::new()
            }
        }
        Value::Drop(d) if isolated => match d.to_liquid_value() {
            Some(Value::List(items)) => items.as_ref().clone(),
            _ => vec![value.clone()],
        },
        _ => vec![value.clone()],
    }
}

/// Inserts `name: value` into `args`, honoring `render`'s nil-deference
/// rule: when `keyword_wins_on_nil` holds and `value` is `nil`, a keyword
/// argument already present under the same name is left untouched.
fn merge_bound_arg(args: &mut HashMap<String, Value>, name: &str, value: Value, keyword_wins_on_nil: bool) {
    if keyword_wins_on_nil && matches!(value, Value::Nil) && args.contains_key(name) {
        return;
    }
    args.insert(name.to_string(), value);
}

/// Resolves a `Render`/`Include` name operand. `None` means a dynamic name
/// popped a non-string value — a "partial-name type error"; the caller
/// decides whether that's recoverable.
fn resolve_partial_name(
    name: &PartialName,
    interner: &liquidil_bytecode::Interner,
    stack: &mut Vec<Value>,
) -> Option<String> {
    match name {
        PartialName::Const(sym) => Some(interner.resolve(*sym).to_string()),
        PartialName::Dynamic => match stack.pop().unwrap_or(Value::Nil) {
            Value::String(s) => Some(s.to_string()),
            _ => None,
        },
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq => lhs.liquid_eq(rhs),
        CompareOp::Ne => !lhs.liquid_eq(rhs),
        CompareOp::Contains => contains(lhs, rhs),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ord = match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => Some(a.as_ref().cmp(b.as_ref())),
                _ => match (lhs.as_f64(), rhs.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            };
            match ord {
                Some(std::cmp::Ordering::Less) => matches!(op, CompareOp::Lt | CompareOp::Le),
                Some(std::cmp::Ordering::Greater) => matches!(op, CompareOp::Gt | CompareOp::Ge),
                Some(std::cmp::Ordering::Equal) => matches!(op, CompareOp::Le | CompareOp::Ge),
                None => false,
            }
        }
    }
}

fn contains(lhs: &Value, rhs: &Value) -> bool {
    match lhs {
        Value::String(s) => s.contains(&rhs.to_output_string()),
        Value::List(items) => items.iter().any(|item| item.liquid_eq(rhs)),
        _ => false,
    }
}

fn cycle_identity(
    interner: &liquidil_bytecode::Interner,
    group: Option<liquidil_bytecode::Symbol>,
    values: &[liquidil_bytecode::CycleValue],
) -> String {
    match group {
        Some(sym) => interner.resolve(sym).to_string(),
        None => values
            .iter()
            .map(|v| match v {
                liquidil_bytecode::CycleValue::Lit(lit) => format!("{lit:?}"),
                liquidil_bytecode::CycleValue::Var(sym) => interner.resolve(*sym).to_string(),
            })
            .collect::<Vec<_>>()
            .join("\u{0}"),
    }
}

fn resolve_cycle_value(
    value: &liquidil_bytecode::CycleValue,
    interner: &liquidil_bytecode::Interner,
    scope: &Scope,
) -> Value {
    match value {
        liquidil_bytecode::CycleValue::Lit(lit) => lit.to_value(),
        liquidil_bytecode::CycleValue::Var(sym) => scope.lookup(interner.resolve(*sym)),
    }
}

/// `offset:` resolution: a `nil` operand means 0; the string `"continue"`
/// sentinel means "resume where this loop's previous pass over the same
/// `loop_name` left off".
fn resolve_offset(offset: &Value, remembered: i64) -> i64 {
    match offset {
        Value::Nil => 0,
        Value::String(s) if &**s == "continue" => remembered,
        other => other.as_f64().map(|f| f as i64).unwrap_or(0),
    }
}

/// Builds the already-sliced item list for `for`/`tablerow`: `from = offset`,
/// `to = from + limit` if present, `from <= i < to`. A string iterates as a
/// single item regardless of slicing. Returns `None` on a non-integer
/// limit operand (a non-numeric limit is rejected, not coerced).
fn slice_collection(collection: &Value, offset: i64, limit: &Value) -> Option<Vec<Value>> {
    let limit = match limit {
        Value::Nil => None,
        other => Some(other.as_f64()? as i64),
    };
    let all: Vec<Value> = match collection {
        Value::Range(a, b) => {
            if a <= b {
                (*a..=*b).map(Value::Int).collect()
            } else {
                Vec::new()
            }
        }
        Value::List(items) => items.as_ref().clone(),
        Value::String(_) => vec![collection.clone()],
        Value::Drop(d) => match d.to_liquid_value() {
            Some(Value::List(items)) => items.as_ref().clone(),
            Some(other) => vec![other],
            None => Vec::new(),
        },
        _ => Vec::new(),
    };
    let from = offset.max(0) as usize;
    let to = match limit {
        Some(l) => (offset.max(0) + l.max(0)).min(all.len() as i64) as usize,
        None => all.len(),
    };
    if from >= all.len() || from >= to {
        return Some(Vec::new());
    }
    Some(all[from..to].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MapFileSystem;
    use crate::filters::BuiltinFilters;

    fn render(source: &str, assigns: HashMap<String, Value>) -> String {
        let program = liquidil_compiler::compile(source).unwrap();
        let filters = BuiltinFilters::new();
        let fs = MapFileSystem::new();
        let mut vm = Vm::new(&filters, &fs);
        vm.render(&program, source, "template.liquid".into(), assigns).unwrap()
    }

    #[test]
    fn scenario_upcase_filter() {
        assert_eq!(render("{{ 'hi' | upcase }}", HashMap::new()), "HI");
    }

    #[test]
    fn scenario_for_over_assigned_range() {
        let out = render("{% assign n = 3 %}{% for i in (1..n) %}{{ i }}{% endfor %}", HashMap::new());
        assert_eq!(out, "123");
    }

    #[test]
    fn scenario_for_else_reports_last_item() {
        let mut map_a = indexmap::IndexMap::new();
        map_a.insert("name".to_string(), Value::string("A"));
        map_a.insert("last".to_string(), Value::Bool(false));
        let mut map_b = indexmap::IndexMap::new();
        map_b.insert("name".to_string(), Value::string("B"));
        map_b.insert("last".to_string(), Value::Bool(true));
        let items = Value::list(vec![Value::map(map_a), Value::map(map_b)]);
        let mut assigns = HashMap::new();
        assigns.insert("items".to_string(), items);
        let out = render(
            "{% for x in items %}{{ x.name }}{% if x.last %}!{% endif %}{% else %}none{% endfor %}",
            assigns,
        );
        assert_eq!(out, "AB!");
    }

    #[test]
    fn scenario_empty_range_hits_else() {
        let out = render("{% for x in (1..0) %}x{% else %}E{% endfor %}", HashMap::new());
        assert_eq!(out, "E");
    }

    #[test]
    fn scenario_capture_reuses_value() {
        let mut assigns = HashMap::new();
        assigns.insert("n".to_string(), Value::Int(4));
        let out = render("{% capture g %}{{ n | plus: 1 }}{% endcapture %}{{ g }}{{ g }}", assigns);
        assert_eq!(out, "55");
    }

    #[test]
    fn scenario_cycle_wraps() {
        let out = render(
            "{% cycle 'a','b','c' %}{% cycle 'a','b','c' %}{% cycle 'a','b','c' %}{% cycle 'a','b','c' %}",
            HashMap::new(),
        );
        assert_eq!(out, "abca");
    }

    #[test]
    fn scenario_tablerow_markup() {
        let items = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let mut assigns = HashMap::new();
        assigns.insert("products".to_string(), items);
        let out = render("{% tablerow p in products cols:2 %}{{ p }}{% endtablerow %}", assigns);
        assert_eq!(
            out,
            "<tr class=\"row1\">\n<td class=\"col1\">1</td><td class=\"col2\">2</td></tr>\n<tr class=\"row2\"><td class=\"col1\">3</td></tr>\n"
        );
    }

    #[test]
    fn tablerow_over_empty_collection_emits_empty_row() {
        let assigns = HashMap::from([("items".to_string(), Value::list(vec![]))]);
        let out = render("{% tablerow p in items %}{{ p }}{% endtablerow %}", assigns);
        assert_eq!(out, "<tr class=\"row1\">\n</tr>\n");
    }

    #[test]
    fn for_limit_zero_yields_no_iterations() {
        let assigns = HashMap::from([("arr".to_string(), Value::list(vec![Value::Int(1), Value::Int(2)]))]);
        let out = render("{% for x in arr limit:0 %}{{ x }}{% endfor %}", assigns);
        assert_eq!(out, "");
    }

    #[test]
    fn default_filter_keeps_zero_but_not_nil() {
        assert_eq!(render("{{ 0 | default: 'x' }}", HashMap::new()), "0");
        assert_eq!(render("{{ nil | default: 'x' }}", HashMap::new()), "x");
        assert_eq!(render("{{ '' | default: 'x' }}", HashMap::new()), "x");
    }

    #[test]
    fn case_blank_matches_whitespace_only() {
        let out = render("{% case ' ' %}{% when blank %}Y{% endcase %}", HashMap::new());
        assert_eq!(out, "Y");
    }

    #[test]
    fn case_subject_blank_is_stricter_than_pattern() {
        let out = render("{% case blank %}{% when ' ' %}Y{% endcase %}", HashMap::new());
        assert_eq!(out, "");
    }

    #[test]
    fn render_tag_is_isolated_from_caller_scope() {
        let fs = MapFileSystem::new().with("card", "{{ outer }}{{ card }}");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% assign outer = 'X' %}{% render 'card' with 'A' %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let out = vm.render(&program, source, "template.liquid".into(), HashMap::new()).unwrap();
        assert_eq!(out, "A");
    }

    #[test]
    fn include_tag_shares_caller_scope() {
        let fs = MapFileSystem::new().with("card", "{{ outer }}");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% assign outer = 'X' %}{% include 'card' %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let out = vm.render(&program, source, "template.liquid".into(), HashMap::new()).unwrap();
        assert_eq!(out, "X");
    }

    #[test]
    fn render_for_calls_the_partial_once_per_array_item() {
        let fs = MapFileSystem::new().with("card", "{{ card }};");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% render 'card' for items %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let items = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let assigns = HashMap::from([("items".to_string(), items)]);
        let out = vm.render(&program, source, "template.liquid".into(), assigns).unwrap();
        assert_eq!(out, "1;2;3;");
    }

    #[test]
    fn render_for_over_a_range_iterates_for_render_but_not_include() {
        let fs = MapFileSystem::new().with("n", "{{ n }};");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let render_source = "{% render 'n' for (1..3) as n %}";
        let program = liquidil_compiler::compile(render_source).unwrap();
        let out = vm.render(&program, render_source, "template.liquid".into(), HashMap::new()).unwrap();
        assert_eq!(out, "1;2;3;");

        let include_source = "{% include 'n' for (1..3) as n %}";
        let program = liquidil_compiler::compile(include_source).unwrap();
        let out = vm.render(&program, include_source, "template.liquid".into(), HashMap::new()).unwrap();
        assert_eq!(out, "1..3;");
    }

    #[test]
    fn render_with_as_binds_the_value_under_the_alias() {
        let fs = MapFileSystem::new().with("card", "{{ product }}");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% render 'card' with 'shoe' as product %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let out = vm.render(&program, source, "template.liquid".into(), HashMap::new()).unwrap();
        assert_eq!(out, "shoe");
    }

    #[test]
    fn render_keyword_arguments_are_visible_inside_the_partial() {
        let fs = MapFileSystem::new().with("card", "{{ color }}-{{ size }}");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% render 'card', color: 'red', size: 'M' %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let out = vm.render(&program, source, "template.liquid".into(), HashMap::new()).unwrap();
        assert_eq!(out, "red-M");
    }

    #[test]
    fn render_with_nil_defers_to_a_same_named_keyword_argument() {
        let fs = MapFileSystem::new().with("card", "{{ card }}");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% render 'card' with nil, card: 'fallback' %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let out = vm.render(&program, source, "template.liquid".into(), HashMap::new()).unwrap();
        assert_eq!(out, "fallback");
    }

    #[test]
    fn include_with_nil_always_overrides_a_same_named_keyword_argument() {
        let fs = MapFileSystem::new().with("card", "{{ card }}");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% include 'card' with nil, card: 'fallback' %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let out = vm.render(&program, source, "template.liquid".into(), HashMap::new()).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn case_subject_blank_matches_strictly_empty_pattern() {
        let out = render("{% case blank %}{% when '' %}Y{% endcase %}", HashMap::new());
        assert_eq!(out, "Y");
    }

    #[test]
    fn break_inside_include_stops_the_callers_for_loop() {
        let fs = MapFileSystem::new().with("stop", "{% break %}");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% for x in items %}{{ x }}{% include 'stop' %}{% endfor %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let items = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let assigns = HashMap::from([("items".to_string(), items)]);
        let out = vm.render(&program, source, "template.liquid".into(), assigns).unwrap();
        assert_eq!(out, "1");
    }

    #[test]
    fn continue_inside_include_skips_rest_of_the_callers_loop_body() {
        let fs = MapFileSystem::new().with("skip", "{% continue %}");
        let filters = BuiltinFilters::new();
        let mut vm = Vm::new(&filters, &fs);
        let source = "{% for x in items %}{{ x }}{% include 'skip' %}!{% endfor %}";
        let program = liquidil_compiler::compile(source).unwrap();
        let items = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let assigns = HashMap::from([("items".to_string(), items)]);
        let out = vm.render(&program, source, "template.liquid".into(), assigns).unwrap();
        assert_eq!(out, "12");
    }
}
