//! Scope/Context: the lexically scoped variable environment a single
//! render call owns — frames, capture sinks, for-offset memory, cycle and
//! ifchanged state, the pending interrupt, and the register file.

use std::collections::HashMap;
use std::rc::Rc;

use liquidil_bytecode::value::{LiquidDrop, Value};

/// A single pending `break` or `continue`, gating further writes until
/// `JUMP_IF_INTERRUPT` consumes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    Break,
    Continue,
}

/// Per-loop cursor over the already-sliced item list. A stack (not a
/// single field) because `for`/`tablerow` nest.
///
/// `parent` and `var` are cached here rather than recomputed each
/// iteration: `ForNext` rebuilds `ForLoopDrop` from scratch every call
/// (the drop is immutable once pushed, but `index0` must advance), and
/// the operand-less `FOR_END` needs `var` to know which `for_offsets`
/// entry to update.
#[derive(Debug)]
pub struct ForIterState {
    pub items: Vec<Value>,
    pub idx: usize,
    pub start_offset: i64,
    pub parent: Value,
    pub var: String,
}

impl ForIterState {
    pub fn next(&mut self) -> Option<Value> {
        let item = self.items.get(self.idx).cloned()?;
        self.idx += 1;
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Computes the offset a subsequent `offset:continue` should resume
    /// from, recorded by `FOR_END`.
    pub fn next_offset(&self) -> i64 {
        self.start_offset + self.idx as i64
    }
}

#[derive(Debug)]
pub struct TablerowIterState {
    pub items: Vec<Value>,
    pub idx: usize,
    pub cols: i64,
    pub parent: Value,
    pub var: String,
}

impl TablerowIterState {
    pub fn next(&mut self) -> Option<Value> {
        let item = self.items.get(self.idx).cloned()?;
        self.idx += 1;
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// `forloop` drop (`PUSH_FORLOOP`/`POP_FORLOOP`). Holds its parent by
/// an owned `Value` clone rather than a back-index into the loop stack: the
/// stack already owns each drop behind an `Rc`, so cloning the parent
/// `Value` (itself an `Rc` clone) is as cheap as a back-index lookup would
/// be and avoids borrowing the stack while a child drop is alive.
#[derive(Debug)]
pub struct ForLoopDrop {
    pub index0: i64,
    pub length: i64,
    pub parentloop: Value,
}

impl LiquidDrop for ForLoopDrop {
    fn lookup(&self, key: &str) -> Value {
        match key {
            "index0" => Value::Int(self.index0),
            "index" => Value::Int(self.index0 + 1),
            "rindex0" => Value::Int(self.length - 1 - self.index0),
            "rindex" => Value::Int(self.length - self.index0),
            "length" => Value::Int(self.length),
            "first" => Value::Bool(self.index0 == 0),
            "last" => Value::Bool(self.index0 == self.length - 1),
            "parentloop" => self.parentloop.clone(),
            _ => Value::Nil,
        }
    }

    fn type_name(&self) -> &str {
        "forloop"
    }
}

/// `tablerowloop` drop.
#[derive(Debug)]
pub struct TablerowLoopDrop {
    pub index0: i64,
    pub length: i64,
    pub cols: i64,
    pub parentloop: Value,
}

impl LiquidDrop for TablerowLoopDrop {
    fn lookup(&self, key: &str) -> Value {
        let col0 = if self.cols > 0 { self.index0 % self.cols } else { self.index0 };
        match key {
            "index0" => Value::Int(self.index0),
            "index" => Value::Int(self.index0 + 1),
            "rindex0" => Value::Int(self.length - 1 - self.index0),
            "rindex" => Value::Int(self.length - self.index0),
            "length" => Value::Int(self.length),
            "first" => Value::Bool(self.index0 == 0),
            "last" => Value::Bool(self.index0 == self.length - 1),
            "col0" => Value::Int(col0),
            "col" => Value::Int(col0 + 1),
            "col_first" => Value::Bool(col0 == 0),
            "col_last" => Value::Bool(self.cols > 0 && col0 == self.cols - 1),
            "row" => Value::Int(if self.cols > 0 { self.index0 / self.cols } else { 0 } + 1),
            "parentloop" => self.parentloop.clone(),
            _ => Value::Nil,
        }
    }

    fn type_name(&self) -> &str {
        "tablerowloop"
    }
}

#[derive(Debug, Default)]
pub struct Scope {
    root: HashMap<String, Value>,
    frames: Vec<HashMap<String, Value>>,
    sinks: Vec<String>,
    output: String,
    registers: Vec<Value>,
    counters: HashMap<String, i64>,
    for_offsets: HashMap<String, i64>,
    cycle_state: HashMap<String, usize>,
    ifchanged_state: HashMap<usize, String>,
    interrupt: Option<Interrupt>,
    for_iters: Vec<ForIterState>,
    tablerow_iters: Vec<TablerowIterState>,
    forloop_stack: Vec<Value>,
    tablerowloop_stack: Vec<Value>,
    pub render_depth: u32,
}

impl Scope {
    pub fn new(register_count: u32) -> Self {
        Self {
            registers: vec![Value::Nil; register_count as usize],
            ..Default::default()
        }
    }

    /// A fresh scope seeded by an argument map, for `render`'s isolated
    /// partial invocation.
    pub fn isolated(register_count: u32, args: HashMap<String, Value>) -> Self {
        Self { root: args, ..Self::new(register_count) }
    }

    // --- variable lookup/assignment ---

    pub fn lookup(&self, name: &str) -> Value {
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.get(name) {
                return v.clone();
            }
        }
        self.root.get(name).cloned().unwrap_or(Value::Nil)
    }

    /// `ASSIGN`: writes to root. An `error_marker` value is suppressed
    /// (it should never reach `ASSIGN`) and so is a write while an
    /// interrupt is pending — ordinary writes and assignments are gated
    /// until the nearest `JUMP_IF_INTERRUPT` consumes it.
    pub fn assign(&mut self, name: &str, value: Value) {
        if self.interrupt.is_some() || matches!(value, Value::Error(_)) {
            return;
        }
        self.root.insert(name.to_string(), value);
    }

    /// Binds a name in the innermost frame — used internally for loop
    /// variables and partial `as`/`with` bindings, which have no direct
    /// `ASSIGN_LOCAL` opcode in this reduced encoding (they're lowered to
    /// scope pushes/pops around the loop or partial body instead).
    pub fn set_local(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(top) => {
                top.insert(name.to_string(), value);
            }
            None => {
                self.root.insert(name.to_string(), value);
            }
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    // --- output / capture ---

    pub fn write(&mut self, s: &str) {
        if self.interrupt.is_some() {
            return;
        }
        match self.sinks.last_mut() {
            Some(buf) => buf.push_str(s),
            None => self.output.push_str(s),
        }
    }

    pub fn push_capture(&mut self) {
        self.sinks.push(String::new());
    }

    pub fn pop_capture(&mut self) -> String {
        self.sinks.pop().unwrap_or_default()
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    // --- registers ---

    pub fn store_temp(&mut self, i: u16, value: Value) {
        if let Some(slot) = self.registers.get_mut(i as usize) {
            *slot = value;
        }
    }

    pub fn load_temp(&self, i: u16) -> Value {
        self.registers.get(i as usize).cloned().unwrap_or(Value::Nil)
    }

    /// Grows the register file to at least `count` slots. `include`
    /// shares the caller's scope with a partial that may have been
    /// compiled with a larger `register_count` than the caller needed.
    pub fn ensure_registers(&mut self, count: u32) {
        if (count as usize) > self.registers.len() {
            self.registers.resize(count as usize, Value::Nil);
        }
    }

    // --- increment/decrement counters ---

    /// `INCREMENT(name)`: returns the value before incrementing, starting
    /// from 0. Kept separate from `root` assigns — Liquid's counter and
    /// assign namespaces don't collide.
    pub fn increment(&mut self, name: &str) -> i64 {
        let v = self.counters.get(name).copied().unwrap_or(0);
        self.counters.insert(name.to_string(), v + 1);
        v
    }

    /// `DECREMENT(name)`: returns the value after decrementing, starting
    /// from 0 (so the first call returns -1).
    pub fn decrement(&mut self, name: &str) -> i64 {
        let v = self.counters.get(name).copied().unwrap_or(0) - 1;
        self.counters.insert(name.to_string(), v);
        v
    }

    // --- for-offset memory (`offset:continue`) ---

    pub fn for_offset(&self, loop_name: &str) -> i64 {
        self.for_offsets.get(loop_name).copied().unwrap_or(0)
    }

    pub fn set_for_offset(&mut self, loop_name: &str, offset: i64) {
        self.for_offsets.insert(loop_name.to_string(), offset);
    }

    // --- cycle ---

    /// Returns the index to use this step, then advances the identity's
    /// counter modulo `len`.
    pub fn cycle_step(&mut self, identity: &str, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let idx = self.cycle_state.get(identity).copied().unwrap_or(0) % len;
        self.cycle_state.insert(identity.to_string(), (idx + 1) % len);
        idx
    }

    // --- ifchanged ---

    /// True when `value` differs from what was last recorded at `ip`
    /// (`IFCHANGED_CHECK`, keyed by the checking instruction's own
    /// address rather than a separate `tag_id` operand).
    pub fn ifchanged_check(&mut self, ip: usize, value: &str) -> bool {
        let changed = self.ifchanged_state.get(&ip).map(String::as_str) != Some(value);
        self.ifchanged_state.insert(ip, value.to_string());
        changed
    }

    // --- interrupts ---

    pub fn raise(&mut self, interrupt: Interrupt) {
        self.interrupt = Some(interrupt);
    }

    /// Consumes the pending interrupt, if any. `JUMP_IF_INTERRUPT` is the
    /// sole consumer: a `continue` clears it and falls through, a `break`
    /// clears it and branches.
    pub fn take_interrupt(&mut self) -> Option<Interrupt> {
        self.interrupt.take()
    }

    pub fn interrupt_pending(&self) -> bool {
        self.interrupt.is_some()
    }

    // --- for/tablerow iteration stacks ---

    pub fn push_for_iter(&mut self, state: ForIterState) {
        self.for_iters.push(state);
    }

    pub fn pop_for_iter(&mut self) -> Option<ForIterState> {
        self.for_iters.pop()
    }

    pub fn current_for_iter_mut(&mut self) -> Option<&mut ForIterState> {
        self.for_iters.last_mut()
    }

    pub fn push_tablerow_iter(&mut self, state: TablerowIterState) {
        self.tablerow_iters.push(state);
    }

    pub fn pop_tablerow_iter(&mut self) -> Option<TablerowIterState> {
        self.tablerow_iters.pop()
    }

    pub fn current_tablerow_iter_mut(&mut self) -> Option<&mut TablerowIterState> {
        self.tablerow_iters.last_mut()
    }

    pub fn current_forloop(&self) -> Value {
        self.forloop_stack.last().cloned().unwrap_or(Value::Nil)
    }

    pub fn push_forloop(&mut self, drop: ForLoopDrop) -> Value {
        let value = Value::Drop(Rc::new(drop));
        self.forloop_stack.push(value.clone());
        value
    }

    pub fn pop_forloop(&mut self) {
        self.forloop_stack.pop();
    }

    pub fn current_tablerowloop(&self) -> Value {
        self.tablerowloop_stack.last().cloned().unwrap_or(Value::Nil)
    }

    pub fn push_tablerowloop(&mut self, drop: TablerowLoopDrop) -> Value {
        let value = Value::Drop(Rc::new(drop));
        self.tablerowloop_stack.push(value.clone());
        value
    }

    pub fn pop_tablerowloop(&mut self) {
        self.tablerowloop_stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_falls_back_from_frame_to_root() {
        let mut scope = Scope::new(0);
        scope.assign("x", Value::Int(1));
        scope.push_frame();
        scope.set_local("y", Value::Int(2));
        assert!(matches!(scope.lookup("x"), Value::Int(1)));
        assert!(matches!(scope.lookup("y"), Value::Int(2)));
        scope.pop_frame();
        assert!(matches!(scope.lookup("y"), Value::Nil));
    }

    #[test]
    fn assign_suppresses_error_markers() {
        let mut scope = Scope::new(0);
        scope.assign("x", Value::error("boom", None));
        assert!(matches!(scope.lookup("x"), Value::Nil));
    }

    #[test]
    fn writes_are_gated_on_pending_interrupt() {
        let mut scope = Scope::new(0);
        scope.raise(Interrupt::Break);
        scope.write("hi");
        assert_eq!(scope.output(), "");
    }

    #[test]
    fn capture_redirects_writes() {
        let mut scope = Scope::new(0);
        scope.push_capture();
        scope.write("hi");
        assert_eq!(scope.pop_capture(), "hi");
    }

    #[test]
    fn cycle_step_wraps_around() {
        let mut scope = Scope::new(0);
        assert_eq!(scope.cycle_step("id", 3), 0);
        assert_eq!(scope.cycle_step("id", 3), 1);
        assert_eq!(scope.cycle_step("id", 3), 2);
        assert_eq!(scope.cycle_step("id", 3), 0);
    }

    #[test]
    fn forloop_drop_reports_first_last_and_parent() {
        let mut scope = Scope::new(0);
        let outer = scope.push_forloop(ForLoopDrop { index0: 0, length: 1, parentloop: Value::Nil });
        let inner = scope.push_forloop(ForLoopDrop { index0: 2, length: 3, parentloop: outer });
        if let Value::Drop(d) = &inner {
            assert!(matches!(d.lookup("last"), Value::Bool(true)));
            assert!(matches!(d.lookup("first"), Value::Bool(false)));
            assert!(matches!(d.lookup("parentloop"), Value::Drop(_)));
        } else {
            panic!("expected drop");
        }
    }
}
