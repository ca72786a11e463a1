//! The runtime-tagged `Value` domain.
//!
//! Every VM operation pattern-matches over this enum instead of relying on
//! runtime reflection; host-supplied objects that aren't one of the native
//! variants are wrapped in `Value::Drop`, a capability handle rather than an
//! owning reference (see `LiquidDrop`).

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use liquidil_core::Symbol;

/// A source location attached to an `error_marker`, for diagnostic text.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceLocation {
    pub file: Rc<str>,
    pub line: u32,
}

/// An error produced by a filter or runtime operation when error rendering
/// is enabled. Never reaches `ASSIGN`; serialized on `WRITE_VALUE`.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorMarker {
    pub message: String,
    pub location: Option<SourceLocation>,
}

/// Host-supplied object exposing `lookup(key)` and optional coercion hooks.
/// The only non-primitive value the renderer consults.
///
/// Named `LiquidDrop` rather than `Drop` to avoid colliding with
/// `std::ops::Drop`. Re-exported by `liquidil-vm` at `liquidil_vm::value`
/// so callers outside this crate see it at the path named in the drop
/// protocol's design note.
pub trait LiquidDrop: fmt::Debug {
    /// Resolve a property name against this drop. Unknown keys return nil
    /// rather than erroring.
    fn lookup(&self, key: &str) -> Value;

    /// Coerce this drop to a plain `Value` for comparisons/iteration, if
    /// the host object has a natural scalar/collection representation.
    fn to_liquid_value(&self) -> Option<Value> {
        None
    }

    /// Name reported in diagnostics (`ComparisonTypeMismatch`, etc).
    fn type_name(&self) -> &str {
        "drop"
    }
}

pub type List = Rc<Vec<Value>>;
pub type Map = Rc<IndexMap<String, Value>>;
pub type Drop = Rc<dyn LiquidDrop>;

/// The runtime-tagged value domain.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Range(i64, i64),
    List(List),
    Map(Map),
    /// The `empty` literal: compares equal to any native empty collection
    /// or empty string (not to itself — see `liquid_eq`).
    EmptyLiteral,
    /// The `blank` literal: compares equal to nil, false, empty/whitespace
    /// strings, and empty collections (not to itself).
    BlankLiteral,
    Drop(Drop),
    Error(Rc<ErrorMarker>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Value::Map(Rc::new(entries))
    }

    pub fn error(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Value::Error(Rc::new(ErrorMarker {
            message: message.into(),
            location,
        }))
    }

    /// Truthiness: only `nil` and `false` are falsy. `0`, `""`, `[]`,
    /// `{}` are truthy. `EMPTY`/`BLANK` literals are themselves falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(
            self,
            Value::Nil | Value::Bool(false) | Value::EmptyLiteral | Value::BlankLiteral
        )
    }

    /// True for a native empty string, list, or map (not for the `empty`
    /// sentinel itself — callers compare against that separately).
    pub fn is_native_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    /// True for nil, false, an empty collection/string, or a
    /// whitespace-only string (the inclusive "blank" rule).
    pub fn is_native_blank(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Bool(false) => true,
            Value::String(s) => s.trim().is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    /// `==` semantics for `COMPARE(:eq)`.
    ///
    /// `empty == empty` and `blank == blank` are both false per Liquid
    /// convention: the sentinels only compare equal to native values, never
    /// to each other or to themselves.
    pub fn liquid_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::EmptyLiteral, Value::EmptyLiteral) => false,
            (Value::BlankLiteral, Value::BlankLiteral) => false,
            (Value::EmptyLiteral, other) | (other, Value::EmptyLiteral) => other.is_native_empty(),
            (Value::BlankLiteral, other) | (other, Value::BlankLiteral) => other.is_native_blank(),
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Range(a0, a1), Value::Range(b0, b1)) => a0 == b0 && a1 == b1,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Stricter `CASE_COMPARE` rule: when `self` (the subject) is
    /// `blank`/`empty`, only strict emptiness (no whitespace) matches;
    /// when `pattern` is `blank`/`empty`, the inclusive `liquid_eq` rule
    /// applies.
    pub fn case_compare(&self, pattern: &Value) -> bool {
        match self {
            Value::BlankLiteral | Value::EmptyLiteral => pattern.is_native_empty(),
            _ => match pattern {
                Value::EmptyLiteral => self.is_native_empty(),
                Value::BlankLiteral => self.is_native_blank(),
                _ => self.liquid_eq(pattern),
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Range(_, _) => "range",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::EmptyLiteral => "empty",
            Value::BlankLiteral => "blank",
            Value::Drop(_) => "drop",
            Value::Error(_) => "error",
        }
    }

    /// Numeric coercion used by `COMPARE` for `<,<=,>,>=` and by arithmetic
    /// filters. Parses numeric-looking strings; non-numeric strings and
    /// all other non-numeric types return `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// WRITE_VALUE string coercion. Error markers serialize their message;
    /// nil and the empty/blank sentinels coerce to "".
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Nil | Value::EmptyLiteral | Value::BlankLiteral => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.to_string(),
            Value::Range(a, b) => format!("{a}..{b}"),
            Value::List(items) => items
                .iter()
                .map(Value::to_output_string)
                .collect::<Vec<_>>()
                .join(""),
            Value::Map(_) => String::new(),
            Value::Drop(d) => match d.to_liquid_value() {
                Some(v) => v.to_output_string(),
                None => String::new(),
            },
            Value::Error(marker) => marker.message.clone(),
        }
    }

    /// Dot-chain lookup: resolves a string/symbol key against list/map/
    /// range/string/drop values, including the reserved commands
    /// `size`/`length`/`first`/`last` (`LOOKUP_CONST_KEY`).
    pub fn lookup_const_key(&self, key: &str) -> Value {
        match key {
            "size" | "length" => return self.size_command(),
            "first" => return self.first_command(),
            "last" => return self.last_command(),
            _ => {}
        }
        self.lookup_key(&Value::string(key))
    }

    /// Bracket-index lookup: no reserved-name commands, integer/string
    /// keys only (`LOOKUP_KEY`).
    pub fn lookup_key(&self, key: &Value) -> Value {
        match self {
            Value::Map(m) => {
                let k = key.to_output_string();
                m.get(&k).cloned().unwrap_or(Value::Nil)
            }
            Value::List(items) => match key {
                Value::Int(i) => index_list(items, *i),
                Value::String(s) => s.parse::<i64>().map_or(Value::Nil, |i| index_list(items, i)),
                _ => Value::Nil,
            },
            Value::Drop(d) => d.lookup(&key.to_output_string()),
            _ => Value::Nil,
        }
    }

    fn size_command(&self) -> Value {
        match self {
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::List(items) => Value::Int(items.len() as i64),
            Value::Map(m) => Value::Int(m.len() as i64),
            Value::Range(a, b) => Value::Int((b - a + 1).max(0)),
            Value::Drop(d) => d.lookup("size"),
            _ => Value::Nil,
        }
    }

    fn first_command(&self) -> Value {
        match self {
            Value::List(items) => items.first().cloned().unwrap_or(Value::Nil),
            Value::Range(a, b) => {
                if a <= b {
                    Value::Int(*a)
                } else {
                    Value::Nil
                }
            }
            Value::Drop(d) => d.lookup("first"),
            _ => Value::Nil,
        }
    }

    fn last_command(&self) -> Value {
        match self {
            Value::List(items) => items.last().cloned().unwrap_or(Value::Nil),
            Value::Range(a, b) => {
                if a <= b {
                    Value::Int(*b)
                } else {
                    Value::Nil
                }
            }
            Value::Drop(d) => d.lookup("last"),
            _ => Value::Nil,
        }
    }
}

fn index_list(items: &[Value], i: i64) -> Value {
    let idx = if i < 0 { items.len() as i64 + i } else { i };
    if idx < 0 {
        return Value::Nil;
    }
    items.get(idx as usize).cloned().unwrap_or(Value::Nil)
}

/// Liquid's integer-looking-float rule: `3.0` renders as `3.0`? No — it
/// renders without a trailing `.0` only when Ruby's `to_s` would drop it;
/// we keep the common-case behavior of printing a minimal decimal form.
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_output_string())
    }
}

/// Tag used by `CYCLE_STEP`/`CYCLE_STEP_VAR` operands: a cycle value is
/// either a constant literal or a variable to resolve lazily at each step.
#[derive(Clone, PartialEq, Debug)]
pub enum CycleValue {
    Lit(ConstLit),
    Var(Symbol),
}

/// The constant literal domain an instruction operand can hold directly
/// (a subset of `Value` — no drops, errors, or shared collections, since
/// those can't be known at compile time).
#[derive(Clone, Debug, PartialEq)]
pub enum ConstLit {
    Nil,
    Bool(bool),
    Int(i64),
    Float(u64), // bits, for Eq/Hash; see `ConstLit::float`
    String(Rc<str>),
}

impl ConstLit {
    pub fn float(f: f64) -> Self {
        ConstLit::Float(f.to_bits())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConstLit::Float(bits) => Some(f64::from_bits(*bits)),
            ConstLit::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ConstLit::Nil => Value::Nil,
            ConstLit::Bool(b) => Value::Bool(*b),
            ConstLit::Int(i) => Value::Int(*i),
            ConstLit::Float(bits) => Value::Float(f64::from_bits(*bits)),
            ConstLit::String(s) => Value::String(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec() {
        assert!(Value::Int(0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(Value::list(vec![]).is_truthy());
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::EmptyLiteral.is_truthy());
        assert!(!Value::BlankLiteral.is_truthy());
    }

    #[test]
    fn empty_vs_blank_equality() {
        assert!(Value::string("").liquid_eq(&Value::EmptyLiteral));
        assert!(!Value::string(" ").liquid_eq(&Value::EmptyLiteral));
        assert!(Value::string(" ").liquid_eq(&Value::BlankLiteral));
        assert!(Value::Nil.liquid_eq(&Value::BlankLiteral));
        assert!(!Value::Bool(false).liquid_eq(&Value::EmptyLiteral));
        assert!(!Value::EmptyLiteral.liquid_eq(&Value::EmptyLiteral));
        assert!(!Value::BlankLiteral.liquid_eq(&Value::BlankLiteral));
    }

    #[test]
    fn case_compare_is_stricter_on_subject_side() {
        // subject ' ' vs pattern blank -> true (inclusive rule on pattern side)
        assert!(Value::string(" ").case_compare(&Value::BlankLiteral));
        // subject blank vs pattern ' ' -> false (strict rule on subject side)
        assert!(!Value::BlankLiteral.case_compare(&Value::string(" ")));
    }

    #[test]
    fn case_compare_subject_blank_matches_strictly_empty_pattern() {
        // subject blank vs pattern '' -> true (pattern is strictly empty)
        assert!(Value::BlankLiteral.case_compare(&Value::string("")));
        assert!(Value::EmptyLiteral.case_compare(&Value::string("")));
    }

    #[test]
    fn lookup_const_key_commands() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(matches!(list.lookup_const_key("size"), Value::Int(3)));
        assert!(matches!(list.lookup_const_key("first"), Value::Int(1)));
        assert!(matches!(list.lookup_const_key("last"), Value::Int(3)));
    }

    #[test]
    fn negative_index_counts_from_end() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(matches!(list.lookup_key(&Value::Int(-1)), Value::Int(3)));
    }
}
