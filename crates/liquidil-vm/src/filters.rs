//! Filter table: a name → function registry the VM consults on
//! `CALL_FILTER`. Kept as a trait so a host can swap in a larger filter
//! set without touching the VM's dispatch loop.

use std::collections::HashMap;
use std::fmt;

use liquidil_bytecode::value::{Map, Value};

use crate::engine::Scope;

/// Raised by a filter body. Non-strict mode swallows this into `nil`;
/// strict mode reclassifies it as a runtime error at the call site.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterError {
    pub message: String,
}

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FilterError {}

pub trait FilterTable {
    fn apply(
        &self,
        name: &str,
        input: Value,
        args: &[Value],
        kwargs: Option<&Map>,
        scope: &mut Scope,
    ) -> Result<Value, FilterError>;
}

type FilterFn = fn(Value, &[Value], Option<&Map>) -> Result<Value, FilterError>;

/// A minimal built-in filter set, enough to exercise the constant-folding
/// passes and the end-to-end rendering scenarios. Not a complete filter
/// library; hosts register their own via `FilterTable`.
pub struct BuiltinFilters {
    table: HashMap<&'static str, FilterFn>,
}

impl Default for BuiltinFilters {
    fn default() -> Self {
        let mut table: HashMap<&'static str, FilterFn> = HashMap::new();
        table.insert("upcase", f_upcase);
        table.insert("downcase", f_downcase);
        table.insert("plus", f_plus);
        table.insert("minus", f_minus);
        table.insert("size", f_size);
        table.insert("default", f_default);
        table.insert("join", f_join);
        table.insert("first", f_first);
        table.insert("last", f_last);
        Self { table }
    }
}

impl BuiltinFilters {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FilterTable for BuiltinFilters {
    fn apply(
        &self,
        name: &str,
        input: Value,
        args: &[Value],
        kwargs: Option<&Map>,
        _scope: &mut Scope,
    ) -> Result<Value, FilterError> {
        match self.table.get(name) {
            Some(f) => f(input, args, kwargs),
            None => Err(FilterError::new(format!("unknown filter {name}"))),
        }
    }
}

fn f_upcase(input: Value, _args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    Ok(Value::string(input.to_output_string().to_uppercase()))
}

fn f_downcase(input: Value, _args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    Ok(Value::string(input.to_output_string().to_lowercase()))
}

fn f_plus(input: Value, args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    numeric_binop(input, args, |a, b| a + b, |a, b| a + b)
}

fn f_minus(input: Value, args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    numeric_binop(input, args, |a, b| a - b, |a, b| a - b)
}

fn numeric_binop(
    input: Value,
    args: &[Value],
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, FilterError> {
    let rhs = args.first().ok_or_else(|| FilterError::new("missing argument"))?;
    match (&input, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        _ => {
            let a = input.as_f64().ok_or_else(|| FilterError::new("not a number"))?;
            let b = rhs.as_f64().ok_or_else(|| FilterError::new("not a number"))?;
            Ok(Value::Float(float_op(a, b)))
        }
    }
}

fn f_size(input: Value, _args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    Ok(input.lookup_const_key("size"))
}

fn f_default(input: Value, args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    let fallback = args.first().cloned().unwrap_or(Value::Nil);
    // `0 | default: 'x'` stays `0`; only falsy/empty/blank inputs fall
    // back (Liquid's `default` treats blank, not just falsy, as "use
    // the fallback").
    if input.is_truthy() && !input.is_native_empty() && !input.is_native_blank() {
        Ok(input)
    } else {
        Ok(fallback)
    }
}

fn f_join(input: Value, args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    let sep = args.first().map(Value::to_output_string).unwrap_or_else(|| " ".to_string());
    match input {
        Value::List(items) => Ok(Value::string(
            items.iter().map(Value::to_output_string).collect::<Vec<_>>().join(&sep),
        )),
        other => Ok(other),
    }
}

fn f_first(input: Value, _args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    Ok(input.lookup_const_key("first"))
}

fn f_last(input: Value, _args: &[Value], _kwargs: Option<&Map>) -> Result<Value, FilterError> {
    Ok(input.lookup_const_key("last"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Scope;

    fn scope() -> Scope {
        Scope::new(0)
    }

    #[test]
    fn upcase_and_downcase() {
        let filters = BuiltinFilters::new();
        let mut s = scope();
        assert!(matches!(
            filters.apply("upcase", Value::string("hi"), &[], None, &mut s),
            Ok(Value::String(ref out)) if &**out == "HI"
        ));
        assert!(matches!(
            filters.apply("downcase", Value::string("HI"), &[], None, &mut s),
            Ok(Value::String(ref out)) if &**out == "hi"
        ));
    }

    #[test]
    fn plus_keeps_integers_integer() {
        let filters = BuiltinFilters::new();
        let mut s = scope();
        let result = filters.apply("plus", Value::Int(4), &[Value::Int(1)], None, &mut s).unwrap();
        assert!(matches!(result, Value::Int(5)));
    }

    #[test]
    fn default_keeps_zero() {
        let filters = BuiltinFilters::new();
        let mut s = scope();
        let zero = filters.apply("default", Value::Int(0), &[Value::string("x")], None, &mut s).unwrap();
        assert!(matches!(zero, Value::Int(0)));
        let nil = filters.apply("default", Value::Nil, &[Value::string("x")], None, &mut s).unwrap();
        assert!(matches!(nil, Value::String(ref s) if &**s == "x"));
    }

    #[test]
    fn join_uses_separator() {
        let filters = BuiltinFilters::new();
        let mut s = scope();
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let result = filters.apply("join", list, &[Value::string("-")], None, &mut s).unwrap();
        assert!(matches!(result, Value::String(ref s) if &**s == "1-2-3"));
    }
}
