//! String slots and methods.
//!
//! Strings are immutable UTF-8. Indexing, length and iteration work in characters.

use std::cmp::Ordering;

use super::{hash::builtin_hash, iter::NativeIter, method, normalize_index, slot, str_arg, unsupported};
use crate::{
    bytecode::BinaryOp,
    exception::{ErrorKind, RunResult},
    function::Arity,
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::Value,
};

const HASH_STRING: u8 = 4;

/// Largest string or sequence a repetition may produce.
pub(crate) const MAX_REPEAT_LEN: usize = 1 << 28;

/// Renders a string literal with single quotes and escapes.
pub(crate) fn string_repr(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn this_str(this: &Value) -> RunResult<&str> {
    str_arg(this, "receiver")
}

fn repeat(s: &str, count: &Value) -> RunResult<Value> {
    let Some(n) = count.as_int().or_else(|| count.as_bool().map(i64::from)) else {
        return unsupported();
    };
    let n = usize::try_from(n).unwrap_or(0);
    if s.len().checked_mul(n).map_or(true, |total| total > MAX_REPEAT_LEN) {
        return Err(ErrorKind::OverflowError.err("repeated string is too long"));
    }
    Ok(Value::string(s.repeat(n)))
}

fn add(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    match args[0].as_str() {
        Some(other) => Ok(Value::string(format!("{}{other}", this_str(this)?))),
        None => unsupported(),
    }
}

fn mul(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    repeat(this_str(this)?, &args[0])
}

fn compare(op: BinaryOp, this: &Value, other: &Value) -> RunResult<Value> {
    let (Some(a), Some(b)) = (this.as_str(), other.as_str()) else {
        return unsupported();
    };
    let ord = a.cmp(b);
    Ok(Value::bool(match op {
        BinaryOp::Equals => ord == Ordering::Equal,
        BinaryOp::NotEquals => ord != Ordering::Equal,
        BinaryOp::LessThan => ord == Ordering::Less,
        BinaryOp::LessOrEqual => ord != Ordering::Greater,
        BinaryOp::GreaterThan => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    }))
}

fn equals(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    compare(BinaryOp::Equals, this, &args[0])
}

fn not_equals(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    compare(BinaryOp::NotEquals, this, &args[0])
}

fn less_than(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    compare(BinaryOp::LessThan, this, &args[0])
}

fn less_or_equal(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    compare(BinaryOp::LessOrEqual, this, &args[0])
}

fn greater_than(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    compare(BinaryOp::GreaterThan, this, &args[0])
}

fn greater_or_equal(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    compare(BinaryOp::GreaterOrEqual, this, &args[0])
}

fn contains(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let needle = str_arg(&args[0], "left operand of 'in'")?;
    Ok(Value::bool(this_str(this)?.contains(needle)))
}

fn index(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let s = this_str(this)?;
    let len = s.chars().count();
    let i = normalize_index(&args[0], len)?;
    Ok(Value::string(s.chars().nth(i).map(String::from).unwrap_or_default()))
}

fn length(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let len = this_str(this)?.chars().count();
    Ok(Value::int(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn iter(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::iterator(NativeIter::Chars {
        chars: this_str(this)?.chars().collect(),
        index: 0,
    }))
}

fn hash(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::int(builtin_hash(HASH_STRING, this_str(this)?) as i64))
}

fn to_bool(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(!this_str(this)?.is_empty()))
}

fn to_string(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(this.clone())
}

fn repr(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::string(string_repr(this_str(this)?)))
}

fn upper(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::string(this_str(this)?.to_uppercase()))
}

fn lower(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::string(this_str(this)?.to_lowercase()))
}

fn strip(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::string(this_str(this)?.trim()))
}

/// `split()` splits on runs of whitespace, `split(sep)` on every occurrence of `sep`.
fn split(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let s = this_str(this)?;
    let parts: Vec<Value> = match args.first() {
        None => s.split_whitespace().map(Value::string).collect(),
        Some(sep) => {
            let sep = str_arg(sep, "separator")?;
            if sep.is_empty() {
                return Err(ErrorKind::value_error("empty separator"));
            }
            s.split(sep).map(Value::string).collect()
        }
    };
    Ok(Value::array(parts))
}

fn join(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let sep = this_str(this)?;
    let items = vm.collect(&args[0])?;
    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        parts.push(str_arg(item, "join() item")?);
    }
    Ok(Value::string(parts.join(sep)))
}

fn replace(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let old = str_arg(&args[0], "old")?;
    let new = str_arg(&args[1], "new")?;
    Ok(Value::string(this_str(this)?.replace(old, new)))
}

fn starts_with(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(this_str(this)?.starts_with(str_arg(&args[0], "prefix")?)))
}

fn ends_with(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(this_str(this)?.ends_with(str_arg(&args[0], "suffix")?)))
}

/// Character index of the first occurrence, or -1.
fn find(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let s = this_str(this)?;
    let needle = str_arg(&args[0], "substring")?;
    let index = s
        .find(needle)
        .map_or(-1, |byte| i64::try_from(s[..byte].chars().count()).unwrap_or(i64::MAX));
    Ok(Value::int(index))
}

fn to_bytes(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bytes(this_str(this)?.as_bytes().to_vec()))
}

fn right_mul(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    repeat(this_str(this)?, &args[0])
}

pub(crate) fn install(t: &Scope) {
    slot(t, Magic::Add, Arity::Exact(1), add);
    slot(t, Magic::Mul, Arity::Exact(1), mul);
    slot(t, Magic::RightMul, Arity::Exact(1), right_mul);
    slot(t, Magic::Equals, Arity::Exact(1), equals);
    slot(t, Magic::NotEquals, Arity::Exact(1), not_equals);
    slot(t, Magic::LessThan, Arity::Exact(1), less_than);
    slot(t, Magic::LessOrEqual, Arity::Exact(1), less_or_equal);
    slot(t, Magic::GreaterThan, Arity::Exact(1), greater_than);
    slot(t, Magic::GreaterOrEqual, Arity::Exact(1), greater_or_equal);
    slot(t, Magic::Contains, Arity::Exact(1), contains);
    slot(t, Magic::Index, Arity::Exact(1), index);
    slot(t, Magic::Length, Arity::Exact(0), length);
    slot(t, Magic::Iter, Arity::Exact(0), iter);
    slot(t, Magic::Hash, Arity::Exact(0), hash);
    slot(t, Magic::Bool, Arity::Exact(0), to_bool);
    slot(t, Magic::String, Arity::Exact(0), to_string);
    slot(t, Magic::Repr, Arity::Exact(0), repr);
    slot(t, Magic::Copy, Arity::Exact(0), to_string);
    method(t, "upper", Arity::Exact(0), upper);
    method(t, "lower", Arity::Exact(0), lower);
    method(t, "strip", Arity::Exact(0), strip);
    method(t, "split", Arity::Range(0, 1), split);
    method(t, "join", Arity::Exact(1), join);
    method(t, "replace", Arity::Exact(2), replace);
    method(t, "starts_with", Arity::Exact(1), starts_with);
    method(t, "ends_with", Arity::Exact(1), ends_with);
    method(t, "find", Arity::Exact(1), find);
    method(t, "to_bytes", Arity::Exact(0), to_bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_escapes() {
        assert_eq!(string_repr("it's\n"), "'it\\'s\\n'");
        assert_eq!(string_repr("\u{1}"), "'\\x01'");
    }

    #[test]
    fn comparisons() {
        let a = Value::string("abc");
        let b = Value::string("abd");
        assert_eq!(compare(BinaryOp::LessThan, &a, &b).unwrap().as_bool(), Some(true));
        assert_eq!(compare(BinaryOp::Equals, &a, &a.clone()).unwrap().as_bool(), Some(true));
        assert!(matches!(
            compare(BinaryOp::Equals, &a, &Value::int(1)),
            Err(crate::exception::RunError::Unsupported)
        ));
    }

    #[test]
    fn repeat_counts() {
        assert_eq!(repeat("ab", &Value::int(3)).unwrap().as_str(), Some("ababab"));
        assert_eq!(repeat("ab", &Value::int(-1)).unwrap().as_str(), Some(""));
    }
}
