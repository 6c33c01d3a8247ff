//! Immutable byte strings.

use std::cmp::Ordering;

use super::{hash::builtin_hash, iter::NativeIter, method, normalize_index, slot, unsupported};
use crate::{
    bytecode::BinaryOp,
    exception::{ErrorKind, RunResult},
    function::Arity,
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::Value,
};

const HASH_BYTES: u8 = 5;

/// Renders bytes as `b'..'`, escaping anything outside printable ASCII.
pub(crate) fn bytes_repr(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("b'");
    for &b in bytes {
        match b {
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(char::from(b)),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
    out
}

fn this_bytes(this: &Value) -> RunResult<&[u8]> {
    this.as_bytes()
        .ok_or_else(|| ErrorKind::type_error(format!("expected Bytes, got {}", this.type_name())))
}

fn add(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let Some(other) = args[0].as_bytes() else {
        return unsupported();
    };
    let mut joined = this_bytes(this)?.to_vec();
    joined.extend_from_slice(other);
    Ok(Value::bytes(joined))
}

fn compare(op: BinaryOp, this: &Value, other: &Value) -> RunResult<Value> {
    let (Some(a), Some(b)) = (this.as_bytes(), other.as_bytes()) else {
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

macro_rules! comparisons {
    ($($name:ident => $op:ident;)*) => {
        $(
            fn $name(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
                compare(BinaryOp::$op, this, &args[0])
            }
        )*
    };
}

comparisons! {
    equals => Equals;
    not_equals => NotEquals;
    less_than => LessThan;
    less_or_equal => LessOrEqual;
    greater_than => GreaterThan;
    greater_or_equal => GreaterOrEqual;
}

/// `x in b` accepts a byte value or a sub-sequence.
fn contains(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let haystack = this_bytes(this)?;
    let needle = &args[0];
    if let Some(byte) = needle.as_int() {
        return Ok(Value::bool(u8::try_from(byte).is_ok_and(|b| haystack.contains(&b))));
    }
    match needle.as_bytes() {
        Some([]) => Ok(Value::bool(true)),
        Some(sub) => Ok(Value::bool(haystack.windows(sub.len()).any(|w| w == sub))),
        None => Err(ErrorKind::type_error(format!(
            "'in <Bytes>' requires Int or Bytes, not {}",
            needle.type_name()
        ))),
    }
}

fn index(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let bytes = this_bytes(this)?;
    let i = normalize_index(&args[0], bytes.len())?;
    Ok(Value::int(i64::from(bytes[i])))
}

fn length(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::int(i64::try_from(this_bytes(this)?.len()).unwrap_or(i64::MAX)))
}

fn iter(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    this_bytes(this)?;
    Ok(Value::iterator(NativeIter::Bytes {
        source: this.clone(),
        index: 0,
    }))
}

fn hash(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::int(builtin_hash(HASH_BYTES, this_bytes(this)?) as i64))
}

fn to_bool(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(!this_bytes(this)?.is_empty()))
}

fn repr(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::string(bytes_repr(this_bytes(this)?)))
}

fn copy(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(this.clone())
}

/// Decodes as UTF-8.
fn decode(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    match std::str::from_utf8(this_bytes(this)?) {
        Ok(text) => Ok(Value::string(text)),
        Err(err) => Err(ErrorKind::value_error(format!("invalid UTF-8: {err}"))),
    }
}

pub(crate) fn install(t: &Scope) {
    slot(t, Magic::Add, Arity::Exact(1), add);
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
    slot(t, Magic::String, Arity::Exact(0), repr);
    slot(t, Magic::Repr, Arity::Exact(0), repr);
    slot(t, Magic::Copy, Arity::Exact(0), copy);
    method(t, "to_string", Arity::Exact(0), decode);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_escapes_non_printable() {
        assert_eq!(bytes_repr(b"ab'\x00\xff"), "b'ab\\'\\x00\\xff'");
        assert_eq!(bytes_repr(b""), "b''");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = Value::bytes(b"ab".to_vec());
        let b = Value::bytes(b"b".to_vec());
        assert_eq!(compare(BinaryOp::LessThan, &a, &b).unwrap().as_bool(), Some(true));
        assert!(compare(BinaryOp::Equals, &a, &Value::string("ab")).is_err());
    }
}
