//! Mutable arrays.
//!
//! Arrays are shared by reference: assigning an array to a second name aliases it.
//! Element comparison goes through the VM so user `__equals__` slots are honored.

use std::cell::RefCell;

use super::{int_arg, iter::NativeIter, method, normalize_index, slot, str::MAX_REPEAT_LEN, unsupported};
use crate::{
    exception::{ErrorKind, RunResult},
    function::Arity,
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::Value,
};

fn items(this: &Value) -> RunResult<&RefCell<Vec<Value>>> {
    this.as_array()
        .ok_or_else(|| ErrorKind::type_error(format!("expected Array, got {}", this.type_name())))
}

/// Repeats `items` `count` times, shared by arrays and tuples.
pub(crate) fn repeat_items(items: &[Value], count: &Value) -> RunResult<Option<Vec<Value>>> {
    let Some(n) = count.as_int().or_else(|| count.as_bool().map(i64::from)) else {
        return Ok(None);
    };
    let n = usize::try_from(n).unwrap_or(0);
    if items.len().checked_mul(n).map_or(true, |total| total > MAX_REPEAT_LEN) {
        return Err(ErrorKind::OverflowError.err("repeated sequence is too long"));
    }
    let mut out = Vec::with_capacity(items.len() * n);
    for _ in 0..n {
        out.extend_from_slice(items);
    }
    Ok(Some(out))
}

/// Element-wise equality of two sequences.
pub(crate) fn sequences_equal(vm: &mut Vm, a: &[Value], b: &[Value]) -> RunResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !vm.values_equal(x, y)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Renders elements with `repr`, separated by commas.
pub(crate) fn join_reprs(vm: &mut Vm, items: &[Value]) -> RunResult<String> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(vm.repr(item)?);
    }
    Ok(parts.join(", "))
}

fn add(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let Some(other) = args[0].as_array() else {
        return unsupported();
    };
    let mut joined = items(this)?.borrow().clone();
    joined.extend(other.borrow().iter().cloned());
    Ok(Value::array(joined))
}

fn mul(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let current = items(this)?.borrow().clone();
    match repeat_items(&current, &args[0])? {
        Some(out) => Ok(Value::array(out)),
        None => unsupported(),
    }
}

fn equals(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let Some(other) = args[0].as_array().map(|other| other.borrow().clone()) else {
        return unsupported();
    };
    let mine = items(this)?.borrow().clone();
    Ok(Value::bool(sequences_equal(vm, &mine, &other)?))
}

fn not_equals(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let eq = equals(vm, this, args)?;
    Ok(Value::bool(eq.as_bool() != Some(true)))
}

fn contains(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let snapshot = items(this)?.borrow().clone();
    for item in &snapshot {
        if vm.values_equal(item, &args[0])? {
            return Ok(Value::bool(true));
        }
    }
    Ok(Value::bool(false))
}

fn index(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let items = items(this)?.borrow();
    let i = normalize_index(&args[0], items.len())?;
    Ok(items[i].clone())
}

fn assign(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let mut items = items(this)?.borrow_mut();
    let i = normalize_index(&args[0], items.len())?;
    items[i] = args[1].clone();
    Ok(Value::none())
}

fn length(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::int(i64::try_from(items(this)?.borrow().len()).unwrap_or(i64::MAX)))
}

fn iter(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    items(this)?;
    Ok(Value::iterator(NativeIter::Items {
        source: this.clone(),
        index: 0,
    }))
}

fn to_bool(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(!items(this)?.borrow().is_empty()))
}

fn repr(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let text = vm.guarded_repr(this, "[...]", |vm| {
        let snapshot = items(this)?.borrow().clone();
        Ok(format!("[{}]", join_reprs(vm, &snapshot)?))
    })?;
    Ok(Value::string(text))
}

fn unhashable(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Err(ErrorKind::unhashable(&this.type_name()))
}

fn copy(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::array(items(this)?.borrow().clone()))
}

fn append(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    items(this)?.borrow_mut().push(args[0].clone());
    Ok(Value::none())
}

/// `pop()` removes the last element, `pop(i)` the element at `i`.
fn pop(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let mut items = items(this)?.borrow_mut();
    if items.is_empty() {
        return Err(ErrorKind::IndexError.err("pop from empty Array"));
    }
    let i = match args.first() {
        Some(index) => normalize_index(index, items.len())?,
        None => items.len() - 1,
    };
    Ok(items.remove(i))
}

/// `insert(i, x)` clamps `i` into range like slicing would.
fn insert(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let at = int_arg(&args[0], "index")?;
    let mut items = items(this)?.borrow_mut();
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let at = if at < 0 { (at + len).max(0) } else { at.min(len) };
    items.insert(usize::try_from(at).unwrap_or(0), args[1].clone());
    Ok(Value::none())
}

fn position(vm: &mut Vm, this: &Value, needle: &Value) -> RunResult<Option<usize>> {
    let snapshot = items(this)?.borrow().clone();
    for (i, item) in snapshot.iter().enumerate() {
        if vm.values_equal(item, needle)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn remove(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    match position(vm, this, &args[0])? {
        Some(i) => {
            items(this)?.borrow_mut().remove(i);
            Ok(Value::none())
        }
        None => Err(ErrorKind::value_error("Array.remove(x): x not in Array")),
    }
}

fn index_of(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    match position(vm, this, &args[0])? {
        Some(i) => Ok(Value::int(i64::try_from(i).unwrap_or(i64::MAX))),
        None => {
            let repr = vm.repr(&args[0])?;
            Err(ErrorKind::value_error(format!("{repr} is not in Array")))
        }
    }
}

fn clear(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    items(this)?.borrow_mut().clear();
    Ok(Value::none())
}

fn reverse(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    items(this)?.borrow_mut().reverse();
    Ok(Value::none())
}

pub(crate) fn install(t: &Scope) {
    slot(t, Magic::Add, Arity::Exact(1), add);
    slot(t, Magic::Mul, Arity::Exact(1), mul);
    slot(t, Magic::RightMul, Arity::Exact(1), mul);
    slot(t, Magic::Equals, Arity::Exact(1), equals);
    slot(t, Magic::NotEquals, Arity::Exact(1), not_equals);
    slot(t, Magic::Contains, Arity::Exact(1), contains);
    slot(t, Magic::Index, Arity::Exact(1), index);
    slot(t, Magic::Assign, Arity::Exact(2), assign);
    slot(t, Magic::Length, Arity::Exact(0), length);
    slot(t, Magic::Iter, Arity::Exact(0), iter);
    slot(t, Magic::Bool, Arity::Exact(0), to_bool);
    slot(t, Magic::String, Arity::Exact(0), repr);
    slot(t, Magic::Repr, Arity::Exact(0), repr);
    slot(t, Magic::Hash, Arity::Exact(0), unhashable);
    slot(t, Magic::Copy, Arity::Exact(0), copy);
    method(t, "append", Arity::Exact(1), append);
    method(t, "pop", Arity::Range(0, 1), pop);
    method(t, "insert", Arity::Exact(2), insert);
    method(t, "remove", Arity::Exact(1), remove);
    method(t, "index", Arity::Exact(1), index_of);
    method(t, "clear", Arity::Exact(0), clear);
    method(t, "reverse", Arity::Exact(0), reverse);
    method(t, "copy", Arity::Exact(0), copy);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetition() {
        let items = [Value::int(1), Value::int(2)];
        let out = repeat_items(&items, &Value::int(2)).unwrap().unwrap();
        assert_eq!(out.len(), 4);
        assert!(repeat_items(&items, &Value::int(-3)).unwrap().unwrap().is_empty());
        assert!(repeat_items(&items, &Value::string("x")).unwrap().is_none());
    }

    #[test]
    fn huge_repetition_overflows() {
        let items = [Value::int(1)];
        assert!(repeat_items(&items, &Value::int(i64::MAX)).is_err());
    }
}
