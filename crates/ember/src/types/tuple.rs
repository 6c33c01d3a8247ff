//! Immutable tuples.
//!
//! A tuple hashes by combining its element hashes, so tuples of hashable values can key a
//! `Hash`.

use super::{
    array::{join_reprs, repeat_items, sequences_equal},
    hash::builtin_hash,
    iter::NativeIter,
    method, normalize_index, slot, unsupported,
};
use crate::{
    exception::{ErrorKind, RunResult},
    function::Arity,
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::Value,
};

const HASH_TUPLE: u8 = 6;

fn items(this: &Value) -> RunResult<&[Value]> {
    this.as_tuple()
        .ok_or_else(|| ErrorKind::type_error(format!("expected Tuple, got {}", this.type_name())))
}

fn add(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let Some(other) = args[0].as_tuple() else {
        return unsupported();
    };
    Ok(Value::tuple(items(this)?.iter().chain(other).cloned().collect()))
}

fn mul(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    match repeat_items(items(this)?, &args[0])? {
        Some(out) => Ok(Value::tuple(out)),
        None => unsupported(),
    }
}

fn equals(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let Some(other) = args[0].as_tuple() else {
        return unsupported();
    };
    Ok(Value::bool(sequences_equal(vm, items(this)?, other)?))
}

fn not_equals(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let eq = equals(vm, this, args)?;
    Ok(Value::bool(eq.as_bool() != Some(true)))
}

fn contains(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    for item in items(this)? {
        if vm.values_equal(item, &args[0])? {
            return Ok(Value::bool(true));
        }
    }
    Ok(Value::bool(false))
}

fn index(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let items = items(this)?;
    Ok(items[normalize_index(&args[0], items.len())?].clone())
}

fn length(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::int(i64::try_from(items(this)?.len()).unwrap_or(i64::MAX)))
}

fn iter(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    items(this)?;
    Ok(Value::iterator(NativeIter::Items {
        source: this.clone(),
        index: 0,
    }))
}

fn hash(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let mut hashes = Vec::new();
    for item in items(this)? {
        hashes.push(vm.hash_of(item)?);
    }
    Ok(Value::int(builtin_hash(HASH_TUPLE, hashes) as i64))
}

fn to_bool(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(!items(this)?.is_empty()))
}

/// `(1, 2)`, with a trailing comma for one element: `(1,)`.
fn repr(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let text = vm.guarded_repr(this, "(...)", |vm| {
        let items = items(this)?;
        let inner = join_reprs(vm, items)?;
        Ok(if items.len() == 1 {
            format!("({inner},)")
        } else {
            format!("({inner})")
        })
    })?;
    Ok(Value::string(text))
}

fn copy(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(this.clone())
}

fn index_of(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    for (i, item) in items(this)?.iter().enumerate() {
        if vm.values_equal(item, &args[0])? {
            return Ok(Value::int(i64::try_from(i).unwrap_or(i64::MAX)));
        }
    }
    let repr = vm.repr(&args[0])?;
    Err(ErrorKind::value_error(format!("{repr} is not in Tuple")))
}

fn count(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let mut n = 0;
    for item in items(this)? {
        if vm.values_equal(item, &args[0])? {
            n += 1;
        }
    }
    Ok(Value::int(n))
}

pub(crate) fn install(t: &Scope) {
    slot(t, Magic::Add, Arity::Exact(1), add);
    slot(t, Magic::Mul, Arity::Exact(1), mul);
    slot(t, Magic::RightMul, Arity::Exact(1), mul);
    slot(t, Magic::Equals, Arity::Exact(1), equals);
    slot(t, Magic::NotEquals, Arity::Exact(1), not_equals);
    slot(t, Magic::Contains, Arity::Exact(1), contains);
    slot(t, Magic::Index, Arity::Exact(1), index);
    slot(t, Magic::Length, Arity::Exact(0), length);
    slot(t, Magic::Iter, Arity::Exact(0), iter);
    slot(t, Magic::Hash, Arity::Exact(0), hash);
    slot(t, Magic::Bool, Arity::Exact(0), to_bool);
    slot(t, Magic::String, Arity::Exact(0), repr);
    slot(t, Magic::Repr, Arity::Exact(0), repr);
    slot(t, Magic::Copy, Arity::Exact(0), copy);
    method(t, "index", Arity::Exact(1), index_of);
    method(t, "count", Arity::Exact(1), count);
}
