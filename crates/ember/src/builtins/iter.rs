//! Implementations of the range(), iter(), next() and has_next() builtin functions.

use crate::{
    exception::{ErrorKind, RunResult},
    magic::Magic,
    run::Vm,
    types::{int_arg, iter::NativeIter},
    value::Value,
};

/// Implementation of the range() builtin function.
///
/// `range(stop)` counts from 0; `range(start, stop[, step])` from `start`. The result is
/// an iterator, not a sequence.
pub fn builtin_range(_: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let (start, stop, step) = match args {
        [stop] => (0, int_arg(stop, "range() stop")?, 1),
        [start, stop] => (int_arg(start, "range() start")?, int_arg(stop, "range() stop")?, 1),
        _ => (
            int_arg(&args[0], "range() start")?,
            int_arg(&args[1], "range() stop")?,
            int_arg(&args[2], "range() step")?,
        ),
    };
    NativeIter::range(start, stop, step).map(Value::iterator)
}

/// Implementation of the iter() builtin function.
pub fn builtin_iter(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    vm.iter_of(&args[0])
}

/// Implementation of the next() builtin function.
///
/// Returns `None` once the iterator is exhausted.
pub fn builtin_next(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    Ok(vm.iter_next(&args[0])?.unwrap_or_else(Value::none))
}

/// Implementation of the has_next() builtin function.
pub fn builtin_has_next(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let iterator = &args[0];
    if let Some(native) = iterator.as_iterator() {
        return Ok(Value::bool(native.borrow().has_next()));
    }
    let has_next = vm.call_slot(iterator, Magic::HasNext, Vec::new())?;
    match has_next {
        Some(value) => vm.truthy(&value).map(Value::bool),
        None => Err(ErrorKind::type_error(format!(
            "'{}' object is not an iterator",
            iterator.type_name()
        ))),
    }
}
