//! Implementation of the min() and max() builtin functions.

use crate::{
    exception::{ErrorKind, RunResult},
    run::Vm,
    value::Value,
};

/// Implementation of the min() builtin function.
///
/// Returns the smallest item in an iterable or the smallest of two or more arguments.
/// Supports two forms:
/// - `min(iterable)` - returns smallest item from iterable
/// - `min(arg1, arg2, ...)` - returns smallest of the arguments
pub fn builtin_min(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    builtin_min_max(vm, args, true)
}

/// Implementation of the max() builtin function.
///
/// Same two forms as `min()`.
pub fn builtin_max(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    builtin_min_max(vm, args, false)
}

/// Shared implementation for min() and max().
///
/// Items are ordered with `<`; the first of equal items wins.
fn builtin_min_max(vm: &mut Vm, args: &[Value], is_min: bool) -> RunResult<Value> {
    let func_name = if is_min { "min" } else { "max" };
    let items = match args {
        [iterable] => vm.collect(iterable)?,
        _ => args.to_vec(),
    };
    let mut items = items.into_iter();
    let Some(mut result) = items.next() else {
        return Err(ErrorKind::value_error(format!("{func_name}() iterable argument is empty")));
    };
    for item in items {
        let replace = if is_min {
            vm.less_than(&item, &result)?
        } else {
            vm.less_than(&result, &item)?
        };
        if replace {
            result = item;
        }
    }
    Ok(result)
}
