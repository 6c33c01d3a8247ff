//! Implementation of the enumerate() builtin function.

use crate::{exception::RunResult, run::Vm, value::Value};

/// Implementation of the enumerate() builtin function.
///
/// Drains the iterable and returns an array of `(index, item)` tuples.
pub fn builtin_enumerate(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let items = vm.collect(&args[0])?;
    let pairs = items
        .into_iter()
        .zip(0_i64..)
        .map(|(item, index)| Value::tuple(vec![Value::int(index), item]))
        .collect();
    Ok(Value::array(pairs))
}
