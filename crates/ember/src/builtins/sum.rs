//! Implementation of the sum() builtin function.

use crate::{
    bytecode::BinaryOp,
    exception::{ErrorKind, RunResult},
    run::Vm,
    value::Value,
};

/// Implementation of the sum() builtin function.
///
/// Sums the items of an iterable from left to right with an optional start value.
/// The default start value is 0. String start values are rejected.
pub fn builtin_sum(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let mut accumulator = match args.get(1) {
        Some(start) if start.as_str().is_some() => {
            return Err(ErrorKind::type_error("sum() can't sum strings, use String.join() instead"));
        }
        Some(start) => start.clone(),
        None => Value::int(0),
    };
    for item in vm.collect(&args[0])? {
        accumulator = vm.binary(BinaryOp::Add, &accumulator, &item)?;
    }
    Ok(accumulator)
}
