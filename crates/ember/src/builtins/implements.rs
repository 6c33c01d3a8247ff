//! Implementation of the implements() builtin function.

use crate::{exception::RunResult, run::Vm, value::Value};

/// Implementation of the implements() builtin function.
///
/// `implements(x, T)` is true when `x` is an instance of `T`, where `T` is a built-in type,
/// a class, or a tuple of those. A class implements itself and its bases.
pub fn builtin_implements(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    vm.implements(&args[0], &args[1]).map(Value::bool)
}
