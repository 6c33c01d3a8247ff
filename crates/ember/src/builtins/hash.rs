//! Implementation of the hash() builtin function.

use crate::{exception::RunResult, run::Vm, value::Value};

/// Implementation of the hash() builtin function.
///
/// Mutable values raise `UnhashableError`; objects hash through `__hash__`.
pub fn builtin_hash(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let hash = vm.hash_of(&args[0])?;
    // reinterpret the bits, scripts only see signed ints
    Ok(Value::int(hash as i64))
}
