//! Implementation of the abs() builtin function.

use crate::{
    exception::{ErrorKind, RunResult},
    run::Vm,
    value::{Data, Value},
};

/// Implementation of the abs() builtin function.
///
/// Returns the absolute value of a number. A bool counts as 0 or 1.
pub fn builtin_abs(_: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let value = &args[0];
    match value.data() {
        // i64::MIN has no positive counterpart
        Data::Int(n) => n.checked_abs().map(Value::int).ok_or_else(ErrorKind::overflow),
        Data::Float(f) => Ok(Value::float(f.abs())),
        Data::Bool(b) => Ok(Value::int(i64::from(*b))),
        _ => Err(ErrorKind::type_error(format!(
            "bad operand type for abs(): '{}'",
            value.type_name()
        ))),
    }
}
