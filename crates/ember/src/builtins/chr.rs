//! Implementation of the chr() builtin function.

use crate::{
    exception::{ErrorKind, RunResult},
    run::Vm,
    types::int_arg,
    value::Value,
};

/// Implementation of the chr() builtin function.
///
/// Returns the one-character string for a Unicode code point.
pub fn builtin_chr(_: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let code = int_arg(&args[0], "chr() argument")?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::string(c.to_string()))
        .ok_or_else(|| ErrorKind::value_error(format!("chr() arg not in range(0x110000): {code}")))
}
