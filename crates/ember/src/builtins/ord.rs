//! Implementation of the ord() builtin function.

use crate::{
    exception::{ErrorKind, RunResult},
    run::Vm,
    value::{Data, Value},
};

/// Implementation of the ord() builtin function.
///
/// Takes a one-character string, or a one-byte `Bytes`, and returns its code.
pub fn builtin_ord(_: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let value = &args[0];
    match value.data() {
        Data::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::int(i64::from(u32::from(c)))),
                _ => Err(ErrorKind::type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))),
            }
        }
        Data::Bytes(b) if b.len() == 1 => Ok(Value::int(i64::from(b[0]))),
        Data::Bytes(b) => Err(ErrorKind::type_error(format!(
            "ord() expected a character, but Bytes of length {} found",
            b.len()
        ))),
        _ => Err(ErrorKind::type_error(format!(
            "ord() expected String of length 1, but {} found",
            value.type_name()
        ))),
    }
}
