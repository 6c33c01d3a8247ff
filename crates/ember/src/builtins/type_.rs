//! Implementations of the type(), callable() and dir() builtin functions.

use crate::{
    exception::RunResult,
    magic::Magic,
    run::Vm,
    value::{Data, Value},
};

/// Implementation of the type() builtin function.
///
/// Returns the class of an object or the built-in type of any other value.
pub fn builtin_type(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    Ok(vm.type_of(&args[0]))
}

/// Implementation of the callable() builtin function.
pub fn builtin_callable(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let value = &args[0];
    let callable = match value.data() {
        Data::Function(_) | Data::Native(_) | Data::Type(_) | Data::Class(_) => true,
        _ => vm.find_attr(value, Magic::Call.name()).is_some(),
    };
    Ok(Value::bool(callable))
}

/// Implementation of the dir() builtin function.
///
/// Returns the names of the value's own attributes in definition order, or of its
/// type's table when it has none.
pub fn builtin_dir(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let value = &args[0];
    let names = match value.attrs() {
        Some(scope) => scope.names(),
        None => vm.types.table(value.type_tag()).names(),
    };
    Ok(Value::array(names.into_iter().map(Value::string).collect()))
}
