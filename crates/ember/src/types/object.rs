//! Default slots shared by every value, and the `None` table.
//!
//! The defaults table is the root of every per-type table, so anything not overridden
//! falls back to identity equality, id hashing and a `<...>` rendering.

use super::slot;
use crate::{
    exception::RunResult,
    function::Arity,
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::{Data, Value},
};

/// The default `__string__` rendering of a value with no better representation.
pub(crate) fn default_repr(value: &Value) -> String {
    match value.data() {
        Data::Function(function) => format!("<function {}>", function.name),
        Data::Native(native) => match &native.receiver {
            Some(receiver) => format!("<built-in method {} of {}>", native.name, receiver.type_name()),
            None => format!("<built-in function {}>", native.name),
        },
        Data::Type(_) | Data::Class(_) => format!("<class '{}'>", value.class_name().unwrap_or("?")),
        Data::Generator(state) => format!("<generator {}>", state.name()),
        _ => format!("<{} object>", value.type_name()),
    }
}

fn equals(_: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(this.is(&args[0])))
}

/// Negates whatever `__equals__` the receiver resolves to, so overriding equality alone
/// is enough.
fn not_equals(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let eq = vm.values_equal(this, &args[0])?;
    Ok(Value::bool(!eq))
}

fn hash(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::int(this.id() as i64))
}

fn to_bool(_: &mut Vm, _: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(true))
}

fn to_string(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::string(default_repr(this)))
}

/// `__repr__` defers to `__string__`, which user classes override more often.
fn repr(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::string(vm.display(this)?))
}

fn copy(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(this.clone())
}

pub(crate) fn install(t: &Scope) {
    slot(t, Magic::Equals, Arity::Exact(1), equals);
    slot(t, Magic::NotEquals, Arity::Exact(1), not_equals);
    slot(t, Magic::Hash, Arity::Exact(0), hash);
    slot(t, Magic::Bool, Arity::Exact(0), to_bool);
    slot(t, Magic::String, Arity::Exact(0), to_string);
    slot(t, Magic::Repr, Arity::Exact(0), repr);
    slot(t, Magic::Copy, Arity::Exact(0), copy);
}

fn none_string(_: &mut Vm, _: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::string("None"))
}

fn none_bool(_: &mut Vm, _: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(false))
}

pub(crate) fn install_none(t: &Scope) {
    slot(t, Magic::String, Arity::Exact(0), none_string);
    slot(t, Magic::Repr, Arity::Exact(0), none_string);
    slot(t, Magic::Bool, Arity::Exact(0), none_bool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        class::{ClassBody, ClassInfo},
        scope::ScopeKind,
    };

    #[test]
    fn renderings() {
        let scope = Scope::new(ScopeKind::Module, None);
        let class = Value::class(ClassInfo::new("Point", Vec::new(), ClassBody::Empty, scope.clone()));
        assert_eq!(default_repr(&class), "<class 'Point'>");
        let object = Value::object(class, scope.child(ScopeKind::Object));
        assert_eq!(default_repr(&object), "<Point object>");
        assert_eq!(default_repr(&Value::type_value(crate::value::TypeTag::Int)), "<class 'Int'>");
    }
}
