//! Built-in types and their slot tables.
//!
//! Every [`TypeTag`] owns an attribute table populated at VM bootstrap with native slots
//! and methods. All tables resolve through the object-defaults table, so identity
//! equality, hashing and rendering work for every value unless a type overrides them.

pub mod array;
pub mod bytes;
pub mod generator;
pub mod hash;
pub mod iter;
pub mod number;
pub mod object;
pub mod str;
pub mod tuple;
pub mod r#type;

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    exception::{ErrorKind, RunError, RunResult},
    function::{Arity, MethodFn, NativeFunction, NativeImpl},
    magic::Magic,
    scope::{Scope, ScopeKind},
    value::{TypeTag, Value},
};

/// Per-type slot tables and the canonical type values.
pub(crate) struct TypeTables {
    tables: Vec<Scope>,
    types: Vec<Value>,
}

impl TypeTables {
    pub fn new() -> Self {
        let defaults = Scope::new(ScopeKind::Object, None);
        object::install(&defaults);
        let mut tables = Vec::with_capacity(TypeTag::COUNT);
        let mut types = Vec::with_capacity(TypeTag::COUNT);
        for tag in TypeTag::iter() {
            let table = if tag == TypeTag::Object {
                defaults.clone()
            } else {
                defaults.child(ScopeKind::Object)
            };
            match tag {
                TypeTag::Int | TypeTag::Float | TypeTag::Bool => number::install(&table),
                TypeTag::None => object::install_none(&table),
                TypeTag::String => str::install(&table),
                TypeTag::Bytes => bytes::install(&table),
                TypeTag::Array => array::install(&table),
                TypeTag::Tuple => tuple::install(&table),
                TypeTag::Hash => hash::install(&table),
                TypeTag::Iterator => iter::install(&table),
                TypeTag::Generator => generator::install(&table),
                TypeTag::Function | TypeTag::Type | TypeTag::Object | TypeTag::BuiltInFunction => {}
            }
            tables.push(table);
            types.push(Value::type_value(tag));
        }
        Self { tables, types }
    }

    pub fn table(&self, tag: TypeTag) -> &Scope {
        &self.tables[tag as usize]
    }

    /// The value bound to the type's name in the root scope, e.g. `Int`.
    pub fn type_value(&self, tag: TypeTag) -> &Value {
        &self.types[tag as usize]
    }
}

/// Registers a native method under `name`.
pub(crate) fn method(table: &Scope, name: &str, arity: Arity, func: MethodFn) {
    let native = NativeFunction::new(name, arity, NativeImpl::Method(func));
    table.set(name, Value::from_native(native));
}

/// Registers a native magic-method slot.
pub(crate) fn slot(table: &Scope, slot: Magic, arity: Arity, func: MethodFn) {
    method(table, slot.name(), arity, func);
}

/// Normalizes a possibly negative index against `len`.
pub(crate) fn normalize_index(index: &Value, len: usize) -> RunResult<usize> {
    let Some(i) = index.as_int().or_else(|| index.as_bool().map(i64::from)) else {
        return Err(ErrorKind::type_error(format!(
            "indices must be Int, not {}",
            index.type_name()
        )));
    };
    let signed_len = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if i < 0 { i + signed_len } else { i };
    if (0..signed_len).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| ErrorKind::index_error(i, len))
    } else {
        Err(ErrorKind::index_error(i, len))
    }
}

/// Extracts an integer argument, accepting bools.
pub(crate) fn int_arg(value: &Value, what: &str) -> RunResult<i64> {
    value
        .as_int()
        .or_else(|| value.as_bool().map(i64::from))
        .ok_or_else(|| ErrorKind::type_error(format!("{what} must be Int, not {}", value.type_name())))
}

/// Extracts a string argument.
pub(crate) fn str_arg<'a>(value: &'a Value, what: &str) -> RunResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| ErrorKind::type_error(format!("{what} must be String, not {}", value.type_name())))
}

/// Result for a slot that does not handle the given operand types.
pub(crate) fn unsupported<T>() -> RunResult<T> {
    Err(RunError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_chain_to_object_defaults() {
        let tables = TypeTables::new();
        let int_table = tables.table(TypeTag::Int);
        assert!(int_table.get_local(Magic::Add.name()).is_some());
        // inherited from the object defaults
        assert!(int_table.get_local(Magic::Hash.name()).is_some());
        assert!(tables.table(TypeTag::Function).find(Magic::Hash.name()).is_some());
        assert!(tables.table(TypeTag::Object).get_local(Magic::Add.name()).is_none());
    }

    #[test]
    fn index_normalization() {
        assert_eq!(normalize_index(&Value::int(-1), 3).unwrap(), 2);
        assert_eq!(normalize_index(&Value::int(0), 3).unwrap(), 0);
        assert!(normalize_index(&Value::int(3), 3).is_err());
        assert!(normalize_index(&Value::int(-4), 3).is_err());
        assert!(normalize_index(&Value::string("0"), 3).is_err());
    }
}
