//! Calling a built-in type value: `Int("12")`, `String(3)`, `Array(iterable)`.

use super::{hash, str::string_repr};
use crate::{
    exception::{ErrorKind, RunResult},
    function::Arity,
    run::Vm,
    scope::{Scope, ScopeKind},
    value::{TypeTag, Value},
};

/// Converts `args` into a new value of type `tag`.
pub(crate) fn construct(vm: &mut Vm, tag: TypeTag, args: &[Value]) -> RunResult<Value> {
    let name: &'static str = tag.into();
    if args.len() > 1 {
        return Err(ErrorKind::arity_error(name, Arity::Range(0, 1), args.len()));
    }
    let Some(arg) = args.first() else {
        return empty(vm, tag);
    };
    match tag {
        TypeTag::Int => to_int(arg),
        TypeTag::Float => to_float(arg),
        TypeTag::Bool => Ok(Value::bool(vm.truthy(arg)?)),
        TypeTag::String => Ok(Value::string(vm.display(arg)?)),
        TypeTag::Bytes => to_bytes(vm, arg),
        TypeTag::Array => Ok(Value::array(vm.collect(arg)?)),
        TypeTag::Tuple => Ok(Value::tuple(vm.collect(arg)?)),
        TypeTag::Hash => to_hash(vm, arg),
        TypeTag::Type => Ok(vm.type_of(arg)),
        TypeTag::None | TypeTag::Object => Err(ErrorKind::arity_error(name, Arity::Exact(0), 1)),
        _ => Err(cannot_create(name)),
    }
}

fn cannot_create(name: &str) -> crate::exception::RunError {
    ErrorKind::type_error(format!("cannot create '{name}' instances"))
}

fn empty(vm: &Vm, tag: TypeTag) -> RunResult<Value> {
    Ok(match tag {
        TypeTag::Int => Value::int(0),
        TypeTag::Float => Value::float(0.0),
        TypeTag::Bool => Value::bool(false),
        TypeTag::None => Value::none(),
        TypeTag::String => Value::string(""),
        TypeTag::Bytes => Value::bytes(Vec::new()),
        TypeTag::Array => Value::array(Vec::new()),
        TypeTag::Tuple => Value::tuple(Vec::new()),
        TypeTag::Hash => Value::hash(hash::HashTable::new()),
        TypeTag::Object => Value::object(
            vm.type_value(TypeTag::Object).clone(),
            Scope::new(ScopeKind::Object, None),
        ),
        TypeTag::Type => return Err(ErrorKind::arity_error("Type", Arity::Exact(1), 0)),
        other => return Err(cannot_create(other.into())),
    })
}

fn to_int(arg: &Value) -> RunResult<Value> {
    if let Some(i) = arg.as_int() {
        return Ok(Value::int(i));
    }
    if let Some(b) = arg.as_bool() {
        return Ok(Value::int(i64::from(b)));
    }
    if let Some(f) = arg.as_float() {
        let truncated = f.trunc();
        // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
        if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
            return Err(ErrorKind::OverflowError.err(format!("cannot convert {f} to Int")));
        }
        return Ok(Value::int(truncated as i64));
    }
    if let Some(s) = arg.as_str() {
        let cleaned: String = s.trim().chars().filter(|&c| c != '_').collect();
        return cleaned
            .parse::<i64>()
            .map(Value::int)
            .map_err(|_| ErrorKind::value_error(format!("invalid literal for Int(): {}", string_repr(s))));
    }
    Err(ErrorKind::type_error(format!(
        "Int() argument must be a String or a number, not {}",
        arg.type_name()
    )))
}

fn to_float(arg: &Value) -> RunResult<Value> {
    if let Some(f) = arg.as_float() {
        return Ok(Value::float(f));
    }
    if let Some(i) = arg.as_int() {
        return Ok(Value::float(i as f64));
    }
    if let Some(b) = arg.as_bool() {
        return Ok(Value::float(if b { 1.0 } else { 0.0 }));
    }
    if let Some(s) = arg.as_str() {
        return s
            .trim()
            .parse::<f64>()
            .map(Value::float)
            .map_err(|_| ErrorKind::value_error(format!("could not convert String to Float: {}", string_repr(s))));
    }
    Err(ErrorKind::type_error(format!(
        "Float() argument must be a String or a number, not {}",
        arg.type_name()
    )))
}

fn to_bytes(vm: &mut Vm, arg: &Value) -> RunResult<Value> {
    if let Some(b) = arg.as_bytes() {
        return Ok(Value::bytes(b.to_vec()));
    }
    if let Some(s) = arg.as_str() {
        return Ok(Value::bytes(s.as_bytes().to_vec()));
    }
    let items = vm.collect(arg)?;
    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        let byte = item
            .as_int()
            .ok_or_else(|| ErrorKind::type_error(format!("Bytes() items must be Int, not {}", item.type_name())))?;
        out.push(u8::try_from(byte).map_err(|_| ErrorKind::value_error("Bytes() items must be in range(0, 256)"))?);
    }
    Ok(Value::bytes(out))
}

/// `Hash(pairs)` from an iterable of two-element sequences, or a copy of another hash.
fn to_hash(vm: &mut Vm, arg: &Value) -> RunResult<Value> {
    if let Some(table) = arg.as_hash() {
        return Ok(Value::hash(table.borrow().clone()));
    }
    let mut pairs = Vec::new();
    for item in vm.collect(arg)? {
        let pair = vm.collect(&item)?;
        let [key, value] = <[Value; 2]>::try_from(pair).map_err(|pair| ErrorKind::unpack_error(2, pair.len()))?;
        pairs.push((key, value));
    }
    hash::from_pairs(vm, pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_conversions() {
        assert_eq!(to_int(&Value::string(" 1_000 ")).unwrap().as_int(), Some(1000));
        assert_eq!(to_int(&Value::float(-2.7)).unwrap().as_int(), Some(-2));
        assert_eq!(to_int(&Value::bool(true)).unwrap().as_int(), Some(1));
        assert!(to_int(&Value::string("x")).is_err());
        assert!(to_int(&Value::float(f64::NAN)).is_err());
        assert!(to_int(&Value::float(1e300)).is_err());
    }

    #[test]
    fn float_conversions() {
        assert_eq!(to_float(&Value::string("2.5")).unwrap().as_float(), Some(2.5));
        assert_eq!(to_float(&Value::int(3)).unwrap().as_float(), Some(3.0));
        assert!(to_float(&Value::array(Vec::new())).is_err());
    }
}
