//! Protocol helpers for natives: truthiness, rendering, hashing, length and type tests.
//!
//! Each helper has a fast path for the payloads it can answer directly and otherwise
//! calls the corresponding slot, checking the slot's return type.

use crate::{
    exception::{ErrorKind, RunResult},
    magic::Magic,
    run::Vm,
    types::{object::default_repr, str::string_repr},
    value::{Data, TypeTag, Value},
};

impl Vm {
    /// Truthiness: `__bool__`, then a non-zero `__length__` for objects that define it.
    pub(crate) fn truthy(&mut self, value: &Value) -> RunResult<bool> {
        match value.data() {
            Data::Bool(b) => return Ok(*b),
            Data::None => return Ok(false),
            Data::Int(i) => return Ok(*i != 0),
            Data::Float(f) => return Ok(*f != 0.0),
            Data::Str(s) => return Ok(!s.is_empty()),
            Data::Object(_) => {
                if value.get_own(Magic::Bool.name()).is_none() && value.get_own(Magic::Length.name()).is_some() {
                    return Ok(self.length(value)? != 0);
                }
            }
            _ => {}
        }
        match self.call_slot(value, Magic::Bool, Vec::new())? {
            Some(result) => result
                .as_bool()
                .ok_or_else(|| ErrorKind::slot_return_error(Magic::Bool.name(), "Bool", &result.type_name())),
            None => Ok(true),
        }
    }

    /// The `String(value)` rendering, via `__string__`.
    pub(crate) fn display(&mut self, value: &Value) -> RunResult<String> {
        if let Some(s) = value.as_str() {
            return Ok(s.to_owned());
        }
        match self.call_slot(value, Magic::String, Vec::new())? {
            Some(result) => result.as_str().map(str::to_owned).ok_or_else(|| {
                ErrorKind::slot_return_error(Magic::String.name(), "String", &result.type_name())
            }),
            None => Ok(default_repr(value)),
        }
    }

    /// The `repr(value)` rendering, via `__repr__`.
    pub(crate) fn repr(&mut self, value: &Value) -> RunResult<String> {
        if let Some(s) = value.as_str() {
            return Ok(string_repr(s));
        }
        match self.call_slot(value, Magic::Repr, Vec::new())? {
            Some(result) => result
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| ErrorKind::slot_return_error(Magic::Repr.name(), "String", &result.type_name())),
            None => Ok(default_repr(value)),
        }
    }

    /// Renders a container with `render`, or `placeholder` if it is already being
    /// rendered further up, so self-containing values terminate.
    pub(crate) fn guarded_repr(
        &mut self,
        value: &Value,
        placeholder: &str,
        render: impl FnOnce(&mut Vm) -> RunResult<String>,
    ) -> RunResult<String> {
        let id = value.id();
        if self.repr_guard.contains(&id) {
            return Ok(placeholder.to_owned());
        }
        self.repr_guard.push(id);
        let result = render(self);
        self.repr_guard.retain(|&seen| seen != id);
        result
    }

    pub(crate) fn hash_of(&mut self, value: &Value) -> RunResult<u64> {
        match self.call_slot(value, Magic::Hash, Vec::new())? {
            Some(result) => result
                .as_int()
                .map(|h| h as u64)
                .ok_or_else(|| ErrorKind::slot_return_error(Magic::Hash.name(), "Int", &result.type_name())),
            None => Err(ErrorKind::unhashable(&value.type_name())),
        }
    }

    pub(crate) fn length(&mut self, value: &Value) -> RunResult<usize> {
        let Some(result) = self.call_slot(value, Magic::Length, Vec::new())? else {
            return Err(ErrorKind::type_error(format!(
                "object of type '{}' has no len()",
                value.type_name()
            )));
        };
        let Some(n) = result.as_int() else {
            return Err(ErrorKind::slot_return_error(
                Magic::Length.name(),
                "Int",
                &result.type_name(),
            ));
        };
        usize::try_from(n).map_err(|_| ErrorKind::value_error("__length__ returned a negative value"))
    }

    /// The class of an object, or the built-in type value of anything else.
    pub(crate) fn type_of(&self, value: &Value) -> Value {
        match value.object_class() {
            Some(class) => class.clone(),
            None => self.type_value(value.type_tag()).clone(),
        }
    }

    /// Whether `value` is an instance of `target`: a class, a built-in type, or a tuple of
    /// either. A class value also implements itself and its bases.
    pub(crate) fn implements(&self, value: &Value, target: &Value) -> RunResult<bool> {
        match target.data() {
            Data::Tuple(targets) => {
                for target in targets.iter() {
                    if self.implements(value, target)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Data::Class(_) => {
                let class = value.object_class().unwrap_or(value);
                Ok(class.as_class().is_some_and(|info| info.implements(class, target)))
            }
            Data::Type(TypeTag::Object) => Ok(true),
            Data::Type(tag) => Ok(value.type_tag() == *tag),
            _ => Err(ErrorKind::type_error(format!(
                "implements() arg 2 must be a type, a class or a tuple of them, not {}",
                target.type_name()
            ))),
        }
    }

    pub(crate) fn write_out(&mut self, text: &str) -> RunResult<()> {
        self.io.write_out(text).map_err(ErrorKind::host_error)
    }

    pub(crate) fn read_line(&mut self) -> RunResult<Option<String>> {
        self.io.flush_out().map_err(ErrorKind::host_error)?;
        self.io.read_line().map_err(ErrorKind::host_error)
    }
}

#[cfg(test)]
mod tests {
    use crate::{io::CollectOutput, run::Vm, value::Value};

    fn vm() -> Vm {
        Vm::new(std::io::empty(), CollectOutput::new(), std::io::sink())
    }

    #[test]
    fn truthiness() {
        let mut vm = vm();
        assert!(!vm.truthy(&Value::int(0)).unwrap());
        assert!(!vm.truthy(&Value::string("")).unwrap());
        assert!(!vm.truthy(&Value::array(Vec::new())).unwrap());
        assert!(vm.truthy(&Value::tuple(vec![Value::none()])).unwrap());
        assert!(!vm.truthy(&Value::none()).unwrap());
    }

    #[test]
    fn rendering() {
        let mut vm = vm();
        let array = Value::array(vec![Value::int(1), Value::string("a"), Value::float(2.0)]);
        assert_eq!(vm.display(&array).unwrap(), "[1, 'a', 2.0]");
        assert_eq!(vm.display(&Value::string("a")).unwrap(), "a");
        assert_eq!(vm.repr(&Value::string("a")).unwrap(), "'a'");
    }

    #[test]
    fn self_containing_array_renders() {
        let mut vm = vm();
        let array = Value::array(vec![Value::int(1)]);
        array.as_array().unwrap().borrow_mut().push(array.clone());
        assert_eq!(vm.display(&array).unwrap(), "[1, [...]]");
    }

    #[test]
    fn hashing_requires_immutable_values() {
        let mut vm = vm();
        assert!(vm.hash_of(&Value::tuple(vec![Value::int(1)])).is_ok());
        assert!(vm.hash_of(&Value::array(Vec::new())).is_err());
    }

    #[test]
    fn builtin_types_implement_themselves() {
        let vm = vm();
        let int_type = vm.global("Int").unwrap();
        let object_type = vm.global("Object").unwrap();
        assert!(vm.implements(&Value::int(1), &int_type).unwrap());
        assert!(!vm.implements(&Value::bool(true), &int_type).unwrap());
        assert!(vm.implements(&Value::bool(true), &object_type).unwrap());
        assert!(vm.implements(&Value::int(1), &Value::int(1)).is_err());
    }
}
