//! Attribute lookup and operator dispatch.

use crate::{
    bytecode::{BinaryOp, UnaryOp},
    exception::{ErrorKind, RunError, RunResult},
    magic::Magic,
    run::Vm,
    types::number::{numeric_binary, Num},
    value::Value,
};

impl Vm {
    /// Finds `name` on `value`: its own attributes first, then its type's table.
    ///
    /// Unbound native methods come back bound to `value`.
    pub(crate) fn find_attr(&self, value: &Value, name: &str) -> Option<Value> {
        let found = value
            .get_own(name)
            .or_else(|| self.types.table(value.type_tag()).find(name))?;
        match found.as_native() {
            Some(native) if native.is_method() && native.receiver.is_none() => {
                Some(Value::from_native(native.bind(value.clone())))
            }
            _ => Some(found),
        }
    }

    pub(crate) fn get_attr(&self, value: &Value, name: &str) -> RunResult<Value> {
        self.find_attr(value, name)
            .ok_or_else(|| ErrorKind::attribute_error(&value.type_name(), name))
    }

    pub(crate) fn index(&mut self, container: &Value, index: Value) -> RunResult<Value> {
        match self.call_slot(container, Magic::Index, vec![index])? {
            Some(value) => Ok(value),
            None => Err(ErrorKind::type_error(format!(
                "'{}' object is not subscriptable",
                container.type_name()
            ))),
        }
    }

    pub(crate) fn assign_index(&mut self, container: &Value, index: Value, value: Value) -> RunResult<()> {
        match self.call_slot(container, Magic::Assign, vec![index, value])? {
            Some(_) => Ok(()),
            None => Err(ErrorKind::type_error(format!(
                "'{}' object does not support item assignment",
                container.type_name()
            ))),
        }
    }

    /// Evaluates `left op right`.
    ///
    /// Numbers without attribute overrides take a direct path. Everything else goes
    /// through the left operand's slot, then the right operand's reflected slot. `in`
    /// asks the right operand's `__contains__`.
    pub(crate) fn binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> RunResult<Value> {
        if op == BinaryOp::Is {
            return Ok(Value::bool(left.is(right)));
        }
        if left.attrs().is_none() && right.attrs().is_none() && Num::of(left).is_some() && Num::of(right).is_some() {
            match numeric_binary(op, left, right) {
                Err(RunError::Unsupported) => {}
                other => return other,
            }
        }
        if op == BinaryOp::Contains {
            return self.contains(right, left);
        }
        if let Some(forward) = op.forward() {
            if let Some(slot) = self.find_attr(left, forward.name()) {
                match self.call_operator(slot, vec![right.clone()]) {
                    Err(RunError::Unsupported) => {}
                    other => return other,
                }
            }
        }
        if let Some(reflected) = op.reflected() {
            if let Some(slot) = self.find_attr(right, reflected.name()) {
                match self.call_operator(slot, vec![left.clone()]) {
                    Err(RunError::Unsupported) => {}
                    other => return other,
                }
            }
        }
        match op {
            BinaryOp::Equals => Ok(Value::bool(left.is(right))),
            BinaryOp::NotEquals => Ok(Value::bool(!left.is(right))),
            _ => Err(ErrorKind::binary_type_error(op, &left.type_name(), &right.type_name())),
        }
    }

    fn contains(&mut self, container: &Value, item: &Value) -> RunResult<Value> {
        let Some(slot) = self.find_attr(container, Magic::Contains.name()) else {
            return Err(ErrorKind::type_error(format!(
                "argument of type '{}' is not a container",
                container.type_name()
            )));
        };
        match self.call_operator(slot, vec![item.clone()]) {
            Ok(found) => Ok(Value::bool(self.truthy(&found)?)),
            Err(RunError::Unsupported) => Err(ErrorKind::binary_type_error(
                BinaryOp::Contains,
                &item.type_name(),
                &container.type_name(),
            )),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn unary(&mut self, op: UnaryOp, operand: &Value) -> RunResult<Value> {
        let Some(slot) = op.slot() else {
            return Ok(Value::bool(!self.truthy(operand)?));
        };
        let Some(func) = self.find_attr(operand, slot.name()) else {
            return Err(ErrorKind::unary_type_error(op, &operand.type_name()));
        };
        match self.call_operator(func, Vec::new()) {
            Err(RunError::Unsupported) => Err(ErrorKind::unary_type_error(op, &operand.type_name())),
            other => other,
        }
    }

    /// `a == b` as a Rust bool. Identical values are always equal.
    pub(crate) fn values_equal(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        if a.is(b) {
            return Ok(true);
        }
        let result = self.binary(BinaryOp::Equals, a, b)?;
        self.truthy(&result)
    }

    pub(crate) fn less_than(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        let result = self.binary(BinaryOp::LessThan, a, b)?;
        self.truthy(&result)
    }
}

#[cfg(test)]
mod tests {
    use crate::{io::CollectOutput, run::Vm, value::Value};

    use super::*;

    fn vm() -> Vm {
        Vm::new(std::io::empty(), CollectOutput::new(), std::io::sink())
    }

    #[test]
    fn numbers_mix() {
        let mut vm = vm();
        let sum = vm.binary(BinaryOp::Add, &Value::int(2), &Value::float(0.5)).unwrap();
        assert_eq!(sum.as_float(), Some(2.5));
        let eq = vm.binary(BinaryOp::Equals, &Value::int(1), &Value::bool(true)).unwrap();
        assert_eq!(eq.as_bool(), Some(true));
    }

    #[test]
    fn reflected_dispatch_reaches_strings() {
        let mut vm = vm();
        let repeated = vm.binary(BinaryOp::Mul, &Value::int(3), &Value::string("ab")).unwrap();
        assert_eq!(repeated.as_str(), Some("ababab"));
    }

    #[test]
    fn unsupported_pairs_are_type_errors() {
        let mut vm = vm();
        let err = vm.binary(BinaryOp::Sub, &Value::string("a"), &Value::int(1)).unwrap_err();
        let err = crate::exception::ScriptError::from(err);
        assert_eq!(err.type_name(), "TypeError");
        assert_eq!(err.message(), "unsupported operand type(s) for -: 'String' and 'Int'");
    }

    #[test]
    fn equality_falls_back_to_identity() {
        let mut vm = vm();
        let f = vm.global("print").unwrap();
        assert!(vm.values_equal(&f, &f.clone()).unwrap());
        assert!(!vm.values_equal(&f, &Value::int(1)).unwrap());
    }

    #[test]
    fn missing_attributes() {
        let vm = vm();
        let err = vm.get_attr(&Value::int(1), "nope").unwrap_err();
        assert_eq!(
            crate::exception::ScriptError::from(err).to_string(),
            "AttributeError: 'Int' object has no attribute 'nope'"
        );
        assert!(vm.find_attr(&Value::string("x"), "upper").is_some());
    }
}
