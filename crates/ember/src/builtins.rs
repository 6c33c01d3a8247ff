//! Built-in functions bound in the root scope.
//!
//! Each builtin is a variant of [`Builtins`]; the strum-derived name is the name scripts
//! call it by. Small builtins are implemented inline, the rest live in submodules.

mod abs;
mod chr;
mod enumerate;
mod hash;
mod implements;
mod iter;
mod min_max;
mod ord;
mod print;
mod sorted;
mod sum;
mod type_;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    exception::RunResult,
    function::{Arity, FunctionFn, NativeFunction, NativeImpl},
    run::Vm,
    value::Value,
};

/// Every built-in function.
///
/// All variants serialize to snake case (e.g. `HasNext` -> "has_next").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Builtins {
    Print,
    Println,
    Input,
    Len,
    Id,
    Hash,
    Type,
    Implements,
    Repr,
    Range,
    Iter,
    Next,
    HasNext,
    Min,
    Max,
    Sum,
    Abs,
    Callable,
    Dir,
    Sorted,
    Enumerate,
    Chr,
    Ord,
}

impl Builtins {
    /// Accepted argument counts.
    #[must_use]
    pub fn arity(self) -> Arity {
        match self {
            Self::Print | Self::Println => Arity::Any,
            Self::Input => Arity::Range(0, 1),
            Self::Range => Arity::Range(1, 3),
            Self::Min | Self::Max => Arity::AtLeast(1),
            Self::Sum => Arity::Range(1, 2),
            Self::Implements => Arity::Exact(2),
            Self::Len
            | Self::Id
            | Self::Hash
            | Self::Type
            | Self::Repr
            | Self::Iter
            | Self::Next
            | Self::HasNext
            | Self::Abs
            | Self::Callable
            | Self::Dir
            | Self::Sorted
            | Self::Enumerate
            | Self::Chr
            | Self::Ord => Arity::Exact(1),
        }
    }

    fn function(self) -> FunctionFn {
        match self {
            Self::Print | Self::Println => print::builtin_print,
            Self::Input => print::builtin_input,
            Self::Len => builtin_len,
            Self::Id => builtin_id,
            Self::Hash => hash::builtin_hash,
            Self::Type => type_::builtin_type,
            Self::Implements => implements::builtin_implements,
            Self::Repr => builtin_repr,
            Self::Range => iter::builtin_range,
            Self::Iter => iter::builtin_iter,
            Self::Next => iter::builtin_next,
            Self::HasNext => iter::builtin_has_next,
            Self::Min => min_max::builtin_min,
            Self::Max => min_max::builtin_max,
            Self::Sum => sum::builtin_sum,
            Self::Abs => abs::builtin_abs,
            Self::Callable => type_::builtin_callable,
            Self::Dir => type_::builtin_dir,
            Self::Sorted => sorted::builtin_sorted,
            Self::Enumerate => enumerate::builtin_enumerate,
            Self::Chr => chr::builtin_chr,
            Self::Ord => ord::builtin_ord,
        }
    }

    fn native(self) -> NativeFunction {
        NativeFunction::new(self.into(), self.arity(), NativeImpl::Function(self.function()))
    }
}

/// Binds every builtin in the VM's root scope.
pub(crate) fn install(vm: &mut Vm) {
    for builtin in Builtins::iter() {
        vm.root.set(builtin.into(), Value::from_native(builtin.native()));
    }
}

fn builtin_len(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let len = vm.length(&args[0])?;
    Ok(Value::int(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn builtin_id(_: &mut Vm, args: &[Value]) -> RunResult<Value> {
    Ok(Value::int(args[0].id() as i64))
}

fn builtin_repr(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    Ok(Value::string(vm.repr(&args[0])?))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn names_are_snake_case() {
        assert_eq!(Builtins::HasNext.to_string(), "has_next");
        assert_eq!(Builtins::from_str("print"), Ok(Builtins::Print));
        assert!(Builtins::from_str("Print").is_err());
    }

    #[test]
    fn arities() {
        assert!(Builtins::Print.arity().accepts(0));
        assert!(Builtins::Range.arity().accepts(3));
        assert!(!Builtins::Range.arity().accepts(0));
        assert!(!Builtins::Len.arity().accepts(2));
    }
}
