use std::{fmt, rc::Rc};

use crate::{
    bytecode::Code,
    exception::{ErrorKind, RunResult},
    run::Vm,
    scope::Scope,
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Plain,
    /// Calling it returns a generator object instead of running the body.
    Generator,
}

/// A user-defined function.
///
/// Holds the compiled body (a window into the enclosing module's bytecode) and the scope
/// it closes over. Calls must supply exactly one argument per parameter.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Rc<[String]>,
    pub body: Code,
    pub closure: Scope,
    pub kind: FunctionKind,
}

impl Function {
    /// Checks the argument count against the parameter list.
    pub(crate) fn check_arity(&self, given: usize) -> RunResult<()> {
        if given == self.params.len() {
            Ok(())
        } else {
            Err(ErrorKind::arity_error(&self.name, Arity::Exact(self.params.len()), given))
        }
    }
}

/// Accepted argument counts of a native function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// Inclusive bounds.
    Range(usize, usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    #[must_use]
    pub fn accepts(self, given: usize) -> bool {
        match self {
            Self::Exact(n) => given == n,
            Self::Range(lo, hi) => (lo..=hi).contains(&given),
            Self::AtLeast(n) => given >= n,
            Self::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match *self {
            Self::Exact(n) => write!(f, "{n} argument{}", plural(n)),
            Self::Range(lo, hi) => write!(f, "{lo} to {hi} arguments"),
            Self::AtLeast(n) => write!(f, "at least {n} argument{}", plural(n)),
            Self::Any => f.write_str("any number of arguments"),
        }
    }
}

pub(crate) type MethodFn = fn(&mut Vm, &Value, &[Value]) -> RunResult<Value>;
pub(crate) type FunctionFn = fn(&mut Vm, &[Value]) -> RunResult<Value>;
pub(crate) type HostFn = Rc<dyn Fn(&mut Vm, &[Value]) -> RunResult<Value>>;

/// Implementation behind a native callable.
#[derive(Clone)]
pub enum NativeImpl {
    /// A slot or method of a built-in type; needs a receiver.
    Method(MethodFn),
    /// A free builtin such as `print`.
    Function(FunctionFn),
    /// A closure supplied by the embedding host.
    Host(HostFn),
}

/// A built-in or host-provided callable, optionally bound to a receiver.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub arity: Arity,
    pub func: NativeImpl,
    pub receiver: Option<Value>,
}

impl NativeFunction {
    pub fn new(name: &str, arity: Arity, func: NativeImpl) -> Self {
        Self {
            name: name.into(),
            arity,
            func,
            receiver: None,
        }
    }

    /// A copy of this native bound to `receiver`.
    #[must_use]
    pub fn bind(&self, receiver: Value) -> Self {
        Self {
            receiver: Some(receiver),
            ..self.clone()
        }
    }

    pub(crate) fn is_method(&self) -> bool {
        matches!(self.func, NativeImpl::Method(_))
    }

    /// Checks arity and calls the implementation.
    pub(crate) fn call(&self, vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
        if !self.arity.accepts(args.len()) {
            return Err(ErrorKind::arity_error(&self.name, self.arity, args.len()));
        }
        match &self.func {
            NativeImpl::Method(f) => match &self.receiver {
                Some(receiver) => f(vm, receiver, args),
                None => Err(ErrorKind::type_error(format!("method {}() needs a receiver", self.name))),
            },
            NativeImpl::Function(f) => f(vm, args),
            NativeImpl::Host(f) => f(vm, args),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_accepts() {
        assert!(Arity::Exact(2).accepts(2));
        assert!(!Arity::Exact(2).accepts(1));
        assert!(Arity::Range(1, 3).accepts(3));
        assert!(!Arity::Range(1, 3).accepts(0));
        assert!(Arity::AtLeast(1).accepts(9));
        assert!(Arity::Any.accepts(0));
    }

    #[test]
    fn arity_display() {
        assert_eq!(Arity::Exact(1).to_string(), "1 argument");
        assert_eq!(Arity::Exact(0).to_string(), "0 arguments");
        assert_eq!(Arity::Range(1, 2).to_string(), "1 to 2 arguments");
    }
}
