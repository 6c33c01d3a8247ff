use std::{borrow::Cow, fmt};

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{bytecode::BinaryOp, value::Value};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Built-in error classes.
///
/// Each kind is installed in the root scope as a class value, so scripts can raise, catch
/// and subclass them. Declaration order has every parent before its children, which the
/// bootstrap relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum ErrorKind {
    /// Root of the hierarchy, matches every error in `except` clauses.
    Error,
    NameError,
    /// Subclass of NameError.
    AttributeError,
    TypeError,
    /// Wrong number of arguments or unpacked values.
    ArityError,
    LookupError,
    /// Subclass of LookupError.
    IndexError,
    /// Subclass of LookupError.
    KeyError,
    /// Subclass of LookupError, raised when hashing an array or hash.
    UnhashableError,
    ArithmeticError,
    /// Subclass of ArithmeticError.
    ZeroDivisionError,
    /// Subclass of ArithmeticError.
    OverflowError,
    ValueError,
    /// A class without `__init__` was instantiated with arguments.
    ConstructionError,
    RecursionError,
    /// Failure reported by the embedding host, e.g. a broken output stream.
    HostError,
}

impl ErrorKind {
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Error => None,
            Self::AttributeError => Some(Self::NameError),
            Self::IndexError | Self::KeyError | Self::UnhashableError => Some(Self::LookupError),
            Self::ZeroDivisionError | Self::OverflowError => Some(Self::ArithmeticError),
            _ => Some(Self::Error),
        }
    }

    /// Whether an error of this kind is caught by a handler for `handler`.
    #[must_use]
    pub fn is_subclass_of(self, handler: Self) -> bool {
        let mut kind = Some(self);
        while let Some(k) = kind {
            if k == handler {
                return true;
            }
            kind = k.parent();
        }
        false
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    #[must_use]
    pub(crate) fn err(self, message: impl Into<String>) -> RunError {
        SimpleError::new(self, message).into()
    }

    #[must_use]
    pub(crate) fn name_error(name: &str) -> RunError {
        Self::NameError.err(format!("name '{name}' is not defined"))
    }

    #[must_use]
    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> RunError {
        Self::AttributeError.err(format!("'{type_name}' object has no attribute '{attr}'"))
    }

    #[must_use]
    pub(crate) fn type_error(message: impl Into<String>) -> RunError {
        Self::TypeError.err(message)
    }

    /// `name() takes 2 arguments but 3 were given`
    #[must_use]
    pub(crate) fn arity_error(name: &str, expected: impl fmt::Display, given: usize) -> RunError {
        let noun = if given == 1 { "was" } else { "were" };
        Self::ArityError.err(format!("{name}() takes {expected} but {given} {noun} given"))
    }

    #[must_use]
    pub(crate) fn unpack_error(expected: usize, got: usize) -> RunError {
        if got < expected {
            Self::ArityError.err(format!("not enough values to unpack (expected {expected}, got {got})"))
        } else {
            Self::ArityError.err(format!("too many values to unpack (expected {expected})"))
        }
    }

    #[must_use]
    pub(crate) fn binary_type_error(op: BinaryOp, left: &str, right: &str) -> RunError {
        Self::TypeError.err(format!("unsupported operand type(s) for {op}: '{left}' and '{right}'"))
    }

    #[must_use]
    pub(crate) fn unary_type_error(op: impl fmt::Display, operand: &str) -> RunError {
        Self::TypeError.err(format!("bad operand type for unary {op}: '{operand}'"))
    }

    #[must_use]
    pub(crate) fn not_callable(type_name: &str) -> RunError {
        Self::TypeError.err(format!("'{type_name}' object is not callable"))
    }

    #[must_use]
    pub(crate) fn not_iterable(type_name: &str) -> RunError {
        Self::TypeError.err(format!("'{type_name}' object is not iterable"))
    }

    /// A slot returned a value of the wrong type, e.g. `__hash__` returning a string.
    #[must_use]
    pub(crate) fn slot_return_error(slot: &str, expected: &str, got: &str) -> RunError {
        Self::TypeError.err(format!("{slot} must return {expected}, not {got}"))
    }

    #[must_use]
    pub(crate) fn index_error(index: i64, len: usize) -> RunError {
        Self::IndexError.err(format!("index {index} out of range for length {len}"))
    }

    /// `key_repr` is the repr of the missing key.
    #[must_use]
    pub(crate) fn key_error(key_repr: String) -> RunError {
        Self::KeyError.err(key_repr)
    }

    #[must_use]
    pub(crate) fn unhashable(type_name: &str) -> RunError {
        Self::UnhashableError.err(format!("unhashable type: '{type_name}'"))
    }

    #[must_use]
    pub(crate) fn zero_division() -> RunError {
        Self::ZeroDivisionError.err("division by zero")
    }

    #[must_use]
    pub(crate) fn overflow() -> RunError {
        Self::OverflowError.err("integer overflow")
    }

    #[must_use]
    pub(crate) fn value_error(message: impl Into<String>) -> RunError {
        Self::ValueError.err(message)
    }

    #[must_use]
    pub(crate) fn construction_error(class_name: &str, given: usize) -> RunError {
        Self::ConstructionError.err(format!(
            "{class_name}() takes no arguments ({given} given) because it defines no __init__"
        ))
    }

    #[must_use]
    pub(crate) fn recursion_error(limit: usize) -> RunError {
        Self::RecursionError.err(format!("maximum recursion depth of {limit} exceeded"))
    }

    #[must_use]
    pub(crate) fn host_error(message: impl fmt::Display) -> RunError {
        Self::HostError.err(message.to_string())
    }
}

/// An error raised by the engine itself, materialized into an error object only if a
/// script handler needs to see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SimpleError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SimpleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Runtime error type.
#[derive(Debug, Clone)]
pub enum RunError {
    /// Catchable error raised by the engine.
    Exc(SimpleError),
    /// Catchable error object raised by a script.
    Value(Value),
    /// Corrupt bytecode or a broken engine invariant. Never caught by scripts.
    Internal(Cow<'static, str>),
    /// A native slot does not handle its operand types; binary dispatch tries the
    /// reflected slot instead. Surfaces as a `TypeError` anywhere else.
    Unsupported,
    /// Execution was cancelled through a [`crate::CancelHandle`]. Never caught by scripts.
    Cancelled,
}

impl RunError {
    #[must_use]
    pub(crate) fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether `try` handlers, `finally` blocks and defers may observe this error.
    #[must_use]
    pub(crate) fn is_catchable(&self) -> bool {
        matches!(self, Self::Exc(_) | Self::Value(_) | Self::Unsupported)
    }
}

impl From<SimpleError> for RunError {
    fn from(err: SimpleError) -> Self {
        Self::Exc(err)
    }
}

/// An error surfaced to the embedding host.
///
/// Holds everything needed to report it without access to the engine: the error class name,
/// the message, and the script error object when there was one.
#[derive(Debug, Clone)]
pub struct ScriptError {
    type_name: String,
    message: String,
    value: Option<Value>,
    incomplete: bool,
}

impl ScriptError {
    #[must_use]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            value: None,
            incomplete: false,
        }
    }

    /// A syntax or compile error. `incomplete` marks an unexpected end of input.
    #[must_use]
    pub(crate) fn syntax(message: impl Into<String>, incomplete: bool) -> Self {
        Self {
            incomplete,
            ..Self::new("SyntaxError", message)
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The script error object, when the error was raised as a value.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Whether compilation failed only because the input ended early.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.type_name)
        } else {
            write!(f, "{}: {}", self.type_name, self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<RunError> for ScriptError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Exc(SimpleError { kind, message }) => Self::new(kind.name(), message),
            RunError::Value(value) => {
                let message = value
                    .get_own("message")
                    .and_then(|m| m.as_str().map(str::to_owned))
                    .unwrap_or_default();
                Self {
                    value: Some(value.clone()),
                    ..Self::new(value.type_name(), message)
                }
            }
            RunError::Internal(message) => Self::new("InternalError", message),
            RunError::Unsupported => Self::new(ErrorKind::TypeError.name(), "unsupported operand type(s)"),
            RunError::Cancelled => Self::new("Cancelled", "execution was cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn hierarchy() {
        assert!(ErrorKind::AttributeError.is_subclass_of(ErrorKind::NameError));
        assert!(ErrorKind::KeyError.is_subclass_of(ErrorKind::Error));
        assert!(!ErrorKind::KeyError.is_subclass_of(ErrorKind::IndexError));
        assert!(ErrorKind::OverflowError.is_subclass_of(ErrorKind::ArithmeticError));
        assert_eq!(ErrorKind::Error.parent(), None);
        assert_eq!(ErrorKind::from_str("HostError"), Ok(ErrorKind::HostError));
    }

    #[test]
    fn parents_are_declared_first() {
        use strum::IntoEnumIterator;
        let order: Vec<ErrorKind> = ErrorKind::iter().collect();
        for (index, kind) in order.iter().enumerate() {
            if let Some(parent) = kind.parent() {
                let parent_index = order.iter().position(|k| *k == parent).unwrap();
                assert!(parent_index < index, "{kind} before {parent}");
            }
        }
    }

    #[test]
    fn messages() {
        let RunError::Exc(err) = ErrorKind::index_error(5, 3) else {
            panic!("expected engine error");
        };
        assert_eq!(err.to_string(), "IndexError: index 5 out of range for length 3");
        let script: ScriptError = ErrorKind::arity_error("f", "2 arguments", 3).into();
        assert_eq!(script.to_string(), "ArityError: f() takes 2 arguments but 3 were given");
        assert!(!script.is_incomplete());
    }

    #[test]
    fn uncatchable() {
        assert!(!RunError::Cancelled.is_catchable());
        assert!(!RunError::internal("bad").is_catchable());
        assert!(ErrorKind::zero_division().is_catchable());
    }
}
