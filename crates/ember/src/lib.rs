//! Ember: an embeddable scripting language with a bytecode virtual machine.
//!
//! Source text is parsed, compiled to compact bytecode ([`Code`]) and executed by a
//! stack-based [`Vm`] over a dynamically typed, reference-counted object model.
//! Operators, indexing, iteration and calls dispatch through magic-method slots, so user
//! classes integrate with the built-in types.
//!
//! ```
//! use ember::{CollectOutput, Vm};
//!
//! let out = CollectOutput::new();
//! let mut vm = Vm::new(std::io::empty(), out.clone(), std::io::sink());
//! let value = vm
//!     .execute_string("def fib(n)\n  return n if n < 2 else fib(n - 1) + fib(n - 2)\nend\nfib(10)")
//!     .unwrap();
//! assert_eq!(value.as_int(), Some(55));
//! ```
mod builtins;
mod bytecode;
mod class;
mod exception;
mod function;
mod io;
mod magic;
mod parse;
mod resource;
mod run;
mod scope;
mod types;
mod value;

pub use crate::{
    builtins::Builtins,
    bytecode::{
        AssembleError, BinaryOp, Code, CodeBuilder, CodeError, FunctionDef, Handler, Instruction, InvalidOpcodeError,
        JumpLabel, Opcode, TryDef, UnaryOp,
    },
    exception::{ErrorKind, RunError, RunResult, ScriptError, SimpleError},
    function::{Arity, FunctionKind},
    io::CollectOutput,
    magic::Magic,
    resource::{CancelHandle, ResourceLimits, DEFAULT_MAX_CALL_RETRIES, DEFAULT_MAX_DEPTH},
    run::{compile, Vm},
    value::{TypeTag, Value},
};
