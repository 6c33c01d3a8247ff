//! Bytecode representation, assembler, compiler and execution engine.
//!
//! # Module Structure
//!
//! - `op` - opcode and operator enums
//! - `code` - the instruction set, its wire encoding and the validated [`Code`] buffer
//! - `builder` - [`CodeBuilder`], which resolves jump labels into a finished buffer
//! - `compiler` - AST to bytecode
//! - `vm` - the dispatch loop, calling convention and control-flow controllers

pub(crate) mod builder;
pub(crate) mod code;
pub(crate) mod compiler;
mod op;
pub(crate) mod vm;

pub use builder::{AssembleError, CodeBuilder, JumpLabel};
pub use code::{Code, CodeError, FunctionDef, Handler, Instruction, TryDef};
pub use op::{BinaryOp, InvalidOpcodeError, Opcode, UnaryOp};
