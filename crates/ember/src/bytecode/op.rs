//! Opcode definitions for the bytecode VM.
//!
//! Bytecode is a flat byte stream: every instruction is one opcode byte followed by its
//! operands. The `Opcode` enum is a pure discriminant with no data; operands are decoded
//! separately by [`super::code`].
//!
//! # Operand Encoding
//!
//! - Integers carry a width tag byte (`0` = zero with no payload, `1` = i8, `2` = i16,
//!   `3` = i32, `4` = i64) followed by a little-endian payload.
//! - Strings and byte strings are an integer length followed by raw bytes.
//! - Sub-blocks (function, class, loop and handler bodies) are an integer length followed
//!   by nested bytecode, so the engine can skip or re-enter them without re-parsing.
//! - Jump operands are signed byte offsets relative to the end of the jump instruction.

use strum::{Display, FromRepr, IntoStaticStr};

use crate::magic::Magic;

/// Opcode discriminant, identifies the instruction type.
///
/// With `#[repr(u8)]`, each opcode is exactly 1 byte. `strum::FromRepr` gives the
/// byte-to-opcode conversion used by the decoder.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display, IntoStaticStr)]
pub enum Opcode {
    // === Register & Stack ===
    /// No operation, emitted when a label lands on the end of a block.
    Nop,
    /// Push the register onto the operand stack.
    Push,
    /// Pop the operand stack into the register.
    Pop,

    // === Literals (write the register) ===
    NewNone,
    NewTrue,
    NewFalse,
    /// Operand: int.
    NewInt,
    /// Operand: 8 raw bytes.
    NewFloat,
    /// Operand: string.
    NewString,
    /// Operand: bytes.
    NewBytes,

    // === Composite construction ===
    /// Pop n values into a new array. Operand: int n.
    NewArray,
    /// Pop n values into a new tuple. Operand: int n.
    NewTuple,
    /// Pop n key/value pairs into a new hash. Operand: int n.
    NewHash,

    // === Names ===
    /// Resolve a name through the scope chain. Operand: string.
    Identifier,
    /// Bind the register to a name in the current scope. Operand: string.
    Assign,
    /// Rebind a name in an enclosing scope. Operand: string.
    AssignNonLocal,

    // === Attributes & Indexing ===
    /// Attribute of the register. Operand: string.
    Selector,
    /// Set an attribute on the popped receiver to the register. Operand: string.
    AssignSelector,
    /// Index the popped container with the register.
    Index,
    /// Pops index and container, stores the register.
    AssignIndex,

    // === Operators ===
    /// Pops the left operand, the register is the right. Operand: int [`BinaryOp`].
    Binary,
    /// Operand: int [`UnaryOp`].
    Unary,
    /// Convert the register to a Bool via its `__bool__` slot.
    ToBool,
    /// Unpack the register into n values on the stack, first value on top. Operand: int n.
    Unpack,

    // === Calls ===
    /// Pops n arguments then the callee. Operand: int n.
    Call,
    /// Return the register from the current frame.
    Return,

    // === Definitions ===
    /// Operands: name, parameter names, body.
    NewFunction,
    /// Like `NewFunction` but the body is a resumable generator body.
    NewGenerator,
    /// Operands: name, base count (popped), body.
    NewClass,

    // === Jumps ===
    /// Operand: int offset.
    Jump,
    /// Jump when the register is falsy. Operand: int offset.
    JumpIfFalse,
    /// Jump when the register is truthy. Operand: int offset.
    JumpIfTrue,

    // === Loops ===
    /// Operands: condition block, body block.
    While,
    /// Operands: condition block, body block. Runs while the condition is false.
    Until,
    /// The register is the iterable. Operands: receiver names, body block.
    For,
    Break,
    Continue,
    Redo,

    // === Exceptions ===
    /// Operands: body, handler list, optional else block, optional finally block.
    Try,
    /// Raise the register.
    Raise,

    // === Scopes ===
    EnterBlock,
    ExitBlock,
    /// Register a block to run when the current frame exits. Operand: block.
    Defer,

    // === Generators ===
    /// Jump to the current resume point of the running generator. Operand: offset list.
    ResumeTable,
    /// Suspend the running generator. Operand: int resume point.
    Yield,
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(InvalidOpcodeError(byte))
    }
}

/// Error returned when attempting to convert an invalid byte to an Opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcodeError(pub u8);

impl std::fmt::Display for InvalidOpcodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid opcode byte: {}", self.0)
    }
}

impl std::error::Error for InvalidOpcodeError {}

/// Binary operators, the operand of `Binary`.
///
/// Display renders the source-level operator symbol, used in error messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "//")]
    FloorDiv,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "**")]
    Pow,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    ShiftLeft,
    #[strum(serialize = ">>")]
    ShiftRight,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    /// `x in y`, dispatched to `y.__contains__(x)`.
    #[strum(serialize = "in")]
    Contains,
    /// Identity, never overridable.
    #[strum(serialize = "is")]
    Is,
}

impl BinaryOp {
    /// The forward slot tried on the left operand.
    #[must_use]
    pub fn forward(self) -> Option<Magic> {
        Some(match self {
            Self::Add => Magic::Add,
            Self::Sub => Magic::Sub,
            Self::Mul => Magic::Mul,
            Self::Div => Magic::Div,
            Self::FloorDiv => Magic::FloorDiv,
            Self::Mod => Magic::Mod,
            Self::Pow => Magic::Pow,
            Self::BitAnd => Magic::BitAnd,
            Self::BitOr => Magic::BitOr,
            Self::BitXor => Magic::BitXor,
            Self::ShiftLeft => Magic::ShiftLeft,
            Self::ShiftRight => Magic::ShiftRight,
            Self::Equals => Magic::Equals,
            Self::NotEquals => Magic::NotEquals,
            Self::LessThan => Magic::LessThan,
            Self::LessOrEqual => Magic::LessOrEqual,
            Self::GreaterThan => Magic::GreaterThan,
            Self::GreaterOrEqual => Magic::GreaterOrEqual,
            Self::Contains => Magic::Contains,
            Self::Is => return None,
        })
    }

    /// The reflected slot tried on the right operand when the forward slot fails.
    #[must_use]
    pub fn reflected(self) -> Option<Magic> {
        Some(match self {
            Self::Add => Magic::RightAdd,
            Self::Sub => Magic::RightSub,
            Self::Mul => Magic::RightMul,
            Self::Div => Magic::RightDiv,
            Self::FloorDiv => Magic::RightFloorDiv,
            Self::Mod => Magic::RightMod,
            Self::Pow => Magic::RightPow,
            Self::BitAnd => Magic::RightBitAnd,
            Self::BitOr => Magic::RightBitOr,
            Self::BitXor => Magic::RightBitXor,
            Self::ShiftLeft => Magic::RightShiftLeft,
            Self::ShiftRight => Magic::RightShiftRight,
            Self::Equals => Magic::RightEquals,
            Self::NotEquals => Magic::RightNotEquals,
            Self::LessThan => Magic::RightLessThan,
            Self::LessOrEqual => Magic::RightLessOrEqual,
            Self::GreaterThan => Magic::RightGreaterThan,
            Self::GreaterOrEqual => Magic::RightGreaterOrEqual,
            Self::Contains | Self::Is => return None,
        })
    }
}

/// Unary operators, the operand of `Unary`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "+")]
    Positive,
    #[strum(serialize = "~")]
    Invert,
    /// Boolean negation, computed from truthiness and not overridable.
    #[strum(serialize = "not")]
    Not,
}

impl UnaryOp {
    #[must_use]
    pub fn slot(self) -> Option<Magic> {
        match self {
            Self::Negate => Some(Magic::Negate),
            Self::Positive => Some(Magic::Positive),
            Self::Invert => Some(Magic::Invert),
            Self::Not => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        // every byte up to the last opcode decodes to itself
        for byte in 0..=Opcode::Yield as u8 {
            let opcode = Opcode::try_from(byte).unwrap();
            assert_eq!(opcode as u8, byte, "opcode {opcode:?} has wrong discriminant");
        }
    }

    #[test]
    fn test_invalid_opcode() {
        let result = Opcode::try_from(Opcode::Yield as u8 + 1);
        assert!(result.is_err());
        assert_eq!(Opcode::try_from(255u8), Err(InvalidOpcodeError(255)));
    }

    #[test]
    fn test_opcode_size() {
        assert_eq!(std::mem::size_of::<Opcode>(), 1);
    }

    #[test]
    fn test_reflected_slots() {
        assert_eq!(BinaryOp::Add.reflected(), Some(Magic::RightAdd));
        assert_eq!(BinaryOp::Contains.reflected(), None);
        assert_eq!(BinaryOp::Is.forward(), None);
        assert_eq!(BinaryOp::FloorDiv.to_string(), "//");
    }
}
