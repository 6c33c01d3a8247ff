//! Bytecode buffers, instruction encoding and decoding.
//!
//! A [`Code`] is an immutable window into a shared byte buffer. Sub-blocks (function and
//! class bodies, loop and handler blocks) are windows into the same allocation, so
//! entering a nested body never copies or re-parses anything.
//!
//! [`Instruction`] is generic over its jump target `J` and sub-block `B` representation:
//! the assembler works with `Instruction<Label, Vec<u8>>`, the decoder produces
//! `Instruction<isize, Code>`.

use std::{fmt::Write as _, rc::Rc};

use super::op::{BinaryOp, Opcode, UnaryOp};

/// Width tags for integer operands.
const WIDTH_ZERO: u8 = 0;
const WIDTH_8: u8 = 1;
const WIDTH_16: u8 = 2;
const WIDTH_32: u8 = 3;
const WIDTH_64: u8 = 4;

/// Errors found while decoding or validating a bytecode buffer.
///
/// All of these indicate a corrupt buffer (or a compiler bug), never a user error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("operand at offset {offset} reads past the end of the block")]
    Truncated { offset: usize },
    #[error("invalid opcode byte {byte} at offset {offset}")]
    InvalidOpcode { byte: u8, offset: usize },
    #[error("invalid operand width tag {tag} at offset {offset}")]
    InvalidWidth { tag: u8, offset: usize },
    #[error("invalid {what} operand {value} at offset {offset}")]
    InvalidOperand { what: &'static str, value: i64, offset: usize },
    #[error("invalid UTF-8 in string operand at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("jump at offset {offset} targets {target}, outside block of length {len}")]
    JumpOutOfRange { offset: usize, target: isize, len: usize },
    #[error("jump at offset {offset} targets {target}, which is not an instruction boundary")]
    MisalignedJump { offset: usize, target: usize },
}

/// Function or generator definition operands.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef<B> {
    pub name: String,
    pub params: Vec<String>,
    pub body: B,
}

/// One `except` clause.
///
/// `targets` is a block evaluating to a type or a tuple of types; `None` catches everything.
#[derive(Debug, Clone, PartialEq)]
pub struct Handler<B> {
    pub targets: Option<B>,
    pub receiver: Option<String>,
    pub body: B,
}

/// Try statement operands.
#[derive(Debug, Clone, PartialEq)]
pub struct TryDef<B> {
    pub body: B,
    pub handlers: Vec<Handler<B>>,
    pub else_block: Option<B>,
    pub finally: Option<B>,
}

/// A single instruction with its operands.
///
/// See [`Opcode`] for the meaning of each instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction<J, B> {
    Nop,
    Push,
    Pop,
    NewNone,
    NewTrue,
    NewFalse,
    NewInt(i64),
    NewFloat(f64),
    NewString(String),
    NewBytes(Vec<u8>),
    NewArray(usize),
    NewTuple(usize),
    NewHash(usize),
    Identifier(String),
    Assign(String),
    AssignNonLocal(String),
    Selector(String),
    AssignSelector(String),
    Index,
    AssignIndex,
    Binary(BinaryOp),
    Unary(UnaryOp),
    ToBool,
    Unpack(usize),
    Call(usize),
    Return,
    NewFunction(FunctionDef<B>),
    NewGenerator(FunctionDef<B>),
    NewClass { name: String, bases: usize, body: B },
    Jump(J),
    JumpIfFalse(J),
    JumpIfTrue(J),
    While { cond: B, body: B },
    Until { cond: B, body: B },
    For { receivers: Vec<String>, body: B },
    Break,
    Continue,
    Redo,
    Try(TryDef<B>),
    Raise,
    EnterBlock,
    ExitBlock,
    Defer(B),
    ResumeTable(Vec<J>),
    Yield(usize),
}

impl<J, B> Instruction<J, B> {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Nop => Opcode::Nop,
            Self::Push => Opcode::Push,
            Self::Pop => Opcode::Pop,
            Self::NewNone => Opcode::NewNone,
            Self::NewTrue => Opcode::NewTrue,
            Self::NewFalse => Opcode::NewFalse,
            Self::NewInt(_) => Opcode::NewInt,
            Self::NewFloat(_) => Opcode::NewFloat,
            Self::NewString(_) => Opcode::NewString,
            Self::NewBytes(_) => Opcode::NewBytes,
            Self::NewArray(_) => Opcode::NewArray,
            Self::NewTuple(_) => Opcode::NewTuple,
            Self::NewHash(_) => Opcode::NewHash,
            Self::Identifier(_) => Opcode::Identifier,
            Self::Assign(_) => Opcode::Assign,
            Self::AssignNonLocal(_) => Opcode::AssignNonLocal,
            Self::Selector(_) => Opcode::Selector,
            Self::AssignSelector(_) => Opcode::AssignSelector,
            Self::Index => Opcode::Index,
            Self::AssignIndex => Opcode::AssignIndex,
            Self::Binary(_) => Opcode::Binary,
            Self::Unary(_) => Opcode::Unary,
            Self::ToBool => Opcode::ToBool,
            Self::Unpack(_) => Opcode::Unpack,
            Self::Call(_) => Opcode::Call,
            Self::Return => Opcode::Return,
            Self::NewFunction(_) => Opcode::NewFunction,
            Self::NewGenerator(_) => Opcode::NewGenerator,
            Self::NewClass { .. } => Opcode::NewClass,
            Self::Jump(_) => Opcode::Jump,
            Self::JumpIfFalse(_) => Opcode::JumpIfFalse,
            Self::JumpIfTrue(_) => Opcode::JumpIfTrue,
            Self::While { .. } => Opcode::While,
            Self::Until { .. } => Opcode::Until,
            Self::For { .. } => Opcode::For,
            Self::Break => Opcode::Break,
            Self::Continue => Opcode::Continue,
            Self::Redo => Opcode::Redo,
            Self::Try(_) => Opcode::Try,
            Self::Raise => Opcode::Raise,
            Self::EnterBlock => Opcode::EnterBlock,
            Self::ExitBlock => Opcode::ExitBlock,
            Self::Defer(_) => Opcode::Defer,
            Self::ResumeTable(_) => Opcode::ResumeTable,
            Self::Yield(_) => Opcode::Yield,
        }
    }

    /// Jump targets in encoding order.
    pub fn targets(&self) -> Vec<&J> {
        match self {
            Self::Jump(target) | Self::JumpIfFalse(target) | Self::JumpIfTrue(target) => vec![target],
            Self::ResumeTable(targets) => targets.iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl<J, B: AsRef<[u8]>> Instruction<J, B> {
    /// Appends the encoded instruction to `out`.
    ///
    /// Jump operands are taken positionally from `offsets`, in the order of [`Self::targets`],
    /// so the assembler can encode with provisional offsets while it relaxes widths.
    pub(crate) fn encode(&self, out: &mut Vec<u8>, offsets: &[i64]) {
        out.push(self.opcode() as u8);
        match self {
            Self::Nop
            | Self::Push
            | Self::Pop
            | Self::NewNone
            | Self::NewTrue
            | Self::NewFalse
            | Self::Index
            | Self::AssignIndex
            | Self::ToBool
            | Self::Return
            | Self::Break
            | Self::Continue
            | Self::Redo
            | Self::Raise
            | Self::EnterBlock
            | Self::ExitBlock => {}
            Self::NewInt(value) => write_int(out, *value),
            Self::NewFloat(value) => out.extend_from_slice(&value.to_le_bytes()),
            Self::NewString(text)
            | Self::Identifier(text)
            | Self::Assign(text)
            | Self::AssignNonLocal(text)
            | Self::Selector(text)
            | Self::AssignSelector(text) => write_bytes(out, text.as_bytes()),
            Self::NewBytes(bytes) => write_bytes(out, bytes),
            Self::NewArray(n) | Self::NewTuple(n) | Self::NewHash(n) | Self::Unpack(n) | Self::Call(n) => {
                write_usize(out, *n);
            }
            Self::Yield(point) => write_usize(out, *point),
            Self::Binary(op) => write_int(out, i64::from(*op as u8)),
            Self::Unary(op) => write_int(out, i64::from(*op as u8)),
            Self::NewFunction(def) | Self::NewGenerator(def) => {
                write_bytes(out, def.name.as_bytes());
                write_names(out, &def.params);
                write_bytes(out, def.body.as_ref());
            }
            Self::NewClass { name, bases, body } => {
                write_bytes(out, name.as_bytes());
                write_usize(out, *bases);
                write_bytes(out, body.as_ref());
            }
            Self::Jump(_) | Self::JumpIfFalse(_) | Self::JumpIfTrue(_) => write_int(out, offsets[0]),
            Self::While { cond, body } | Self::Until { cond, body } => {
                write_bytes(out, cond.as_ref());
                write_bytes(out, body.as_ref());
            }
            Self::For { receivers, body } => {
                write_names(out, receivers);
                write_bytes(out, body.as_ref());
            }
            Self::Try(def) => {
                write_bytes(out, def.body.as_ref());
                write_usize(out, def.handlers.len());
                for handler in &def.handlers {
                    write_optional_bytes(out, handler.targets.as_ref().map(AsRef::as_ref));
                    write_optional_bytes(out, handler.receiver.as_ref().map(String::as_bytes));
                    write_bytes(out, handler.body.as_ref());
                }
                write_optional_bytes(out, def.else_block.as_ref().map(AsRef::as_ref));
                write_optional_bytes(out, def.finally.as_ref().map(AsRef::as_ref));
            }
            Self::Defer(body) => write_bytes(out, body.as_ref()),
            Self::ResumeTable(targets) => {
                write_usize(out, targets.len());
                for offset in &offsets[..targets.len()] {
                    write_int(out, *offset);
                }
            }
        }
    }
}

/// Writes an integer operand using the narrowest width tag that holds it.
pub(crate) fn write_int(out: &mut Vec<u8>, value: i64) {
    if value == 0 {
        out.push(WIDTH_ZERO);
    } else if let Ok(v) = i8::try_from(value) {
        out.push(WIDTH_8);
        out.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = i16::try_from(value) {
        out.push(WIDTH_16);
        out.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = i32::try_from(value) {
        out.push(WIDTH_32);
        out.extend_from_slice(&v.to_le_bytes());
    } else {
        out.push(WIDTH_64);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn write_usize(out: &mut Vec<u8>, value: usize) {
    write_int(out, i64::try_from(value).unwrap_or(i64::MAX));
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_usize(out, bytes.len());
    out.extend_from_slice(bytes);
}

fn write_optional_bytes(out: &mut Vec<u8>, bytes: Option<&[u8]>) {
    match bytes {
        Some(bytes) => {
            write_int(out, 1);
            write_bytes(out, bytes);
        }
        None => write_int(out, 0),
    }
}

fn write_names(out: &mut Vec<u8>, names: &[String]) {
    write_usize(out, names.len());
    for name in names {
        write_bytes(out, name.as_bytes());
    }
}

/// An instruction as decoded from a [`Code`] buffer.
pub type Decoded = Instruction<isize, Code>;

/// An immutable bytecode block: a window `[start, end)` into a shared buffer.
#[derive(Clone)]
pub struct Code {
    buf: Rc<[u8]>,
    start: usize,
    end: usize,
}

impl Code {
    /// Wraps and validates a complete bytecode buffer.
    ///
    /// # Errors
    /// Returns a [`CodeError`] if any instruction (including those in nested blocks) is
    /// truncated, malformed or jumps outside its block.
    pub fn new(bytes: Vec<u8>) -> Result<Self, CodeError> {
        let code = Self::from_trusted(bytes);
        code.validate()?;
        Ok(code)
    }

    /// Wraps a buffer produced by the assembler without validating it.
    ///
    /// A bad buffer that slips past validation still decodes to an internal error, never a panic.
    pub(crate) fn from_trusted(bytes: Vec<u8>) -> Self {
        let end = bytes.len();
        Self {
            buf: bytes.into(),
            start: 0,
            end,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn sub(&self, start: usize, len: usize) -> Self {
        Self {
            buf: Rc::clone(&self.buf),
            start: self.start + start,
            end: self.start + start + len,
        }
    }

    /// Decodes the instruction at `pos`, returning it and the offset of the next one.
    pub(crate) fn decode_at(&self, pos: usize) -> Result<(Decoded, usize), CodeError> {
        let mut reader = Reader { code: self, pos };
        let instr = reader.instruction()?;
        Ok((instr, reader.pos))
    }

    /// Checks every instruction of this block and of all nested blocks.
    ///
    /// # Errors
    /// See [`CodeError`].
    pub fn validate(&self) -> Result<(), CodeError> {
        let len = self.len();
        let mut boundaries = vec![false; len];
        let mut jumps: Vec<(usize, isize)> = Vec::new();
        let mut pos = 0;
        while pos < len {
            boundaries[pos] = true;
            let (instr, next) = self.decode_at(pos)?;
            for offset in instr.targets() {
                let target = isize::try_from(next).unwrap_or(isize::MAX).saturating_add(*offset);
                jumps.push((pos, target));
            }
            for block in instr.blocks() {
                block.validate()?;
            }
            pos = next;
        }
        for (offset, target) in jumps {
            let Ok(target_pos) = usize::try_from(target) else {
                return Err(CodeError::JumpOutOfRange { offset, target, len });
            };
            if target_pos >= len {
                return Err(CodeError::JumpOutOfRange { offset, target, len });
            }
            if !boundaries[target_pos] {
                return Err(CodeError::MisalignedJump {
                    offset,
                    target: target_pos,
                });
            }
        }
        Ok(())
    }

    /// Renders a human-readable listing of this block and its nested blocks.
    #[must_use]
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out, 0);
        out
    }

    fn disassemble_into(&self, out: &mut String, depth: usize) {
        let indent = "    ".repeat(depth);
        let mut pos = 0;
        while pos < self.len() {
            let (instr, next) = match self.decode_at(pos) {
                Ok(decoded) => decoded,
                Err(err) => {
                    let _ = writeln!(out, "{indent}{pos:04} <{err}>");
                    return;
                }
            };
            let _ = write!(out, "{indent}{pos:04} {}", instr.opcode());
            match &instr {
                Instruction::NewInt(v) => {
                    let _ = write!(out, " {v}");
                }
                Instruction::NewFloat(v) => {
                    let _ = write!(out, " {v:?}");
                }
                Instruction::NewString(s)
                | Instruction::Identifier(s)
                | Instruction::Assign(s)
                | Instruction::AssignNonLocal(s)
                | Instruction::Selector(s)
                | Instruction::AssignSelector(s) => {
                    let _ = write!(out, " {s:?}");
                }
                Instruction::NewBytes(b) => {
                    let _ = write!(out, " {} bytes", b.len());
                }
                Instruction::NewArray(n)
                | Instruction::NewTuple(n)
                | Instruction::NewHash(n)
                | Instruction::Unpack(n)
                | Instruction::Call(n)
                | Instruction::Yield(n) => {
                    let _ = write!(out, " {n}");
                }
                Instruction::Binary(op) => {
                    let _ = write!(out, " {op}");
                }
                Instruction::Unary(op) => {
                    let _ = write!(out, " {op}");
                }
                Instruction::NewFunction(def) | Instruction::NewGenerator(def) => {
                    let _ = write!(out, " {}({})", def.name, def.params.join(", "));
                }
                Instruction::NewClass { name, bases, .. } => {
                    let _ = write!(out, " {name} bases={bases}");
                }
                Instruction::For { receivers, .. } => {
                    let _ = write!(out, " {}", receivers.join(", "));
                }
                Instruction::Jump(off) | Instruction::JumpIfFalse(off) | Instruction::JumpIfTrue(off) => {
                    let _ = write!(out, " -> {}", next as isize + off);
                }
                Instruction::ResumeTable(offsets) => {
                    let targets: Vec<String> = offsets.iter().map(|off| (next as isize + off).to_string()).collect();
                    let _ = write!(out, " [{}]", targets.join(", "));
                }
                _ => {}
            }
            out.push('\n');
            for block in instr.blocks() {
                block.disassemble_into(out, depth + 1);
            }
            pos = next;
        }
    }
}

impl std::fmt::Debug for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Code({} bytes)", self.len())
    }
}

impl PartialEq for Code {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl AsRef<[u8]> for Code {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Decoded {
    /// Nested blocks carried by this instruction, in encoding order.
    fn blocks(&self) -> Vec<&Code> {
        match self {
            Self::NewFunction(def) | Self::NewGenerator(def) => vec![&def.body],
            Self::NewClass { body, .. } | Self::For { body, .. } | Self::Defer(body) => vec![body],
            Self::While { cond, body } | Self::Until { cond, body } => vec![cond, body],
            Self::Try(def) => {
                let mut blocks = vec![&def.body];
                for handler in &def.handlers {
                    blocks.extend(handler.targets.as_ref());
                    blocks.push(&handler.body);
                }
                blocks.extend(def.else_block.as_ref());
                blocks.extend(def.finally.as_ref());
                blocks
            }
            _ => Vec::new(),
        }
    }
}

/// Cursor used to decode one instruction.
struct Reader<'a> {
    code: &'a Code,
    pos: usize,
}

impl Reader<'_> {
    fn bytes(&self) -> &[u8] {
        self.code.as_bytes()
    }

    fn take(&mut self, n: usize) -> Result<&[u8], CodeError> {
        let offset = self.pos;
        let end = offset.checked_add(n).ok_or(CodeError::Truncated { offset })?;
        if end > self.code.len() {
            return Err(CodeError::Truncated { offset });
        }
        self.pos = end;
        Ok(&self.code.as_bytes()[offset..end])
    }

    fn byte(&mut self) -> Result<u8, CodeError> {
        Ok(self.take(1)?[0])
    }

    fn int(&mut self) -> Result<i64, CodeError> {
        let offset = self.pos;
        let tag = self.byte()?;
        let value = match tag {
            WIDTH_ZERO => 0,
            WIDTH_8 => i64::from(i8::from_le_bytes([self.byte()?])),
            WIDTH_16 => {
                let raw = self.take(2)?;
                i64::from(i16::from_le_bytes([raw[0], raw[1]]))
            }
            WIDTH_32 => {
                let raw = self.take(4)?;
                i64::from(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            WIDTH_64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(self.take(8)?);
                i64::from_le_bytes(raw)
            }
            tag => return Err(CodeError::InvalidWidth { tag, offset }),
        };
        Ok(value)
    }

    fn count(&mut self, what: &'static str) -> Result<usize, CodeError> {
        let offset = self.pos;
        let value = self.int()?;
        usize::try_from(value).map_err(|_| CodeError::InvalidOperand { what, value, offset })
    }

    fn offset(&mut self) -> Result<isize, CodeError> {
        let offset = self.pos;
        let value = self.int()?;
        isize::try_from(value).map_err(|_| CodeError::InvalidOperand {
            what: "jump",
            value,
            offset,
        })
    }

    fn raw(&mut self) -> Result<Vec<u8>, CodeError> {
        let len = self.count("length")?;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> Result<String, CodeError> {
        let offset = self.pos;
        String::from_utf8(self.raw()?).map_err(|_| CodeError::InvalidUtf8 { offset })
    }

    fn optional_string(&mut self) -> Result<Option<String>, CodeError> {
        if self.flag()? {
            self.string().map(Some)
        } else {
            Ok(None)
        }
    }

    fn flag(&mut self) -> Result<bool, CodeError> {
        let offset = self.pos;
        match self.int()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(CodeError::InvalidOperand {
                what: "flag",
                value,
                offset,
            }),
        }
    }

    fn names(&mut self) -> Result<Vec<String>, CodeError> {
        let count = self.count("name count")?;
        (0..count).map(|_| self.string()).collect()
    }

    fn block(&mut self) -> Result<Code, CodeError> {
        let len = self.count("block length")?;
        let start = self.pos;
        self.take(len)?;
        Ok(self.code.sub(start, len))
    }

    fn optional_block(&mut self) -> Result<Option<Code>, CodeError> {
        if self.flag()? {
            self.block().map(Some)
        } else {
            Ok(None)
        }
    }

    fn function(&mut self) -> Result<FunctionDef<Code>, CodeError> {
        Ok(FunctionDef {
            name: self.string()?,
            params: self.names()?,
            body: self.block()?,
        })
    }

    fn instruction(&mut self) -> Result<Decoded, CodeError> {
        let offset = self.pos;
        if offset >= self.bytes().len() {
            return Err(CodeError::Truncated { offset });
        }
        let byte = self.byte()?;
        let opcode = Opcode::try_from(byte).map_err(|_| CodeError::InvalidOpcode { byte, offset })?;
        let instr = match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::Push => Instruction::Push,
            Opcode::Pop => Instruction::Pop,
            Opcode::NewNone => Instruction::NewNone,
            Opcode::NewTrue => Instruction::NewTrue,
            Opcode::NewFalse => Instruction::NewFalse,
            Opcode::NewInt => Instruction::NewInt(self.int()?),
            Opcode::NewFloat => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(self.take(8)?);
                Instruction::NewFloat(f64::from_le_bytes(raw))
            }
            Opcode::NewString => Instruction::NewString(self.string()?),
            Opcode::NewBytes => Instruction::NewBytes(self.raw()?),
            Opcode::NewArray => Instruction::NewArray(self.count("array size")?),
            Opcode::NewTuple => Instruction::NewTuple(self.count("tuple size")?),
            Opcode::NewHash => Instruction::NewHash(self.count("hash size")?),
            Opcode::Identifier => Instruction::Identifier(self.string()?),
            Opcode::Assign => Instruction::Assign(self.string()?),
            Opcode::AssignNonLocal => Instruction::AssignNonLocal(self.string()?),
            Opcode::Selector => Instruction::Selector(self.string()?),
            Opcode::AssignSelector => Instruction::AssignSelector(self.string()?),
            Opcode::Index => Instruction::Index,
            Opcode::AssignIndex => Instruction::AssignIndex,
            Opcode::Binary => {
                let at = self.pos;
                let value = self.int()?;
                let op = u8::try_from(value).ok().and_then(BinaryOp::from_repr);
                Instruction::Binary(op.ok_or(CodeError::InvalidOperand {
                    what: "binary operator",
                    value,
                    offset: at,
                })?)
            }
            Opcode::Unary => {
                let at = self.pos;
                let value = self.int()?;
                let op = u8::try_from(value).ok().and_then(UnaryOp::from_repr);
                Instruction::Unary(op.ok_or(CodeError::InvalidOperand {
                    what: "unary operator",
                    value,
                    offset: at,
                })?)
            }
            Opcode::ToBool => Instruction::ToBool,
            Opcode::Unpack => Instruction::Unpack(self.count("unpack count")?),
            Opcode::Call => Instruction::Call(self.count("argument count")?),
            Opcode::Return => Instruction::Return,
            Opcode::NewFunction => Instruction::NewFunction(self.function()?),
            Opcode::NewGenerator => Instruction::NewGenerator(self.function()?),
            Opcode::NewClass => Instruction::NewClass {
                name: self.string()?,
                bases: self.count("base count")?,
                body: self.block()?,
            },
            Opcode::Jump => Instruction::Jump(self.offset()?),
            Opcode::JumpIfFalse => Instruction::JumpIfFalse(self.offset()?),
            Opcode::JumpIfTrue => Instruction::JumpIfTrue(self.offset()?),
            Opcode::While => Instruction::While {
                cond: self.block()?,
                body: self.block()?,
            },
            Opcode::Until => Instruction::Until {
                cond: self.block()?,
                body: self.block()?,
            },
            Opcode::For => Instruction::For {
                receivers: self.names()?,
                body: self.block()?,
            },
            Opcode::Break => Instruction::Break,
            Opcode::Continue => Instruction::Continue,
            Opcode::Redo => Instruction::Redo,
            Opcode::Try => {
                let body = self.block()?;
                let count = self.count("handler count")?;
                let mut handlers = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    handlers.push(Handler {
                        targets: self.optional_block()?,
                        receiver: self.optional_string()?,
                        body: self.block()?,
                    });
                }
                Instruction::Try(TryDef {
                    body,
                    handlers,
                    else_block: self.optional_block()?,
                    finally: self.optional_block()?,
                })
            }
            Opcode::Raise => Instruction::Raise,
            Opcode::EnterBlock => Instruction::EnterBlock,
            Opcode::ExitBlock => Instruction::ExitBlock,
            Opcode::Defer => Instruction::Defer(self.block()?),
            Opcode::ResumeTable => {
                let count = self.count("resume table size")?;
                let mut offsets = Vec::with_capacity(count.min(256));
                for _ in 0..count {
                    offsets.push(self.offset()?);
                }
                Instruction::ResumeTable(offsets)
            }
            Opcode::Yield => Instruction::Yield(self.count("resume point")?),
        };
        Ok(instr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(instr: &Instruction<(), Vec<u8>>, offsets: &[i64]) -> Vec<u8> {
        let mut out = Vec::new();
        instr.encode(&mut out, offsets);
        out
    }

    #[test]
    fn int_widths_are_minimal() {
        let cases: [(i64, usize); 6] = [(0, 1), (5, 2), (-100, 2), (300, 3), (70_000, 5), (i64::MAX, 9)];
        for (value, len) in cases {
            let mut out = Vec::new();
            write_int(&mut out, value);
            assert_eq!(out.len(), len, "width of {value}");
            let code = Code::from_trusted([vec![Opcode::NewInt as u8], out].concat());
            let (instr, _) = code.decode_at(0).unwrap();
            assert_eq!(instr, Instruction::NewInt(value));
        }
    }

    #[test]
    fn truncated_operand_is_rejected() {
        let mut bytes = encode(&Instruction::NewString("hello".to_owned()), &[]);
        bytes.pop();
        assert_eq!(Code::new(bytes).unwrap_err(), CodeError::Truncated { offset: 2 });
    }

    #[test]
    fn bad_width_tag_is_rejected() {
        let err = Code::new(vec![Opcode::NewInt as u8, 9]).unwrap_err();
        assert_eq!(err, CodeError::InvalidWidth { tag: 9, offset: 1 });
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let err = Code::new(vec![Opcode::Push as u8, 250]).unwrap_err();
        assert_eq!(err, CodeError::InvalidOpcode { byte: 250, offset: 1 });
    }

    #[test]
    fn jump_outside_block_is_rejected() {
        // a jump to exactly the block length is out of range
        let bytes = encode(&Instruction::Jump(()), &[0]);
        let err = Code::new(bytes).unwrap_err();
        assert_eq!(
            err,
            CodeError::JumpOutOfRange {
                offset: 0,
                target: 2,
                len: 2
            }
        );
        let mut bytes = encode(&Instruction::Jump(()), &[-3]);
        bytes.extend(encode(&Instruction::Nop, &[]));
        assert!(matches!(Code::new(bytes), Err(CodeError::JumpOutOfRange { .. })));
    }

    #[test]
    fn jump_into_operand_is_rejected() {
        let mut bytes = encode(&Instruction::Jump(()), &[1]);
        bytes.extend(encode(&Instruction::NewInt(7), &[]));
        assert_eq!(
            Code::new(bytes).unwrap_err(),
            CodeError::MisalignedJump { offset: 0, target: 4 }
        );
    }

    #[test]
    fn nested_blocks_are_validated() {
        let inner = vec![Opcode::NewInt as u8];
        let bytes = encode(
            &Instruction::Defer(inner),
            &[],
        );
        assert!(matches!(Code::new(bytes), Err(CodeError::Truncated { .. })));
    }

    #[test]
    fn sub_blocks_share_the_buffer() {
        let body = encode(&Instruction::NewTrue, &[]);
        let bytes = encode(
            &Instruction::While {
                cond: body.clone(),
                body: body.clone(),
            },
            &[],
        );
        let code = Code::new(bytes).unwrap();
        let (instr, next) = code.decode_at(0).unwrap();
        assert_eq!(next, code.len());
        let Instruction::While { cond, body: loop_body } = instr else {
            panic!("expected while");
        };
        assert_eq!(cond.as_bytes(), body.as_slice());
        assert_eq!(loop_body.as_bytes(), body.as_slice());
    }

    #[test]
    fn disassembly_lists_nested_blocks() {
        let body = encode(&Instruction::Identifier("x".to_owned()), &[]);
        let bytes = encode(
            &Instruction::NewFunction(FunctionDef {
                name: "f".to_owned(),
                params: vec!["x".to_owned()],
                body,
            }),
            &[],
        );
        let listing = Code::new(bytes).unwrap().disassemble();
        assert!(listing.contains("NewFunction f(x)"), "{listing}");
        assert!(listing.contains("    0000 Identifier \"x\""), "{listing}");
    }
}
