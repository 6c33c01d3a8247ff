//! Syntax tree produced by the parser and consumed by the compiler.

use std::fmt;

use crate::bytecode::{BinaryOp, UnaryOp};

/// A 1-based line and column in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct CodeRange {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// An expression with the position of its first token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExprLoc {
    pub position: CodeRange,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(position: CodeRange, expr: Expr) -> Self {
        Self { position, expr }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Name(String),
    Array(Vec<ExprLoc>),
    Tuple(Vec<ExprLoc>),
    Hash(Vec<(ExprLoc, ExprLoc)>),
    Binary {
        op: BinaryOp,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    And(Box<ExprLoc>, Box<ExprLoc>),
    Or(Box<ExprLoc>, Box<ExprLoc>),
    /// `body if test else orelse`
    Conditional {
        test: Box<ExprLoc>,
        body: Box<ExprLoc>,
        orelse: Box<ExprLoc>,
    },
    Call {
        callee: Box<ExprLoc>,
        args: Vec<ExprLoc>,
    },
    Index {
        target: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    Selector {
        target: Box<ExprLoc>,
        name: String,
    },
    Lambda {
        params: Vec<String>,
        body: Box<ExprLoc>,
    },
}

/// A statement with the position of its first token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeLoc {
    pub position: CodeRange,
    pub node: Node,
}

pub(crate) type Block = Vec<NodeLoc>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Expr(ExprLoc),
    /// `t1, t2 = v1, v2`. One value with several targets unpacks it; several values
    /// form a tuple.
    Assign {
        targets: Vec<ExprLoc>,
        values: Vec<ExprLoc>,
    },
    AugAssign {
        target: ExprLoc,
        op: BinaryOp,
        value: ExprLoc,
    },
    If {
        branches: Vec<(ExprLoc, Block)>,
        orelse: Option<Block>,
    },
    While {
        test: ExprLoc,
        body: Block,
        /// `until` runs while the test is false.
        until: bool,
    },
    For {
        receivers: Vec<String>,
        iterable: ExprLoc,
        body: Block,
    },
    FunctionDef {
        name: String,
        params: Vec<String>,
        body: Block,
    },
    ClassDef {
        name: String,
        bases: Vec<ExprLoc>,
        body: Block,
    },
    Try(Try),
    Switch {
        subject: ExprLoc,
        cases: Vec<(Vec<ExprLoc>, Block)>,
        default: Option<Block>,
    },
    Begin(Block),
    Defer(Box<NodeLoc>),
    NonLocal(Vec<String>),
    Return(Option<ExprLoc>),
    Raise(ExprLoc),
    Yield(Option<ExprLoc>),
    Break,
    Continue,
    Redo,
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Try {
    pub body: Block,
    pub handlers: Vec<ExceptHandler>,
    pub orelse: Option<Block>,
    pub finally: Option<Block>,
}

/// One `except` clause; empty `targets` catches everything.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExceptHandler {
    pub targets: Vec<ExprLoc>,
    pub receiver: Option<String>,
    pub body: Block,
}

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Module {
    pub body: Block,
}
