//! Front end: source text to syntax tree.
//!
//! The language is line oriented. Statements end at a newline or `;`, compound statements
//! close with `end`, and newlines inside brackets are ignored.

pub(crate) mod ast;
mod lexer;
mod parser;

use std::borrow::Cow;

use ast::CodeRange;

use crate::exception::ScriptError;

/// A syntax or compile error with its source position.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParseError {
    pub message: Cow<'static, str>,
    pub position: CodeRange,
    /// The input ended where more was expected.
    pub incomplete: bool,
}

impl ParseError {
    pub fn new(message: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self {
            message: message.into(),
            position,
            incomplete: false,
        }
    }

    pub fn incomplete(message: impl Into<Cow<'static, str>>, position: CodeRange) -> Self {
        Self {
            incomplete: true,
            ..Self::new(message, position)
        }
    }
}

impl From<ParseError> for ScriptError {
    fn from(err: ParseError) -> Self {
        ScriptError::syntax(format!("{} at {}", err.message, err.position), err.incomplete)
    }
}

/// Parses a whole source file.
pub(crate) fn parse(source: &str) -> Result<ast::Module, ScriptError> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let module = parser::Parser::new(tokens).parse_module()?;
    Ok(module)
}
