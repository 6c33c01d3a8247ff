//! Tokenizer.
//!
//! Newlines are significant statement separators except inside brackets. Comments run
//! from `#` to the end of the line and never produce tokens.

use std::{iter::Peekable, str::Chars};

use strum::{Display, EnumString, IntoStaticStr};

use super::{ast::CodeRange, ParseError};
use crate::bytecode::BinaryOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Keyword {
    If,
    Elif,
    Else,
    Unless,
    While,
    Until,
    For,
    In,
    Def,
    Class,
    Try,
    Except,
    As,
    Finally,
    Switch,
    Case,
    Default,
    Begin,
    End,
    Defer,
    Nonlocal,
    Return,
    Raise,
    Yield,
    Break,
    Continue,
    Redo,
    Pass,
    Lambda,
    And,
    Or,
    Not,
    Is,
    #[strum(serialize = "True")]
    True,
    #[strum(serialize = "False")]
    False,
    #[strum(serialize = "None")]
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Name(String),
    Keyword(Keyword),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    Amper,
    Pipe,
    Caret,
    Tilde,
    LeftShift,
    RightShift,
    EqEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    /// `+=`, `-=` and the other augmented assignments.
    AugAssign(BinaryOp),
    Newline,
    Eof,
}

impl TokenKind {
    /// How the token reads in an error message.
    pub fn describe(&self) -> String {
        match self {
            Self::Int(i) => format!("integer {i}"),
            Self::Float(f) => format!("float {f}"),
            Self::Str(_) => "string literal".to_owned(),
            Self::Bytes(_) => "bytes literal".to_owned(),
            Self::Name(name) => format!("name '{name}'"),
            Self::Keyword(kw) => format!("'{kw}'"),
            Self::Newline => "newline".to_owned(),
            Self::Eof => "end of input".to_owned(),
            Self::AugAssign(op) => format!("'{op}='"),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Semicolon => ";",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::DoubleSlash => "//",
            Self::Percent => "%",
            Self::DoubleStar => "**",
            Self::Amper => "&",
            Self::Pipe => "|",
            Self::Caret => "^",
            Self::Tilde => "~",
            Self::LeftShift => "<<",
            Self::RightShift => ">>",
            Self::EqEqual => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Equal => "=",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: CodeRange,
}

/// Splits source text into tokens.
pub(crate) struct Lexer<'src> {
    chars: Peekable<Chars<'src>>,
    line: u32,
    column: u32,
    /// Open `(`, `[` and `{`; newlines inside them are skipped.
    depth: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            depth: 0,
        }
    }

    /// Tokenizes the whole input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            // collapse runs of newlines
            let repeated_newline = token.kind == TokenKind::Newline
                && tokens.last().map_or(true, |last: &Token| last.kind == TokenKind::Newline);
            if !repeated_newline {
                tokens.push(token);
            }
            if done {
                return Ok(tokens);
            }
        }
    }

    fn position(&self) -> CodeRange {
        CodeRange {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' if self.depth > 0 => {
                    self.bump();
                }
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia();
        let position = self.position();
        let Some(c) = self.bump() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position,
            });
        };
        let kind = match c {
            '\n' => TokenKind::Newline,
            '(' => self.open(TokenKind::LParen),
            '[' => self.open(TokenKind::LBracket),
            '{' => self.open(TokenKind::LBrace),
            ')' => self.close(TokenKind::RParen),
            ']' => self.close(TokenKind::RBracket),
            '}' => self.close(TokenKind::RBrace),
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '~' => TokenKind::Tilde,
            '.' => TokenKind::Dot,
            '+' => self.operator(TokenKind::Plus, BinaryOp::Add),
            '-' => self.operator(TokenKind::Minus, BinaryOp::Sub),
            '%' => self.operator(TokenKind::Percent, BinaryOp::Mod),
            '&' => self.operator(TokenKind::Amper, BinaryOp::BitAnd),
            '|' => self.operator(TokenKind::Pipe, BinaryOp::BitOr),
            '^' => self.operator(TokenKind::Caret, BinaryOp::BitXor),
            '*' => {
                if self.eat('*') {
                    self.operator(TokenKind::DoubleStar, BinaryOp::Pow)
                } else {
                    self.operator(TokenKind::Star, BinaryOp::Mul)
                }
            }
            '/' => {
                if self.eat('/') {
                    self.operator(TokenKind::DoubleSlash, BinaryOp::FloorDiv)
                } else {
                    self.operator(TokenKind::Slash, BinaryOp::Div)
                }
            }
            '<' => {
                if self.eat('<') {
                    self.operator(TokenKind::LeftShift, BinaryOp::ShiftLeft)
                } else if self.eat('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('>') {
                    self.operator(TokenKind::RightShift, BinaryOp::ShiftRight)
                } else if self.eat('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '=' => {
                if self.eat('=') {
                    TokenKind::EqEqual
                } else {
                    TokenKind::Equal
                }
            }
            '!' if self.eat('=') => TokenKind::NotEqual,
            '"' | '\'' => TokenKind::Str(self.string(c, position)?),
            'b' if matches!(self.peek(), Some('"' | '\'')) => {
                let quote = self.bump().unwrap_or('"');
                TokenKind::Bytes(self.bytes(quote, position)?)
            }
            c if c.is_ascii_digit() => self.number(c, position)?,
            c if c == '_' || c.is_alphabetic() => self.word(c),
            other => {
                return Err(ParseError::new(format!("unexpected character '{other}'"), position));
            }
        };
        Ok(Token { kind, position })
    }

    fn open(&mut self, kind: TokenKind) -> TokenKind {
        self.depth += 1;
        kind
    }

    fn close(&mut self, kind: TokenKind) -> TokenKind {
        self.depth = self.depth.saturating_sub(1);
        kind
    }

    /// `kind`, or its augmented-assignment form when followed by `=`.
    fn operator(&mut self, kind: TokenKind, op: BinaryOp) -> TokenKind {
        if self.eat('=') {
            TokenKind::AugAssign(op)
        } else {
            kind
        }
    }

    fn word(&mut self, first: char) -> TokenKind {
        let mut word = String::from(first);
        while let Some(c) = self.peek().filter(|c| *c == '_' || c.is_alphanumeric()) {
            word.push(c);
            self.bump();
        }
        match word.parse::<Keyword>() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Name(word),
        }
    }

    fn number(&mut self, first: char, position: CodeRange) -> Result<TokenKind, ParseError> {
        if first == '0' {
            let radix = match self.peek() {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                let digits = self.digits(|c| c.is_digit(radix));
                if digits.is_empty() {
                    return Err(ParseError::new("invalid integer literal", position));
                }
                return i64::from_str_radix(&digits, radix)
                    .map(TokenKind::Int)
                    .map_err(|_| ParseError::new("integer literal is too large", position));
            }
        }

        let mut text = String::from(first);
        text.push_str(&self.digits(|c| c.is_ascii_digit()));
        let mut is_float = false;
        if self.peek() == Some('.') && self.second_is_digit() {
            self.bump();
            is_float = true;
            text.push('.');
            text.push_str(&self.digits(|c| c.is_ascii_digit()));
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            is_float = true;
            text.push('e');
            if let Some(sign) = self.peek().filter(|c| *c == '+' || *c == '-') {
                self.bump();
                text.push(sign);
            }
            let exponent = self.digits(|c| c.is_ascii_digit());
            if exponent.is_empty() {
                return Err(ParseError::new("invalid float literal", position));
            }
            text.push_str(&exponent);
        }
        if is_float {
            text.parse()
                .map(TokenKind::Float)
                .map_err(|_| ParseError::new("invalid float literal", position))
        } else {
            text.parse()
                .map(TokenKind::Int)
                .map_err(|_| ParseError::new("integer literal is too large", position))
        }
    }

    /// Digits accepted by `accept`, with `_` separators dropped.
    fn digits(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if accept(c) {
                digits.push(c);
            } else if c != '_' {
                break;
            }
            self.bump();
        }
        digits
    }

    /// Whether the character after the next one is a digit, so `1.5` lexes as a float
    /// while `1.real` stays a selector.
    fn second_is_digit(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().is_some_and(|c| c.is_ascii_digit())
    }

    fn string(&mut self, quote: char, position: CodeRange) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::incomplete("unterminated string literal", position)),
                Some('\n') => return Err(ParseError::new("unterminated string literal", position)),
                Some(c) if c == quote => return Ok(text),
                Some('\\') => {
                    let escaped = self.escape(position)?;
                    let c = char::from_u32(escaped)
                        .ok_or_else(|| ParseError::new("invalid escape sequence", position))?;
                    text.push(c);
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn bytes(&mut self, quote: char, position: CodeRange) -> Result<Vec<u8>, ParseError> {
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::incomplete("unterminated bytes literal", position)),
                Some('\n') => return Err(ParseError::new("unterminated bytes literal", position)),
                Some(c) if c == quote => return Ok(bytes),
                Some('\\') => {
                    let escaped = self.escape(position)?;
                    bytes.push(
                        u8::try_from(escaped)
                            .map_err(|_| ParseError::new("invalid escape sequence", position))?,
                    );
                }
                Some(c) if c.is_ascii() => bytes.push(c as u8),
                Some(_) => {
                    return Err(ParseError::new(
                        "bytes literals may only contain ASCII characters",
                        position,
                    ))
                }
            }
        }
    }

    /// The code of the escape sequence following a backslash.
    fn escape(&mut self, position: CodeRange) -> Result<u32, ParseError> {
        let code = match self.bump() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('\'') => '\'',
            Some('"') => '"',
            Some('x') => {
                let mut value = 0;
                for _ in 0..2 {
                    let digit = self
                        .bump()
                        .and_then(|c| c.to_digit(16))
                        .ok_or_else(|| ParseError::new("invalid \\x escape", position))?;
                    value = value * 16 + digit;
                }
                return Ok(value);
            }
            None => return Err(ParseError::incomplete("unterminated string literal", position)),
            Some(other) => {
                return Err(ParseError::new(format!("invalid escape sequence '\\{other}'"), position));
            }
        };
        Ok(u32::from(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1_000 0xff 0b101 0o17 2.5 1e3"),
            [
                TokenKind::Int(1000),
                TokenKind::Int(255),
                TokenKind::Int(5),
                TokenKind::Int(15),
                TokenKind::Float(2.5),
                TokenKind::Float(1000.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn operators_and_keywords() {
        assert_eq!(
            kinds("x //= 2 ** y if not None"),
            [
                TokenKind::Name("x".into()),
                TokenKind::AugAssign(BinaryOp::FloorDiv),
                TokenKind::Int(2),
                TokenKind::DoubleStar,
                TokenKind::Name("y".into()),
                TokenKind::Keyword(Keyword::If),
                TokenKind::Keyword(Keyword::Not),
                TokenKind::Keyword(Keyword::None),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_skipped() {
        assert_eq!(
            kinds("[1,\n2]\n\n# comment\nx"),
            [
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::Name("x".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn strings_and_bytes() {
        assert_eq!(
            kinds(r#"'a\n\x41' b"\x00z""#),
            [
                TokenKind::Str("a\nA".into()),
                TokenKind::Bytes(vec![0, b'z']),
                TokenKind::Eof
            ]
        );
        let err = Lexer::new("'open").tokenize().unwrap_err();
        assert!(err.incomplete);
        let err = Lexer::new("'open\n'").tokenize().unwrap_err();
        assert!(!err.incomplete);
    }

    #[test]
    fn positions() {
        let tokens = Lexer::new("a\n  bc").tokenize().unwrap();
        assert_eq!(tokens[2].position, CodeRange { line: 2, column: 3 });
    }
}
