//! Recursive-descent statement parser with precedence climbing for expressions.

use super::{
    ast::{Block, CodeRange, ExceptHandler, Expr, ExprLoc, Module, Node, NodeLoc, Try},
    lexer::{Keyword, Token, TokenKind},
    ParseError,
};
use crate::bytecode::{BinaryOp, UnaryOp};

type ParseResult<T> = Result<T, ParseError>;

/// Binding strength of infix operators, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Or,
    And,
    Not,
    Comparison,
    BitOr,
    BitXor,
    BitAnd,
    Shift,
    Sum,
    Product,
    Unary,
    Power,
}

/// Keywords that close the block being parsed.
const BLOCK_END: &[Keyword] = &[
    Keyword::End,
    Keyword::Elif,
    Keyword::Else,
    Keyword::Except,
    Keyword::Finally,
    Keyword::Case,
    Keyword::Default,
];

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_module(mut self) -> ParseResult<Module> {
        let mut body = Vec::new();
        loop {
            self.skip_separators();
            if self.at(&TokenKind::Eof) {
                return Ok(Module { body });
            }
            if let TokenKind::Keyword(kw) = self.current().kind {
                if BLOCK_END.contains(&kw) {
                    return Err(self.unexpected());
                }
            }
            body.push(self.statement()?);
        }
    }

    // --- token helpers ---

    fn current(&self) -> &Token {
        // the token list always ends with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + ahead).map(|token| &token.kind)
    }

    fn position(&self) -> CodeRange {
        self.current().position
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.current().kind == TokenKind::Keyword(keyword)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.expected(&kind.describe()))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<()> {
        self.expect(&TokenKind::Keyword(keyword))
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match &self.current().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.expected("a name")),
        }
    }

    /// An error for the current token; at the end of input it is marked incomplete.
    fn error_here(&self, message: String) -> ParseError {
        let token = self.current();
        if token.kind == TokenKind::Eof {
            ParseError::incomplete("unexpected end of input", token.position)
        } else {
            ParseError::new(message, token.position)
        }
    }

    fn expected(&self, what: &str) -> ParseError {
        self.error_here(format!("expected {what}, found {}", self.current().kind.describe()))
    }

    fn unexpected(&self) -> ParseError {
        self.error_here(format!("unexpected {}", self.current().kind.describe()))
    }

    fn at_separator(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn skip_separators(&mut self) {
        while matches!(self.current().kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Whether the current token ends a simple statement.
    fn at_statement_end(&self) -> bool {
        self.at_separator()
            || matches!(self.current().kind, TokenKind::Keyword(kw) if BLOCK_END.contains(&kw))
    }

    fn end_simple_statement(&mut self) -> ParseResult<()> {
        if self.at_statement_end() {
            Ok(())
        } else {
            Err(self.expected("newline or ';'"))
        }
    }

    // --- statements ---

    /// Statements up to (not including) one of `closers`.
    fn block(&mut self, closers: &[Keyword]) -> ParseResult<Block> {
        let mut body = Vec::new();
        loop {
            self.skip_separators();
            match self.current().kind {
                TokenKind::Keyword(kw) if closers.contains(&kw) => return Ok(body),
                TokenKind::Keyword(kw) if BLOCK_END.contains(&kw) => return Err(self.unexpected()),
                TokenKind::Eof => return Err(self.unexpected()),
                _ => body.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> ParseResult<NodeLoc> {
        let position = self.position();
        let node = match self.current().kind {
            TokenKind::Keyword(Keyword::If) => self.if_statement()?,
            TokenKind::Keyword(Keyword::Unless) => self.unless_statement()?,
            TokenKind::Keyword(kw @ (Keyword::While | Keyword::Until)) => {
                self.advance();
                let test = self.expression()?;
                let body = self.block(&[Keyword::End])?;
                self.expect_keyword(Keyword::End)?;
                Node::While {
                    test,
                    body,
                    until: kw == Keyword::Until,
                }
            }
            TokenKind::Keyword(Keyword::For) => self.for_statement()?,
            TokenKind::Keyword(Keyword::Def) => self.function_def()?,
            TokenKind::Keyword(Keyword::Class) => self.class_def()?,
            TokenKind::Keyword(Keyword::Try) => self.try_statement()?,
            TokenKind::Keyword(Keyword::Switch) => self.switch_statement()?,
            TokenKind::Keyword(Keyword::Begin) => {
                self.advance();
                let body = self.block(&[Keyword::End])?;
                self.expect_keyword(Keyword::End)?;
                Node::Begin(body)
            }
            TokenKind::Keyword(Keyword::Defer) => {
                self.advance();
                Node::Defer(Box::new(self.statement()?))
            }
            _ => {
                let node = self.simple_statement()?;
                self.end_simple_statement()?;
                node
            }
        };
        Ok(NodeLoc { position, node })
    }

    fn simple_statement(&mut self) -> ParseResult<Node> {
        let keyword = match self.current().kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        };
        match keyword {
            Some(Keyword::Nonlocal) => {
                self.advance();
                let mut names = vec![self.expect_name()?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.expect_name()?);
                }
                Ok(Node::NonLocal(names))
            }
            Some(Keyword::Return) => {
                self.advance();
                Ok(Node::Return(self.optional_value()?))
            }
            Some(Keyword::Yield) => {
                self.advance();
                Ok(Node::Yield(self.optional_value()?))
            }
            Some(Keyword::Raise) => {
                self.advance();
                Ok(Node::Raise(self.expression()?))
            }
            Some(Keyword::Break) => self.bare(Node::Break),
            Some(Keyword::Continue) => self.bare(Node::Continue),
            Some(Keyword::Redo) => self.bare(Node::Redo),
            Some(Keyword::Pass) => self.bare(Node::Pass),
            _ => self.expression_statement(),
        }
    }

    fn bare(&mut self, node: Node) -> ParseResult<Node> {
        self.advance();
        Ok(node)
    }

    /// The value of `return` or `yield`, absent at the end of the statement.
    fn optional_value(&mut self) -> ParseResult<Option<ExprLoc>> {
        if self.at_statement_end() {
            Ok(None)
        } else {
            self.expression_list().map(Some)
        }
    }

    fn expression_statement(&mut self) -> ParseResult<Node> {
        let targets = self.expressions()?;
        if self.eat(&TokenKind::Equal) {
            let values = self.expressions()?;
            return Ok(Node::Assign { targets, values });
        }
        if let TokenKind::AugAssign(op) = self.current().kind {
            let position = self.position();
            self.advance();
            let [target] = <[ExprLoc; 1]>::try_from(targets)
                .map_err(|_| ParseError::new("augmented assignment needs a single target", position))?;
            let value = self.expression_list()?;
            return Ok(Node::AugAssign { target, op, value });
        }
        Ok(Node::Expr(tuple_of(targets)))
    }

    fn if_statement(&mut self) -> ParseResult<Node> {
        self.expect_keyword(Keyword::If)?;
        let mut branches = Vec::new();
        let test = self.expression()?;
        let body = self.block(&[Keyword::Elif, Keyword::Else, Keyword::End])?;
        branches.push((test, body));
        while self.eat_keyword(Keyword::Elif) {
            let test = self.expression()?;
            let body = self.block(&[Keyword::Elif, Keyword::Else, Keyword::End])?;
            branches.push((test, body));
        }
        let orelse = if self.eat_keyword(Keyword::Else) {
            Some(self.block(&[Keyword::End])?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Node::If { branches, orelse })
    }

    /// `unless c ... end` is `if not c ... end`.
    fn unless_statement(&mut self) -> ParseResult<Node> {
        self.expect_keyword(Keyword::Unless)?;
        let test = self.expression()?;
        let test = ExprLoc::new(
            test.position,
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(test),
            },
        );
        let body = self.block(&[Keyword::Else, Keyword::End])?;
        let orelse = if self.eat_keyword(Keyword::Else) {
            Some(self.block(&[Keyword::End])?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Node::If {
            branches: vec![(test, body)],
            orelse,
        })
    }

    fn for_statement(&mut self) -> ParseResult<Node> {
        self.expect_keyword(Keyword::For)?;
        let mut receivers = vec![self.expect_name()?];
        while self.eat(&TokenKind::Comma) {
            receivers.push(self.expect_name()?);
        }
        self.expect_keyword(Keyword::In)?;
        let iterable = self.expression()?;
        let body = self.block(&[Keyword::End])?;
        self.expect_keyword(Keyword::End)?;
        Ok(Node::For {
            receivers,
            iterable,
            body,
        })
    }

    fn function_def(&mut self) -> ParseResult<Node> {
        self.expect_keyword(Keyword::Def)?;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            params.push(self.expect_name()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.check_unique(&params)?;
        let body = self.block(&[Keyword::End])?;
        self.expect_keyword(Keyword::End)?;
        Ok(Node::FunctionDef { name, params, body })
    }

    fn check_unique(&self, params: &[String]) -> ParseResult<()> {
        for (i, param) in params.iter().enumerate() {
            if params[..i].contains(param) {
                return Err(ParseError::new(
                    format!("duplicate parameter '{param}'"),
                    self.position(),
                ));
            }
        }
        Ok(())
    }

    fn class_def(&mut self) -> ParseResult<Node> {
        self.expect_keyword(Keyword::Class)?;
        let name = self.expect_name()?;
        let mut bases = Vec::new();
        if self.eat(&TokenKind::LParen) {
            while !self.at(&TokenKind::RParen) {
                bases.push(self.expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }
        let body = self.block(&[Keyword::End])?;
        self.expect_keyword(Keyword::End)?;
        Ok(Node::ClassDef { name, bases, body })
    }

    fn try_statement(&mut self) -> ParseResult<Node> {
        const CLAUSES: &[Keyword] = &[Keyword::Except, Keyword::Else, Keyword::Finally, Keyword::End];
        self.expect_keyword(Keyword::Try)?;
        let body = self.block(CLAUSES)?;
        let mut handlers = Vec::new();
        while self.eat_keyword(Keyword::Except) {
            let mut targets = Vec::new();
            if !self.at_separator() && !self.at_keyword(Keyword::As) {
                targets.push(self.expression()?);
                while self.eat(&TokenKind::Comma) {
                    targets.push(self.expression()?);
                }
            }
            let receiver = if self.eat_keyword(Keyword::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            let body = self.block(CLAUSES)?;
            handlers.push(ExceptHandler {
                targets,
                receiver,
                body,
            });
        }
        let orelse = if self.eat_keyword(Keyword::Else) {
            if handlers.is_empty() {
                return Err(ParseError::new("'else' in 'try' needs an 'except' clause", self.position()));
            }
            Some(self.block(&[Keyword::Finally, Keyword::End])?)
        } else {
            None
        };
        let finally = if self.eat_keyword(Keyword::Finally) {
            Some(self.block(&[Keyword::End])?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Node::Try(Try {
            body,
            handlers,
            orelse,
            finally,
        }))
    }

    fn switch_statement(&mut self) -> ParseResult<Node> {
        const CLAUSES: &[Keyword] = &[Keyword::Case, Keyword::Default, Keyword::End];
        self.expect_keyword(Keyword::Switch)?;
        let subject = self.expression()?;
        self.skip_separators();
        let mut cases = Vec::new();
        while self.eat_keyword(Keyword::Case) {
            let mut values = vec![self.expression()?];
            while self.eat(&TokenKind::Comma) {
                values.push(self.expression()?);
            }
            let body = self.block(CLAUSES)?;
            cases.push((values, body));
        }
        let default = if self.eat_keyword(Keyword::Default) {
            Some(self.block(&[Keyword::End])?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Node::Switch {
            subject,
            cases,
            default,
        })
    }

    // --- expressions ---

    /// Comma-separated expressions, e.g. assignment targets.
    fn expressions(&mut self) -> ParseResult<Vec<ExprLoc>> {
        let mut items = vec![self.expression()?];
        while self.eat(&TokenKind::Comma) {
            if self.at_statement_end() || self.at(&TokenKind::Equal) {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(items)
    }

    /// Expressions where several form a tuple: `return a, b`.
    fn expression_list(&mut self) -> ParseResult<ExprLoc> {
        self.expressions().map(tuple_of)
    }

    pub(super) fn expression(&mut self) -> ParseResult<ExprLoc> {
        if self.at_keyword(Keyword::Lambda) {
            return self.lambda();
        }
        let body = self.binary(Precedence::Or)?;
        if !self.at_keyword(Keyword::If) {
            return Ok(body);
        }
        self.advance();
        let test = self.binary(Precedence::Or)?;
        self.expect_keyword(Keyword::Else)?;
        let orelse = self.expression()?;
        Ok(ExprLoc::new(
            body.position,
            Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
        ))
    }

    fn lambda(&mut self) -> ParseResult<ExprLoc> {
        let position = self.position();
        self.expect_keyword(Keyword::Lambda)?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::Colon) {
            params.push(self.expect_name()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Colon)?;
        self.check_unique(&params)?;
        let body = self.expression()?;
        Ok(ExprLoc::new(
            position,
            Expr::Lambda {
                params,
                body: Box::new(body),
            },
        ))
    }

    /// Precedence climbing over the binary operators binding at least as tightly as `min`.
    fn binary(&mut self, min: Precedence) -> ParseResult<ExprLoc> {
        let mut left = self.prefix(min)?;
        while let Some((precedence, operator)) = self.infix() {
            if precedence < min {
                break;
            }
            let position = left.position;
            self.advance();
            left = match operator {
                Infix::And => {
                    let right = self.binary(Precedence::Not)?;
                    ExprLoc::new(position, Expr::And(Box::new(left), Box::new(right)))
                }
                Infix::Or => {
                    let right = self.binary(Precedence::And)?;
                    ExprLoc::new(position, Expr::Or(Box::new(left), Box::new(right)))
                }
                Infix::Op(op) => {
                    // `**` is right-associative and binds looser than a unary operand
                    let right = if op == BinaryOp::Pow {
                        self.binary(Precedence::Unary)?
                    } else {
                        self.binary(next_level(precedence))?
                    };
                    binary_expr(position, op, left, right)
                }
                Infix::Negated(op) => {
                    // `not in` and `is not` span two tokens
                    self.advance();
                    let right = self.binary(Precedence::BitOr)?;
                    let inner = binary_expr(position, op, left, right);
                    ExprLoc::new(
                        position,
                        Expr::Unary {
                            op: UnaryOp::Not,
                            operand: Box::new(inner),
                        },
                    )
                }
            };
        }
        Ok(left)
    }

    fn infix(&self) -> Option<(Precedence, Infix)> {
        let op = match &self.current().kind {
            TokenKind::Keyword(Keyword::Or) => return Some((Precedence::Or, Infix::Or)),
            TokenKind::Keyword(Keyword::And) => return Some((Precedence::And, Infix::And)),
            TokenKind::Keyword(Keyword::Not) => {
                return (self.peek_kind(1) == Some(&TokenKind::Keyword(Keyword::In)))
                    .then_some((Precedence::Comparison, Infix::Negated(BinaryOp::Contains)));
            }
            TokenKind::Keyword(Keyword::Is) => {
                if self.peek_kind(1) == Some(&TokenKind::Keyword(Keyword::Not)) {
                    return Some((Precedence::Comparison, Infix::Negated(BinaryOp::Is)));
                }
                BinaryOp::Is
            }
            TokenKind::Keyword(Keyword::In) => BinaryOp::Contains,
            TokenKind::EqEqual => BinaryOp::Equals,
            TokenKind::NotEqual => BinaryOp::NotEquals,
            TokenKind::Less => BinaryOp::LessThan,
            TokenKind::LessEqual => BinaryOp::LessOrEqual,
            TokenKind::Greater => BinaryOp::GreaterThan,
            TokenKind::GreaterEqual => BinaryOp::GreaterOrEqual,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::Amper => BinaryOp::BitAnd,
            TokenKind::LeftShift => BinaryOp::ShiftLeft,
            TokenKind::RightShift => BinaryOp::ShiftRight,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::DoubleSlash => BinaryOp::FloorDiv,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::DoubleStar => BinaryOp::Pow,
            _ => return None,
        };
        Some((precedence_of(op), Infix::Op(op)))
    }

    fn prefix(&mut self, min: Precedence) -> ParseResult<ExprLoc> {
        let position = self.position();
        let op = match self.current().kind {
            TokenKind::Keyword(Keyword::Not) => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Positive,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.advance();
        let operand = if op == UnaryOp::Not {
            self.binary(Precedence::Comparison.max(min))?
        } else {
            self.binary(Precedence::Unary)?
        };
        Ok(ExprLoc::new(
            position,
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
        ))
    }

    /// A postfix expression, optionally raised to a power.
    fn power(&mut self) -> ParseResult<ExprLoc> {
        let base = self.postfix()?;
        if !self.at(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        self.advance();
        let exponent = self.binary(Precedence::Unary)?;
        Ok(binary_expr(base.position, BinaryOp::Pow, base, exponent))
    }

    fn postfix(&mut self) -> ParseResult<ExprLoc> {
        let mut expr = self.atom()?;
        loop {
            let position = expr.position;
            if self.eat(&TokenKind::LParen) {
                let args = self.sequence(&TokenKind::RParen)?;
                expr = ExprLoc::new(
                    position,
                    Expr::Call {
                        callee: Box::new(expr),
                        args,
                    },
                );
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RBracket)?;
                expr = ExprLoc::new(
                    position,
                    Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                );
            } else if self.eat(&TokenKind::Dot) {
                let name = self.expect_name()?;
                expr = ExprLoc::new(
                    position,
                    Expr::Selector {
                        target: Box::new(expr),
                        name,
                    },
                );
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to `close`, which is consumed. A trailing comma is
    /// allowed.
    fn sequence(&mut self, close: &TokenKind) -> ParseResult<Vec<ExprLoc>> {
        let mut items = Vec::new();
        while !self.at(close) {
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn atom(&mut self) -> ParseResult<ExprLoc> {
        let token = self.advance();
        let position = token.position;
        let expr = match token.kind {
            TokenKind::Int(i) => Expr::Int(i),
            TokenKind::Float(f) => Expr::Float(f),
            TokenKind::Str(s) => Expr::Str(s),
            TokenKind::Bytes(b) => Expr::Bytes(b),
            TokenKind::Name(name) => Expr::Name(name),
            TokenKind::Keyword(Keyword::True) => Expr::Bool(true),
            TokenKind::Keyword(Keyword::False) => Expr::Bool(false),
            TokenKind::Keyword(Keyword::None) => Expr::None,
            TokenKind::LBracket => Expr::Array(self.sequence(&TokenKind::RBracket)?),
            TokenKind::LParen => return self.parenthesized(position),
            TokenKind::LBrace => self.hash()?,
            _ => {
                self.pos -= 1;
                return Err(self.expected("an expression"));
            }
        };
        Ok(ExprLoc::new(position, expr))
    }

    /// `()`, `(x)`, `(x,)` or `(x, y)`.
    fn parenthesized(&mut self, position: CodeRange) -> ParseResult<ExprLoc> {
        if self.eat(&TokenKind::RParen) {
            return Ok(ExprLoc::new(position, Expr::Tuple(Vec::new())));
        }
        let first = self.expression()?;
        if self.eat(&TokenKind::RParen) {
            return Ok(first);
        }
        self.expect(&TokenKind::Comma)?;
        let mut items = vec![first];
        items.extend(self.sequence(&TokenKind::RParen)?);
        Ok(ExprLoc::new(position, Expr::Tuple(items)))
    }

    fn hash(&mut self) -> ParseResult<Expr> {
        let mut pairs = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let key = self.expression()?;
            self.expect(&TokenKind::Colon)?;
            let value = self.expression()?;
            pairs.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::Hash(pairs))
    }
}

#[derive(Debug, Clone, Copy)]
enum Infix {
    And,
    Or,
    Op(BinaryOp),
    /// `not in` / `is not`: the operator, then boolean negation.
    Negated(BinaryOp),
}

fn precedence_of(op: BinaryOp) -> Precedence {
    match op {
        BinaryOp::Equals
        | BinaryOp::NotEquals
        | BinaryOp::LessThan
        | BinaryOp::LessOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterOrEqual
        | BinaryOp::Contains
        | BinaryOp::Is => Precedence::Comparison,
        BinaryOp::BitOr => Precedence::BitOr,
        BinaryOp::BitXor => Precedence::BitXor,
        BinaryOp::BitAnd => Precedence::BitAnd,
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight => Precedence::Shift,
        BinaryOp::Add | BinaryOp::Sub => Precedence::Sum,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod => Precedence::Product,
        BinaryOp::Pow => Precedence::Power,
    }
}

/// The level just above `precedence`, so equal operators associate to the left.
fn next_level(precedence: Precedence) -> Precedence {
    match precedence {
        Precedence::Or => Precedence::And,
        Precedence::And => Precedence::Not,
        Precedence::Not => Precedence::Comparison,
        Precedence::Comparison => Precedence::BitOr,
        Precedence::BitOr => Precedence::BitXor,
        Precedence::BitXor => Precedence::BitAnd,
        Precedence::BitAnd => Precedence::Shift,
        Precedence::Shift => Precedence::Sum,
        Precedence::Sum => Precedence::Product,
        Precedence::Product => Precedence::Unary,
        Precedence::Unary | Precedence::Power => Precedence::Power,
    }
}

fn binary_expr(position: CodeRange, op: BinaryOp, left: ExprLoc, right: ExprLoc) -> ExprLoc {
    ExprLoc::new(
        position,
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    )
}

/// One expression as itself, several as a tuple.
fn tuple_of(mut items: Vec<ExprLoc>) -> ExprLoc {
    if items.len() == 1 {
        if let Some(item) = items.pop() {
            return item;
        }
    }
    let position = items.first().map(|item| item.position).unwrap_or_default();
    ExprLoc::new(position, Expr::Tuple(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::lexer::Lexer;

    fn parse(source: &str) -> ParseResult<Module> {
        Parser::new(Lexer::new(source).tokenize()?).parse_module()
    }

    fn expr(source: &str) -> Expr {
        let module = parse(source).unwrap();
        match module.body.into_iter().next().map(|stmt| stmt.node) {
            Some(Node::Expr(e)) => e.expr,
            other => panic!("expected an expression statement, got {other:?}"),
        }
    }

    fn binary_op(e: &Expr) -> BinaryOp {
        match e {
            Expr::Binary { op, .. } => *op,
            other => panic!("expected a binary expression, got {other:?}"),
        }
    }

    #[test]
    fn precedence() {
        let Expr::Binary { op, right, .. } = expr("1 + 2 * 3") else {
            panic!("expected binary")
        };
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(binary_op(&right.expr), BinaryOp::Mul);

        // left associative
        let Expr::Binary { left, .. } = expr("1 - 2 - 3") else {
            panic!("expected binary")
        };
        assert_eq!(binary_op(&left.expr), BinaryOp::Sub);

        // right associative
        let Expr::Binary { right, .. } = expr("2 ** 3 ** 2") else {
            panic!("expected binary")
        };
        assert_eq!(binary_op(&right.expr), BinaryOp::Pow);
    }

    #[test]
    fn unary_minus_binds_looser_than_power() {
        let Expr::Unary { op, operand } = expr("-2 ** 2") else {
            panic!("expected unary")
        };
        assert_eq!(op, UnaryOp::Negate);
        assert_eq!(binary_op(&operand.expr), BinaryOp::Pow);
    }

    #[test]
    fn negated_comparisons() {
        let Expr::Unary { op, operand } = expr("a not in b") else {
            panic!("expected unary")
        };
        assert_eq!(op, UnaryOp::Not);
        assert_eq!(binary_op(&operand.expr), BinaryOp::Contains);
        assert!(matches!(expr("not a == b"), Expr::Unary { op: UnaryOp::Not, .. }));
        assert!(matches!(expr("a and b or c"), Expr::Or(..)));
    }

    #[test]
    fn postfix_chains() {
        let Expr::Call { callee, args } = expr("a.b[0](1, 2,)") else {
            panic!("expected call")
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(callee.expr, Expr::Index { .. }));
    }

    #[test]
    fn literals() {
        assert!(matches!(expr("(1,)"), Expr::Tuple(items) if items.len() == 1));
        assert!(matches!(expr("(1)"), Expr::Int(1)));
        assert!(matches!(expr("()"), Expr::Tuple(items) if items.is_empty()));
        assert!(matches!(expr("{1: 2, 'a': 3}"), Expr::Hash(pairs) if pairs.len() == 2));
        assert!(matches!(expr("lambda x, y: x"), Expr::Lambda { params, .. } if params.len() == 2));
        assert!(matches!(expr("1 if c else 2"), Expr::Conditional { .. }));
    }

    #[test]
    fn statements() {
        let module = parse("a, b = 1, 2\nx += 1; if a\nb\nelif c\nd\nelse\ne\nend").unwrap();
        assert_eq!(module.body.len(), 3);
        assert!(matches!(&module.body[0].node, Node::Assign { targets, values } if targets.len() == 2 && values.len() == 2));
        assert!(matches!(&module.body[1].node, Node::AugAssign { op: BinaryOp::Add, .. }));
        assert!(matches!(&module.body[2].node, Node::If { branches, orelse: Some(_) } if branches.len() == 2));
    }

    #[test]
    fn try_and_switch() {
        let module = parse(
            "try\n  f()\nexcept TypeError, ValueError as e\n  g()\nexcept\n  h()\nelse\n  i()\nfinally\n  j()\nend\n\
             switch x\ncase 1, 2\n  a()\ndefault\n  b()\nend",
        )
        .unwrap();
        let Node::Try(t) = &module.body[0].node else {
            panic!("expected try")
        };
        assert_eq!(t.handlers.len(), 2);
        assert_eq!(t.handlers[0].targets.len(), 2);
        assert_eq!(t.handlers[0].receiver.as_deref(), Some("e"));
        assert!(t.handlers[1].targets.is_empty());
        assert!(t.orelse.is_some() && t.finally.is_some());
        assert!(matches!(&module.body[1].node, Node::Switch { cases, default: Some(_), .. } if cases[0].0.len() == 2));
    }

    #[test]
    fn one_line_blocks() {
        let module = parse("if x print(1) end").unwrap();
        assert!(matches!(&module.body[0].node, Node::If { branches, .. } if branches[0].1.len() == 1));
    }

    #[test]
    fn incomplete_input() {
        for source in ["if x", "def f(", "[1, 2", "while True\n  print(1)\n", "x = "] {
            let err = parse(source).unwrap_err();
            assert!(err.incomplete, "{source:?} should be incomplete: {err:?}");
            assert_eq!(err.message, "unexpected end of input");
        }
    }

    #[test]
    fn errors_carry_positions() {
        let err = parse("x = 1\ny = )").unwrap_err();
        assert!(!err.incomplete);
        assert_eq!(err.position, CodeRange { line: 2, column: 5 });
        assert!(parse("end").is_err());
        assert!(parse("def f(a, a)\nend").is_err());
    }
}
