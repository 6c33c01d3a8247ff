//! Bytecode compiler: syntax tree to [`Code`].
//!
//! Structured statements compile to sub-blocks run by VM controllers: loops to
//! `While`/`Until`/`For`, `try` to `Try`, function and class bodies to their own blocks.
//! Conditionals, `switch`, `and`/`or` and the conditional expression use jumps.
//!
//! Generator bodies are compiled *flat*: a suspended generator keeps no block stack, so
//! every loop in a generator becomes plain jumps within one block, `for` iterators live in
//! hidden locals, and the body opens with a `ResumeTable` that jumps to the instruction
//! after the `yield` that suspended it. `try` sub-blocks inside a generator are compiled
//! normally, which is why `yield` may not appear in them.

use std::mem;

use ahash::AHashSet;

use super::{
    builder::{CodeBuilder, JumpLabel, Pending},
    code::{Code, FunctionDef, Handler, Instruction, TryDef},
    op::BinaryOp,
};
use crate::{
    exception::ScriptError,
    magic::Magic,
    parse::{
        ast::{Block, CodeRange, Expr, ExprLoc, Module, Node, NodeLoc, Try},
        ParseError,
    },
};

type CompileResult<T> = Result<T, ParseError>;

/// Name given to lambda functions.
const LAMBDA_NAME: &str = "<lambda>";

/// Compiles a parsed module.
///
/// The module's value is the value of its final expression statement, or `None`.
pub(crate) fn compile_module(module: &Module) -> Result<Code, ScriptError> {
    let mut compiler = Compiler::new();
    compiler.statements(&module.body)?;
    if !matches!(module.body.last().map(|stmt| &stmt.node), Some(Node::Expr(_))) {
        compiler.emit(Instruction::NewNone);
    }
    let position = module.body.last().map(|stmt| stmt.position).unwrap_or_default();
    let code = mem::take(&mut compiler.code)
        .assemble()
        .map_err(|err| ParseError::new(format!("failed to assemble bytecode: {err}"), position))?;
    Ok(code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextKind {
    Module,
    Function,
    Generator,
    /// A class body, run once per instance.
    Class,
}

/// Per-body compile state.
struct Context {
    kind: ContextKind,
    /// Names declared `nonlocal`; assignments to them rebind the enclosing binding.
    nonlocals: AHashSet<String>,
    /// Open `try` statements; inside one a generator compiles structured code.
    try_depth: usize,
    /// Resume labels of a generator, one per `yield`, in order.
    resume_points: Vec<JumpLabel>,
}

impl Context {
    fn new(kind: ContextKind) -> Self {
        Self {
            kind,
            nonlocals: AHashSet::new(),
            try_depth: 0,
            resume_points: Vec::new(),
        }
    }

    fn is_flat(&self) -> bool {
        self.kind == ContextKind::Generator && self.try_depth == 0
    }
}

#[derive(Debug, Clone, Copy)]
enum LoopTarget {
    /// A loop driven by a VM controller; `Break`, `Continue` and `Redo` unwind to it.
    Structured,
    /// A jump-compiled generator loop living in the builder at `depth`.
    Flat {
        depth: usize,
        next: JumpLabel,
        body: JumpLabel,
        end: JumpLabel,
    },
}

#[derive(Debug, Clone, Copy)]
enum LoopControl {
    Break,
    Continue,
    Redo,
}

impl LoopControl {
    fn keyword(self) -> &'static str {
        match self {
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Redo => "redo",
        }
    }
}

struct Compiler {
    code: CodeBuilder,
    /// Number of enclosing sub-block builders.
    depth: usize,
    context: Context,
    loops: Vec<LoopTarget>,
    /// Counter for hidden local names.
    hidden: usize,
}

impl Compiler {
    fn new() -> Self {
        Self {
            code: CodeBuilder::new(),
            depth: 0,
            context: Context::new(ContextKind::Module),
            loops: Vec::new(),
            hidden: 0,
        }
    }

    fn emit(&mut self, instr: Pending) -> usize {
        self.code.emit(instr)
    }

    /// A fresh local name scripts cannot spell.
    fn hidden_name(&mut self, purpose: &str) -> String {
        self.hidden += 1;
        format!("${purpose}{}", self.hidden)
    }

    /// Compiles into a separate builder and returns the assembled bytes.
    fn sub_block(
        &mut self,
        position: CodeRange,
        body: impl FnOnce(&mut Self) -> CompileResult<()>,
    ) -> CompileResult<Vec<u8>> {
        let outer = mem::take(&mut self.code);
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        let inner = mem::replace(&mut self.code, outer);
        result?;
        inner
            .assemble_bytes()
            .map_err(|err| ParseError::new(format!("failed to assemble bytecode: {err}"), position))
    }

    fn block_bytes(&mut self, block: &Block, position: CodeRange) -> CompileResult<Vec<u8>> {
        self.sub_block(position, |c| c.statements(block))
    }

    fn expr_bytes(&mut self, expr: &ExprLoc) -> CompileResult<Vec<u8>> {
        self.sub_block(expr.position, |c| c.expr(expr))
    }

    /// Compiles a body under a new context with no enclosing loops.
    fn in_context<T>(&mut self, kind: ContextKind, body: impl FnOnce(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
        let outer_context = mem::replace(&mut self.context, Context::new(kind));
        let outer_loops = mem::take(&mut self.loops);
        let result = body(self);
        self.context = outer_context;
        self.loops = outer_loops;
        result
    }

    // --- statements ---

    fn statements(&mut self, block: &Block) -> CompileResult<()> {
        block.iter().try_for_each(|stmt| self.statement(stmt))
    }

    fn statement(&mut self, stmt: &NodeLoc) -> CompileResult<()> {
        let position = stmt.position;
        match &stmt.node {
            Node::Expr(expr) => self.expr(expr),
            Node::Assign { targets, values } => self.assign(targets, values),
            Node::AugAssign { target, op, value } => self.aug_assign(target, *op, value, position),
            Node::If { branches, orelse } => self.if_statement(branches, orelse.as_ref()),
            Node::While { test, body, until } => self.while_statement(test, body, *until, position),
            Node::For {
                receivers,
                iterable,
                body,
            } => self.for_statement(receivers, iterable, body, position),
            Node::FunctionDef { name, params, body } => {
                let instr = self.function(name, params, body, position)?;
                self.emit(instr);
                self.store_name(name);
                Ok(())
            }
            Node::ClassDef { name, bases, body } => self.class_def(name, bases, body, position),
            Node::Try(t) => self.try_statement(t, position),
            Node::Switch {
                subject,
                cases,
                default,
            } => self.switch(subject, cases, default.as_ref()),
            Node::Begin(body) => {
                if self.context.is_flat() {
                    return self.statements(body);
                }
                self.emit(Instruction::EnterBlock);
                self.statements(body)?;
                self.emit(Instruction::ExitBlock);
                Ok(())
            }
            Node::Defer(inner) => {
                if self.context.kind == ContextKind::Generator {
                    return Err(ParseError::new("'defer' inside a generator", position));
                }
                let outer_loops = mem::take(&mut self.loops);
                let body = self.sub_block(position, |c| c.statement(inner));
                self.loops = outer_loops;
                self.emit(Instruction::Defer(body?));
                Ok(())
            }
            Node::NonLocal(names) => {
                match self.context.kind {
                    ContextKind::Module => {
                        return Err(ParseError::new("nonlocal declaration at module level", position));
                    }
                    ContextKind::Class => {
                        return Err(ParseError::new("nonlocal declaration in a class body", position));
                    }
                    ContextKind::Function | ContextKind::Generator => {}
                }
                self.context.nonlocals.extend(names.iter().cloned());
                Ok(())
            }
            Node::Return(value) => {
                if !matches!(self.context.kind, ContextKind::Function | ContextKind::Generator) {
                    return Err(ParseError::new("'return' outside function", position));
                }
                self.optional_expr(value.as_ref())?;
                self.emit(Instruction::Return);
                Ok(())
            }
            Node::Raise(value) => {
                self.expr(value)?;
                self.emit(Instruction::Raise);
                Ok(())
            }
            Node::Yield(value) => self.yield_statement(value.as_ref(), position),
            Node::Break => self.loop_control(LoopControl::Break, position),
            Node::Continue => self.loop_control(LoopControl::Continue, position),
            Node::Redo => self.loop_control(LoopControl::Redo, position),
            Node::Pass => Ok(()),
        }
    }

    fn optional_expr(&mut self, value: Option<&ExprLoc>) -> CompileResult<()> {
        match value {
            Some(value) => self.expr(value),
            None => {
                self.emit(Instruction::NewNone);
                Ok(())
            }
        }
    }

    /// Stores the register under `name`.
    fn store_name(&mut self, name: &str) {
        if self.context.nonlocals.contains(name) {
            self.emit(Instruction::AssignNonLocal(name.to_owned()));
        } else {
            self.emit(Instruction::Assign(name.to_owned()));
        }
    }

    fn assign(&mut self, targets: &[ExprLoc], values: &[ExprLoc]) -> CompileResult<()> {
        for target in targets {
            check_target(target)?;
        }
        if let ([target], [value]) = (targets, values) {
            // single targets need no temporary
            return match &target.expr {
                Expr::Name(name) => {
                    self.expr(value)?;
                    self.store_name(name);
                    Ok(())
                }
                Expr::Selector { target: object, name } => {
                    self.expr(object)?;
                    self.emit(Instruction::Push);
                    self.expr(value)?;
                    self.emit(Instruction::AssignSelector(name.clone()));
                    Ok(())
                }
                Expr::Index { target: container, index } => {
                    self.expr(container)?;
                    self.emit(Instruction::Push);
                    self.expr(index)?;
                    self.emit(Instruction::Push);
                    self.expr(value)?;
                    self.emit(Instruction::AssignIndex);
                    Ok(())
                }
                _ => Err(invalid_target(target)),
            };
        }

        if let [value] = values {
            self.expr(value)?;
        } else {
            self.sequence(values)?;
            self.emit(Instruction::NewTuple(values.len()));
        }
        if let [target] = targets {
            return self.store_register(target);
        }
        self.emit(Instruction::Unpack(targets.len()));
        for target in targets {
            self.emit(Instruction::Pop);
            self.store_register(target)?;
        }
        Ok(())
    }

    /// Stores the register into an arbitrary target, through a hidden local when the
    /// target needs evaluating first.
    fn store_register(&mut self, target: &ExprLoc) -> CompileResult<()> {
        match &target.expr {
            Expr::Name(name) => {
                self.store_name(name);
                Ok(())
            }
            Expr::Selector { target: object, name } => {
                let temp = self.hidden_name("value");
                self.emit(Instruction::Assign(temp.clone()));
                self.expr(object)?;
                self.emit(Instruction::Push);
                self.emit(Instruction::Identifier(temp));
                self.emit(Instruction::AssignSelector(name.clone()));
                Ok(())
            }
            Expr::Index { target: container, index } => {
                let temp = self.hidden_name("value");
                self.emit(Instruction::Assign(temp.clone()));
                self.expr(container)?;
                self.emit(Instruction::Push);
                self.expr(index)?;
                self.emit(Instruction::Push);
                self.emit(Instruction::Identifier(temp));
                self.emit(Instruction::AssignIndex);
                Ok(())
            }
            _ => Err(invalid_target(target)),
        }
    }

    fn aug_assign(&mut self, target: &ExprLoc, op: BinaryOp, value: &ExprLoc, position: CodeRange) -> CompileResult<()> {
        check_target(target)?;
        match &target.expr {
            Expr::Name(name) => {
                self.emit(Instruction::Identifier(name.clone()));
                self.emit(Instruction::Push);
                self.expr(value)?;
                self.emit(Instruction::Binary(op));
                self.store_name(name);
            }
            Expr::Selector { target: object, name } => {
                // the object stays on the stack for the final AssignSelector
                self.expr(object)?;
                self.emit(Instruction::Push);
                self.emit(Instruction::Selector(name.clone()));
                self.emit(Instruction::Push);
                self.expr(value)?;
                self.emit(Instruction::Binary(op));
                self.emit(Instruction::AssignSelector(name.clone()));
            }
            Expr::Index { target: container, index } => {
                let container_temp = self.hidden_name("container");
                let index_temp = self.hidden_name("index");
                self.expr(container)?;
                self.emit(Instruction::Assign(container_temp.clone()));
                self.emit(Instruction::Push);
                self.expr(index)?;
                self.emit(Instruction::Assign(index_temp.clone()));
                self.emit(Instruction::Push);
                self.emit(Instruction::Identifier(container_temp));
                self.emit(Instruction::Push);
                self.emit(Instruction::Identifier(index_temp));
                self.emit(Instruction::Index);
                self.emit(Instruction::Push);
                self.expr(value)?;
                self.emit(Instruction::Binary(op));
                self.emit(Instruction::AssignIndex);
            }
            _ => return Err(ParseError::new("invalid target for augmented assignment", position)),
        }
        Ok(())
    }

    fn if_statement(&mut self, branches: &[(ExprLoc, Block)], orelse: Option<&Block>) -> CompileResult<()> {
        let end = self.code.new_label();
        for (test, body) in branches {
            let next = self.code.new_label();
            self.expr(test)?;
            self.emit(Instruction::JumpIfFalse(next));
            self.statements(body)?;
            self.emit(Instruction::Jump(end));
            self.code.bind(next);
        }
        if let Some(orelse) = orelse {
            self.statements(orelse)?;
        }
        self.code.bind(end);
        Ok(())
    }

    fn while_statement(&mut self, test: &ExprLoc, body: &Block, until: bool, position: CodeRange) -> CompileResult<()> {
        if self.context.is_flat() {
            let next = self.code.new_label();
            let body_label = self.code.new_label();
            let end = self.code.new_label();
            self.code.bind(next);
            self.expr(test)?;
            self.emit(if until {
                Instruction::JumpIfTrue(end)
            } else {
                Instruction::JumpIfFalse(end)
            });
            self.code.bind(body_label);
            self.flat_loop_body(body, next, body_label, end)?;
            return Ok(());
        }
        let cond = self.expr_bytes(test)?;
        let body = self.loop_body(body, position)?;
        self.emit(if until {
            Instruction::Until { cond, body }
        } else {
            Instruction::While { cond, body }
        });
        Ok(())
    }

    fn for_statement(
        &mut self,
        receivers: &[String],
        iterable: &ExprLoc,
        body: &Block,
        position: CodeRange,
    ) -> CompileResult<()> {
        if !self.context.is_flat() {
            self.expr(iterable)?;
            let body = self.loop_body(body, position)?;
            self.emit(Instruction::For {
                receivers: receivers.to_vec(),
                body,
            });
            return Ok(());
        }

        let iterator = self.hidden_name("iterator");
        self.expr(iterable)?;
        self.call_slot(Magic::Iter);
        self.emit(Instruction::Assign(iterator.clone()));

        let next = self.code.new_label();
        let body_label = self.code.new_label();
        let end = self.code.new_label();
        self.code.bind(next);
        self.emit(Instruction::Identifier(iterator.clone()));
        self.call_slot(Magic::HasNext);
        self.emit(Instruction::JumpIfFalse(end));
        self.emit(Instruction::Identifier(iterator));
        self.call_slot(Magic::Next);
        if let [receiver] = receivers {
            self.store_name(receiver);
        } else {
            self.emit(Instruction::Unpack(receivers.len()));
            for receiver in receivers {
                self.emit(Instruction::Pop);
                self.store_name(receiver);
            }
        }
        self.code.bind(body_label);
        self.flat_loop_body(body, next, body_label, end)
    }

    /// Calls the zero-argument slot `slot` on the register.
    fn call_slot(&mut self, slot: Magic) {
        self.emit(Instruction::Selector(slot.name().to_owned()));
        self.emit(Instruction::Push);
        self.emit(Instruction::Call(0));
    }

    fn loop_body(&mut self, body: &Block, position: CodeRange) -> CompileResult<Vec<u8>> {
        self.loops.push(LoopTarget::Structured);
        let result = self.block_bytes(body, position);
        self.loops.pop();
        result
    }

    fn flat_loop_body(&mut self, body: &Block, next: JumpLabel, body_label: JumpLabel, end: JumpLabel) -> CompileResult<()> {
        self.loops.push(LoopTarget::Flat {
            depth: self.depth,
            next,
            body: body_label,
            end,
        });
        let result = self.statements(body);
        self.loops.pop();
        result?;
        self.emit(Instruction::Jump(next));
        self.code.bind(end);
        self.emit(Instruction::NewNone);
        Ok(())
    }

    fn loop_control(&mut self, control: LoopControl, position: CodeRange) -> CompileResult<()> {
        let keyword = control.keyword();
        match self.loops.last().copied() {
            None => Err(ParseError::new(format!("'{keyword}' outside loop"), position)),
            Some(LoopTarget::Structured) => {
                self.emit(match control {
                    LoopControl::Break => Instruction::Break,
                    LoopControl::Continue => Instruction::Continue,
                    LoopControl::Redo => Instruction::Redo,
                });
                Ok(())
            }
            Some(LoopTarget::Flat { depth, next, body, end }) => {
                if depth != self.depth {
                    return Err(ParseError::new(
                        format!("'{keyword}' inside 'try' cannot leave a generator loop"),
                        position,
                    ));
                }
                self.emit(Instruction::Jump(match control {
                    LoopControl::Break => end,
                    LoopControl::Continue => next,
                    LoopControl::Redo => body,
                }));
                Ok(())
            }
        }
    }

    fn yield_statement(&mut self, value: Option<&ExprLoc>, position: CodeRange) -> CompileResult<()> {
        if self.context.kind != ContextKind::Generator {
            return Err(ParseError::new("'yield' outside function", position));
        }
        if self.context.try_depth > 0 {
            return Err(ParseError::new("'yield' inside 'try'", position));
        }
        self.optional_expr(value)?;
        let resume = self.code.new_label();
        self.context.resume_points.push(resume);
        self.emit(Instruction::Yield(self.context.resume_points.len()));
        self.code.bind(resume);
        Ok(())
    }

    /// Compiles a `def` into its `NewFunction` or `NewGenerator` instruction.
    fn function(&mut self, name: &str, params: &[String], body: &Block, position: CodeRange) -> CompileResult<Pending> {
        let generator = contains_yield(body);
        let kind = if generator {
            ContextKind::Generator
        } else {
            ContextKind::Function
        };
        let bytes = self.in_context(kind, |c| {
            c.sub_block(position, |c| {
                if !generator {
                    return c.statements(body);
                }
                let table = c.emit(Instruction::ResumeTable(Vec::new()));
                c.statements(body)?;
                let targets = mem::take(&mut c.context.resume_points);
                c.code.patch(table, Instruction::ResumeTable(targets));
                Ok(())
            })
        })?;
        let def = FunctionDef {
            name: name.to_owned(),
            params: params.to_vec(),
            body: bytes,
        };
        Ok(if generator {
            Instruction::NewGenerator(def)
        } else {
            Instruction::NewFunction(def)
        })
    }

    fn class_def(&mut self, name: &str, bases: &[ExprLoc], body: &Block, position: CodeRange) -> CompileResult<()> {
        self.sequence(bases)?;
        let body = self.in_context(ContextKind::Class, |c| c.block_bytes(body, position))?;
        self.emit(Instruction::NewClass {
            name: name.to_owned(),
            bases: bases.len(),
            body,
        });
        self.store_name(name);
        Ok(())
    }

    fn try_statement(&mut self, t: &Try, position: CodeRange) -> CompileResult<()> {
        self.context.try_depth += 1;
        let result = self.try_def(t, position);
        self.context.try_depth -= 1;
        self.emit(Instruction::Try(result?));
        Ok(())
    }

    fn try_def(&mut self, t: &Try, position: CodeRange) -> CompileResult<TryDef<Vec<u8>>> {
        let body = self.block_bytes(&t.body, position)?;
        let mut handlers = Vec::with_capacity(t.handlers.len());
        for handler in &t.handlers {
            let targets = match handler.targets.as_slice() {
                [] => None,
                [single] => Some(self.expr_bytes(single)?),
                several => Some(self.sub_block(position, |c| {
                    c.sequence(several)?;
                    c.emit(Instruction::NewTuple(several.len()));
                    Ok(())
                })?),
            };
            handlers.push(Handler {
                targets,
                receiver: handler.receiver.clone(),
                body: self.block_bytes(&handler.body, position)?,
            });
        }
        let else_block = match &t.orelse {
            Some(block) => Some(self.block_bytes(block, position)?),
            None => None,
        };
        let finally = match &t.finally {
            Some(block) => Some(self.block_bytes(block, position)?),
            None => None,
        };
        Ok(TryDef {
            body,
            handlers,
            else_block,
            finally,
        })
    }

    fn switch(&mut self, subject: &ExprLoc, cases: &[(Vec<ExprLoc>, Block)], default: Option<&Block>) -> CompileResult<()> {
        let temp = self.hidden_name("switch");
        self.expr(subject)?;
        self.emit(Instruction::Assign(temp.clone()));

        let end = self.code.new_label();
        let labels: Vec<JumpLabel> = cases.iter().map(|_| self.code.new_label()).collect();
        for ((values, _), label) in cases.iter().zip(&labels) {
            for value in values {
                self.emit(Instruction::Identifier(temp.clone()));
                self.emit(Instruction::Push);
                self.expr(value)?;
                self.emit(Instruction::Binary(BinaryOp::Equals));
                self.emit(Instruction::JumpIfTrue(*label));
            }
        }
        if let Some(default) = default {
            self.statements(default)?;
        }
        self.emit(Instruction::Jump(end));
        for ((_, body), label) in cases.iter().zip(labels) {
            self.code.bind(label);
            self.statements(body)?;
            self.emit(Instruction::Jump(end));
        }
        self.code.bind(end);
        Ok(())
    }

    // --- expressions ---

    /// Evaluates each expression and pushes it.
    fn sequence(&mut self, items: &[ExprLoc]) -> CompileResult<()> {
        for item in items {
            self.expr(item)?;
            self.emit(Instruction::Push);
        }
        Ok(())
    }

    /// Compiles `expr`, leaving its value in the register.
    fn expr(&mut self, expr: &ExprLoc) -> CompileResult<()> {
        match &expr.expr {
            Expr::None => {
                self.emit(Instruction::NewNone);
            }
            Expr::Bool(true) => {
                self.emit(Instruction::NewTrue);
            }
            Expr::Bool(false) => {
                self.emit(Instruction::NewFalse);
            }
            Expr::Int(i) => {
                self.emit(Instruction::NewInt(*i));
            }
            Expr::Float(f) => {
                self.emit(Instruction::NewFloat(*f));
            }
            Expr::Str(s) => {
                self.emit(Instruction::NewString(s.clone()));
            }
            Expr::Bytes(b) => {
                self.emit(Instruction::NewBytes(b.clone()));
            }
            Expr::Name(name) => {
                self.emit(Instruction::Identifier(name.clone()));
            }
            Expr::Array(items) => {
                self.sequence(items)?;
                self.emit(Instruction::NewArray(items.len()));
            }
            Expr::Tuple(items) => {
                self.sequence(items)?;
                self.emit(Instruction::NewTuple(items.len()));
            }
            Expr::Hash(pairs) => {
                for (key, value) in pairs {
                    self.expr(key)?;
                    self.emit(Instruction::Push);
                    self.expr(value)?;
                    self.emit(Instruction::Push);
                }
                self.emit(Instruction::NewHash(pairs.len()));
            }
            Expr::Binary { op, left, right } => {
                self.expr(left)?;
                self.emit(Instruction::Push);
                self.expr(right)?;
                self.emit(Instruction::Binary(*op));
            }
            Expr::Unary { op, operand } => {
                self.expr(operand)?;
                self.emit(Instruction::Unary(*op));
            }
            Expr::And(left, right) => self.short_circuit(left, right, false)?,
            Expr::Or(left, right) => self.short_circuit(left, right, true)?,
            Expr::Conditional { test, body, orelse } => {
                let otherwise = self.code.new_label();
                let end = self.code.new_label();
                self.expr(test)?;
                self.emit(Instruction::JumpIfFalse(otherwise));
                self.expr(body)?;
                self.emit(Instruction::Jump(end));
                self.code.bind(otherwise);
                self.expr(orelse)?;
                self.code.bind(end);
            }
            Expr::Call { callee, args } => {
                self.expr(callee)?;
                self.emit(Instruction::Push);
                self.sequence(args)?;
                self.emit(Instruction::Call(args.len()));
            }
            Expr::Index { target, index } => {
                self.expr(target)?;
                self.emit(Instruction::Push);
                self.expr(index)?;
                self.emit(Instruction::Index);
            }
            Expr::Selector { target, name } => {
                self.expr(target)?;
                self.emit(Instruction::Selector(name.clone()));
            }
            Expr::Lambda { params, body } => {
                let bytes = self.in_context(ContextKind::Function, |c| {
                    c.sub_block(body.position, |c| {
                        c.expr(body)?;
                        c.emit(Instruction::Return);
                        Ok(())
                    })
                })?;
                self.emit(Instruction::NewFunction(FunctionDef {
                    name: LAMBDA_NAME.to_owned(),
                    params: params.clone(),
                    body: bytes,
                }));
            }
        }
        Ok(())
    }

    /// `and` / `or`: the left value stays in the register when it decides the result.
    fn short_circuit(&mut self, left: &ExprLoc, right: &ExprLoc, is_or: bool) -> CompileResult<()> {
        let end = self.code.new_label();
        self.expr(left)?;
        self.emit(if is_or {
            Instruction::JumpIfTrue(end)
        } else {
            Instruction::JumpIfFalse(end)
        });
        self.expr(right)?;
        self.code.bind(end);
        Ok(())
    }
}

fn check_target(target: &ExprLoc) -> CompileResult<()> {
    match &target.expr {
        Expr::Name(_) | Expr::Selector { .. } | Expr::Index { .. } => Ok(()),
        _ => Err(invalid_target(target)),
    }
}

fn invalid_target(target: &ExprLoc) -> ParseError {
    ParseError::new("invalid assignment target", target.position)
}

/// Whether `block` yields, not counting nested function and class bodies.
fn contains_yield(block: &Block) -> bool {
    block.iter().any(|stmt| node_yields(&stmt.node))
}

fn node_yields(node: &Node) -> bool {
    match node {
        Node::Yield(_) => true,
        Node::If { branches, orelse } => {
            branches.iter().any(|(_, body)| contains_yield(body)) || orelse.as_ref().is_some_and(contains_yield)
        }
        Node::While { body, .. } | Node::For { body, .. } | Node::Begin(body) => contains_yield(body),
        Node::Try(t) => {
            contains_yield(&t.body)
                || t.handlers.iter().any(|handler| contains_yield(&handler.body))
                || t.orelse.as_ref().is_some_and(contains_yield)
                || t.finally.as_ref().is_some_and(contains_yield)
        }
        Node::Switch { cases, default, .. } => {
            cases.iter().any(|(_, body)| contains_yield(body)) || default.as_ref().is_some_and(contains_yield)
        }
        Node::Defer(inner) => node_yields(&inner.node),
        Node::FunctionDef { .. }
        | Node::ClassDef { .. }
        | Node::Expr(_)
        | Node::Assign { .. }
        | Node::AugAssign { .. }
        | Node::NonLocal(_)
        | Node::Return(_)
        | Node::Raise(_)
        | Node::Break
        | Node::Continue
        | Node::Redo
        | Node::Pass => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn compile(source: &str) -> Result<Code, ScriptError> {
        compile_module(&parse(source)?)
    }

    fn compile_error(source: &str) -> String {
        compile(source).unwrap_err().message().to_owned()
    }

    #[test]
    fn module_value_is_last_expression() {
        let listing = compile("1 + 2").unwrap().disassemble();
        assert!(listing.contains("Binary"), "{listing}");
        let listing = compile("x = 1").unwrap().disassemble();
        assert!(listing.trim_end().ends_with("NewNone"), "{listing}");
    }

    #[test]
    fn compile_errors() {
        assert!(compile_error("break").starts_with("'break' outside loop at line 1"));
        assert!(compile_error("def f()\n  redo\nend").starts_with("'redo' outside loop"));
        assert!(compile_error("return 1").starts_with("'return' outside function"));
        assert!(compile_error("yield 1").starts_with("'yield' outside function"));
        assert!(compile_error("nonlocal x").starts_with("nonlocal declaration at module level"));
        assert!(compile_error("1 = 2").starts_with("invalid assignment target"));
        assert!(compile_error("f() += 1").starts_with("invalid assignment target"));
        assert!(compile_error("class A\n  return 1\nend").starts_with("'return' outside function"));
    }

    #[test]
    fn generator_restrictions() {
        assert!(compile_error("def g()\n  try\n    yield 1\n  finally\n    pass\n  end\nend")
            .starts_with("'yield' inside 'try'"));
        assert!(compile_error("def g()\n  defer print(1)\n  yield 1\nend").starts_with("'defer' inside a generator"));
        assert!(compile_error(
            "def g()\n  while True\n    try\n      break\n    except\n      pass\n    end\n    yield 1\n  end\nend"
        )
        .starts_with("'break' inside 'try' cannot leave a generator loop"));
        // a loop wholly inside the try is fine
        assert!(compile("def g()\n  try\n    while True\n      break\n    end\n  finally\n    pass\n  end\n  yield 1\nend").is_ok());
    }

    #[test]
    fn generators_compile_flat() {
        let listing = compile("def g()\n  for i in range(3)\n    yield i\n  end\nend").unwrap().disassemble();
        assert!(listing.contains("NewGenerator"), "{listing}");
        assert!(listing.contains("ResumeTable"), "{listing}");
        assert!(listing.contains("Yield"), "{listing}");
        assert!(!listing.contains("For"), "{listing}");
    }

    #[test]
    fn yield_only_counts_in_its_own_body() {
        let module = parse("def f()\n  def g()\n    yield 1\n  end\n  return g\nend").unwrap();
        let Node::FunctionDef { body, .. } = &module.body[0].node else {
            panic!("expected def")
        };
        assert!(!contains_yield(body));
    }
}
