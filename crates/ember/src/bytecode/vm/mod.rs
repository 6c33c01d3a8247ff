//! Bytecode execution engine.
//!
//! The engine is a state machine over a stack of [`Frame`]s. Each frame owns a stack of
//! blocks: code cursors and the loop/try controllers that pushed them. One step either
//! decodes and executes the next instruction of the top cursor, pops an exhausted cursor,
//! steps the controller that is now on top (its child completed normally), or completes
//! the frame once its block stack is empty.
//!
//! Abrupt completions (`break`, `continue`, `redo`, `return` and raised errors) are handled
//! by [`Vm::unwind`], which pops blocks until a controller or the frame boundary takes
//! responsibility for them.
//!
//! Value-producing instructions write the last-value register; `Push` moves it onto the
//! operand stack, which is shared by all frames and truncated to a frame's base when the
//! frame goes away.

mod binary;
mod call;
mod control;
mod exceptions;
mod protocol;

use std::rc::Rc;

pub(crate) use call::CallResult;
use control::LoopCtl;
use exceptions::TryCtl;

use crate::{
    bytecode::code::{Code, CodeError, Decoded, FunctionDef, Instruction},
    class::{ClassBody, ClassInfo, Segment},
    exception::{ErrorKind, RunError, RunResult},
    function::{Function, FunctionKind},
    magic::Magic,
    run::Vm,
    scope::{Scope, ScopeKind},
    types::hash,
    value::{TypeTag, Value},
};

/// What a frame is executing, and how it completes.
pub(crate) enum FrameKind {
    /// Top-level code; completes with the register.
    Module,
    /// A user function; falling off the end returns `None`.
    Function,
    /// Runs the prepared class segments against a new object, then its initializer.
    Constructor(Box<Construction>),
    /// One resumption of a generator, holding the generator value.
    Generator(Value),
}

pub(crate) struct Construction {
    object: Value,
    /// Initializer arguments, taken once every segment has run.
    args: Option<Vec<Value>>,
    segments: Rc<[Segment]>,
    next: usize,
}

/// A single activation record.
pub(crate) struct Frame {
    kind: FrameKind,
    scope: Scope,
    blocks: Vec<Block>,
    /// Operand stack height when the frame was pushed.
    stack_base: usize,
    /// Blocks registered by `defer`, with the scope they were registered in.
    defers: Vec<(Code, Scope)>,
    /// The completion held back while deferred blocks run.
    pending: Option<Completion>,
    name: Rc<str>,
}

impl Frame {
    pub(crate) fn new(kind: FrameKind, code: Code, scope: Scope, stack_base: usize, name: Rc<str>) -> Self {
        Self {
            kind,
            scope,
            blocks: vec![Block::Code(Cursor::new(code))],
            stack_base,
            defers: Vec::new(),
            pending: None,
            name,
        }
    }
}

enum Block {
    Code(Cursor),
    Loop(Box<LoopCtl>),
    Try(Box<TryCtl>),
}

struct Cursor {
    code: Code,
    ip: usize,
}

impl Cursor {
    fn new(code: Code) -> Self {
        Self { code, ip: 0 }
    }
}

/// An abrupt completion travelling outwards through blocks and frames.
pub(crate) enum Completion {
    Break,
    Continue,
    Redo,
    Return(Value),
    Raise(RunError),
}

/// Result of one engine step.
pub(crate) enum Flow {
    Continue,
    /// The frame the current run was started for has returned.
    Done(Value),
}

/// How a controller disposed of a completion during unwinding.
enum Unwound {
    /// A controller took over and pushed new work.
    Resumed,
    /// The frame returned; the step ends with this flow.
    Returned(Flow),
    /// Keep unwinding with this completion.
    Propagate(Completion),
}

fn no_frame() -> RunError {
    RunError::internal("no active frame")
}

fn corrupt(err: CodeError) -> RunError {
    RunError::internal(format!("corrupt bytecode: {err}"))
}

impl Vm {
    /// Populates the root scope: error classes, builtins and the built-in type values.
    pub(crate) fn bootstrap(&mut self) {
        self.install_error_classes();
        crate::builtins::install(self);
        for tag in <TypeTag as strum::IntoEnumIterator>::iter() {
            let value = self.types.type_value(tag).clone();
            self.root.set(&tag.to_string(), value);
        }
    }

    /// The canonical value of a built-in type, e.g. `Int`.
    pub(crate) fn type_value(&self, tag: TypeTag) -> &Value {
        self.types.type_value(tag)
    }

    /// Runs until the frame count drops back to `base`, returning that frame's result.
    pub(crate) fn run_until(&mut self, base: usize) -> RunResult<Value> {
        loop {
            let flow = match self.step(base) {
                Ok(flow) => flow,
                // the error already left the frame this run was started for
                Err(err) if self.frames.len() <= base => return Err(err),
                Err(err) => self.unwind(Completion::Raise(err), base)?,
            };
            if let Flow::Done(value) = flow {
                return Ok(value);
            }
        }
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) -> RunResult<()> {
        if self.frames.len() >= self.limits.max_depth {
            return Err(ErrorKind::recursion_error(self.limits.max_depth));
        }
        log::trace!("enter {} at depth {}", frame.name, self.frames.len());
        self.frames.push(frame);
        Ok(())
    }

    /// The scope of the running frame, or the module scope between executions.
    pub(crate) fn current_scope(&self) -> Scope {
        self.frames
            .last()
            .map_or_else(|| self.module.clone(), |frame| frame.scope.clone())
    }

    fn frame_mut(&mut self) -> RunResult<&mut Frame> {
        self.frames.last_mut().ok_or_else(no_frame)
    }

    fn set_scope(&mut self, scope: Scope) -> RunResult<()> {
        self.frame_mut()?.scope = scope;
        Ok(())
    }

    fn push_block(&mut self, block: Block) -> RunResult<()> {
        self.frame_mut()?.blocks.push(block);
        Ok(())
    }

    fn push_code(&mut self, code: Code) -> RunResult<()> {
        self.push_block(Block::Code(Cursor::new(code)))
    }

    fn pop(&mut self) -> RunResult<Value> {
        let base = self.frames.last().map_or(0, |frame| frame.stack_base);
        if self.stack.len() <= base {
            return Err(RunError::internal("operand stack underflow"));
        }
        self.stack.pop().ok_or_else(|| RunError::internal("operand stack underflow"))
    }

    fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        let base = self.frames.last().map_or(0, |frame| frame.stack_base);
        let Some(start) = self.stack.len().checked_sub(n).filter(|start| *start >= base) else {
            return Err(RunError::internal("operand stack underflow"));
        };
        Ok(self.stack.split_off(start))
    }

    fn step(&mut self, base: usize) -> RunResult<Flow> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let frame = self.frames.last_mut().ok_or_else(no_frame)?;
        let instr = match frame.blocks.last_mut() {
            None => return self.complete_frame(base),
            Some(Block::Loop(_)) => return self.step_loop(),
            Some(Block::Try(_)) => return self.step_try(base),
            Some(Block::Code(cursor)) => {
                if cursor.ip >= cursor.code.len() {
                    frame.blocks.pop();
                    return Ok(Flow::Continue);
                }
                let (instr, next) = cursor.code.decode_at(cursor.ip).map_err(corrupt)?;
                cursor.ip = next;
                instr
            }
        };
        self.execute_instruction(instr, base)
    }

    fn execute_instruction(&mut self, instr: Decoded, base: usize) -> RunResult<Flow> {
        match instr {
            Instruction::Nop => {}
            Instruction::Push => self.stack.push(self.register.clone()),
            Instruction::Pop => self.register = self.pop()?,
            Instruction::NewNone => self.register = Value::none(),
            Instruction::NewTrue => self.register = Value::bool(true),
            Instruction::NewFalse => self.register = Value::bool(false),
            Instruction::NewInt(i) => self.register = Value::int(i),
            Instruction::NewFloat(f) => self.register = Value::float(f),
            Instruction::NewString(s) => self.register = Value::string(s),
            Instruction::NewBytes(b) => self.register = Value::bytes(b),
            Instruction::NewArray(n) => {
                let items = self.pop_n(n)?;
                self.register = Value::array(items);
            }
            Instruction::NewTuple(n) => {
                let items = self.pop_n(n)?;
                self.register = Value::tuple(items);
            }
            Instruction::NewHash(n) => {
                let flat = self.pop_n(n.checked_mul(2).ok_or_else(|| RunError::internal("hash too large"))?)?;
                let mut pairs = Vec::with_capacity(n);
                let mut flat = flat.into_iter();
                while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                    pairs.push((key, value));
                }
                self.register = hash::from_pairs(self, pairs)?;
            }
            Instruction::Identifier(name) => self.register = self.current_scope().lookup(&name)?,
            Instruction::Assign(name) => self.current_scope().assign(&name, self.register.clone()),
            Instruction::AssignNonLocal(name) => {
                if !self.current_scope().assign_nonlocal(&name, self.register.clone()) {
                    return Err(ErrorKind::NameError.err(format!("no binding for nonlocal '{name}' found")));
                }
            }
            Instruction::Selector(name) => {
                let target = self.register.clone();
                self.register = self.get_attr(&target, &name)?;
            }
            Instruction::AssignSelector(name) => {
                let target = self.pop()?;
                target.set_attr(&name, self.register.clone());
            }
            Instruction::Index => {
                let container = self.pop()?;
                let index = self.register.clone();
                self.register = self.index(&container, index)?;
            }
            Instruction::AssignIndex => {
                let index = self.pop()?;
                let container = self.pop()?;
                let value = self.register.clone();
                self.assign_index(&container, index, value)?;
            }
            Instruction::Binary(op) => {
                let left = self.pop()?;
                let right = self.register.clone();
                self.register = self.binary(op, &left, &right)?;
            }
            Instruction::Unary(op) => {
                let operand = self.register.clone();
                self.register = self.unary(op, &operand)?;
            }
            Instruction::ToBool => {
                let value = self.register.clone();
                self.register = Value::bool(self.truthy(&value)?);
            }
            Instruction::Unpack(n) => {
                let value = self.register.clone();
                let items = self.collect(&value)?;
                if items.len() != n {
                    return Err(ErrorKind::unpack_error(n, items.len()));
                }
                self.stack.extend(items.into_iter().rev());
            }
            Instruction::Call(n) => {
                let args = self.pop_n(n)?;
                let callee = self.pop()?;
                if let CallResult::Value(value) = self.invoke(callee, args)? {
                    self.register = value;
                }
            }
            Instruction::Return => return self.unwind(Completion::Return(self.register.clone()), base),
            Instruction::NewFunction(def) => self.register = self.new_function(def, FunctionKind::Plain),
            Instruction::NewGenerator(def) => self.register = self.new_function(def, FunctionKind::Generator),
            Instruction::NewClass { name, bases, body } => {
                let bases = self.pop_n(bases)?;
                self.register = self.new_class(&name, bases, body)?;
            }
            Instruction::Jump(offset) => self.jump(offset)?,
            Instruction::JumpIfFalse(offset) => {
                let value = self.register.clone();
                if !self.truthy(&value)? {
                    self.jump(offset)?;
                }
            }
            Instruction::JumpIfTrue(offset) => {
                let value = self.register.clone();
                if self.truthy(&value)? {
                    self.jump(offset)?;
                }
            }
            Instruction::While { cond, body } => self.enter_loop(LoopCtl::conditional(cond, body, false))?,
            Instruction::Until { cond, body } => self.enter_loop(LoopCtl::conditional(cond, body, true))?,
            Instruction::For { receivers, body } => {
                let iterable = self.register.clone();
                let iterator = self.iter_of(&iterable)?;
                self.enter_loop(LoopCtl::each(iterator, receivers, body))?;
            }
            Instruction::Break => return self.unwind(Completion::Break, base),
            Instruction::Continue => return self.unwind(Completion::Continue, base),
            Instruction::Redo => return self.unwind(Completion::Redo, base),
            Instruction::Try(def) => {
                let ctl = TryCtl::new(def, self.current_scope(), self.stack.len());
                self.push_block(Block::Try(Box::new(ctl)))?;
            }
            Instruction::Raise => {
                let value = self.register.clone();
                return Err(self.raise_value(value)?);
            }
            Instruction::EnterBlock => {
                let frame = self.frame_mut()?;
                frame.scope = frame.scope.child(ScopeKind::Block);
            }
            Instruction::ExitBlock => {
                let frame = self.frame_mut()?;
                match frame.scope.parent() {
                    Some(parent) if frame.scope.kind() == ScopeKind::Block => frame.scope = parent,
                    _ => return Err(RunError::internal("ExitBlock without a matching EnterBlock")),
                }
            }
            Instruction::Defer(body) => {
                let frame = self.frame_mut()?;
                let scope = frame.scope.clone();
                frame.defers.push((body, scope));
            }
            Instruction::ResumeTable(targets) => self.resume_from(&targets)?,
            Instruction::Yield(point) => return self.yield_value(point, base),
        }
        Ok(Flow::Continue)
    }

    fn new_function(&self, def: FunctionDef<Code>, kind: FunctionKind) -> Value {
        Value::function(Function {
            name: def.name.into(),
            params: def.params.into(),
            body: def.body,
            closure: self.current_scope(),
            kind,
        })
    }

    fn new_class(&mut self, name: &str, bases: Vec<Value>, body: Code) -> RunResult<Value> {
        let mut classes = Vec::with_capacity(bases.len());
        for base in bases {
            if base.as_class().is_some() {
                classes.push(base);
            } else if base.as_type() == Some(TypeTag::Object) {
                // `class Foo(Object)` is the same as no base
            } else {
                return Err(ErrorKind::type_error(format!(
                    "cannot derive from {} '{}'",
                    base.type_name(),
                    self.display(&base)?
                )));
            }
        }
        let info = ClassInfo::new(name, classes, ClassBody::Code(body), self.current_scope());
        Ok(Value::class(info))
    }

    /// Moves the top cursor by a relative offset from the end of the current instruction.
    fn jump(&mut self, offset: isize) -> RunResult<()> {
        let Some(Block::Code(cursor)) = self.frame_mut()?.blocks.last_mut() else {
            return Err(RunError::internal("jump outside a code block"));
        };
        let target = isize::try_from(cursor.ip)
            .ok()
            .and_then(|ip| ip.checked_add(offset))
            .and_then(|target| usize::try_from(target).ok())
            .filter(|target| *target <= cursor.code.len())
            .ok_or_else(|| RunError::internal(format!("jump by {offset} leaves its block")))?;
        cursor.ip = target;
        Ok(())
    }

    /// Unwinds `completion` until a controller absorbs it or it leaves the run's base frame.
    fn unwind(&mut self, completion: Completion, base: usize) -> RunResult<Flow> {
        let mut completion = match completion {
            Completion::Raise(err) if !err.is_catchable() => {
                self.abort(base);
                return Err(err);
            }
            other => other,
        };
        loop {
            let block = self.frame_mut()?.blocks.pop();
            let unwound = match block {
                None => self.leave_frame(completion, base)?,
                Some(Block::Code(_)) => Unwound::Propagate(completion),
                Some(Block::Loop(ctl)) => self.unwind_loop(ctl, completion)?,
                Some(Block::Try(ctl)) => self.unwind_try(ctl, completion)?,
            };
            match unwound {
                Unwound::Resumed => return Ok(Flow::Continue),
                Unwound::Returned(flow) => return Ok(flow),
                Unwound::Propagate(next) => completion = next,
            }
        }
    }

    /// Drops every frame above `base` without running handlers, finally blocks or defers.
    fn abort(&mut self, base: usize) {
        if let Some(frame) = self.frames.get(base) {
            self.stack.truncate(frame.stack_base);
        }
        self.frames.truncate(base);
    }

    /// Leaves the current frame with `completion`, running its deferred blocks first.
    fn leave_frame(&mut self, completion: Completion, base: usize) -> RunResult<Unwound> {
        let frame = self.frame_mut()?;
        if let Some((code, scope)) = frame.defers.pop() {
            frame.pending = Some(completion);
            frame.scope = scope;
            frame.blocks.push(Block::Code(Cursor::new(code)));
            return Ok(Unwound::Resumed);
        }
        match completion {
            Completion::Return(value) => self.finish_frame(value, base).map(Unwound::Returned),
            Completion::Raise(err) => {
                let frame = self.frames.pop().ok_or_else(no_frame)?;
                self.stack.truncate(frame.stack_base);
                if let FrameKind::Generator(gen) = &frame.kind {
                    if let Some(state) = gen.as_generator() {
                        state.done.set(true);
                    }
                }
                if self.frames.len() <= base {
                    Err(err)
                } else {
                    Ok(Unwound::Propagate(Completion::Raise(err)))
                }
            }
            Completion::Break | Completion::Continue | Completion::Redo => {
                Err(RunError::internal("loop control escaped its frame"))
            }
        }
    }

    /// Pops the current frame and delivers `value` to its caller.
    fn finish_frame(&mut self, value: Value, base: usize) -> RunResult<Flow> {
        let frame = self.frames.pop().ok_or_else(no_frame)?;
        self.stack.truncate(frame.stack_base);
        let value = match &frame.kind {
            FrameKind::Generator(gen) => {
                if let Some(state) = gen.as_generator() {
                    state.done.set(true);
                }
                Value::none()
            }
            _ => value,
        };
        if self.frames.len() <= base {
            Ok(Flow::Done(value))
        } else {
            self.register = value;
            Ok(Flow::Continue)
        }
    }

    /// Called when the frame's block stack is empty.
    fn complete_frame(&mut self, base: usize) -> RunResult<Flow> {
        let frame = self.frames.last_mut().ok_or_else(no_frame)?;
        let completion = match frame.pending.take() {
            Some(pending) => pending,
            None => match &frame.kind {
                FrameKind::Module => Completion::Return(self.register.clone()),
                FrameKind::Function | FrameKind::Generator(_) => Completion::Return(Value::none()),
                FrameKind::Constructor(_) => return self.step_constructor(base),
            },
        };
        self.settle(completion, base)
    }

    /// Leaves the frame with `completion` outside of an unwind in progress.
    fn settle(&mut self, completion: Completion, base: usize) -> RunResult<Flow> {
        match self.leave_frame(completion, base)? {
            Unwound::Resumed => Ok(Flow::Continue),
            Unwound::Returned(flow) => Ok(flow),
            Unwound::Propagate(next) => self.unwind(next, base),
        }
    }

    /// Runs the next class segment or the initializer, or delivers the finished object.
    fn step_constructor(&mut self, base: usize) -> RunResult<Flow> {
        loop {
            let frame = self.frames.last_mut().ok_or_else(no_frame)?;
            let FrameKind::Constructor(construction) = &mut frame.kind else {
                return Err(RunError::internal("constructor step on a non-constructor frame"));
            };
            let object = construction.object.clone();
            if let Some(segment) = construction.segments.get(construction.next).cloned() {
                construction.next += 1;
                match segment.body {
                    ClassBody::Code(code) => {
                        if let Some(scope) = object.attrs() {
                            frame.scope = scope.clone();
                        }
                        frame.blocks.push(Block::Code(Cursor::new(code)));
                        return Ok(Flow::Continue);
                    }
                    ClassBody::Native(body) => body(self, &object)?,
                    ClassBody::Empty => {}
                }
                continue;
            }
            if let Some(args) = construction.args.take() {
                match self.find_attr(&object, Magic::Init.name()) {
                    Some(init) => {
                        if let CallResult::Pushed = self.invoke(init, args)? {
                            return Ok(Flow::Continue);
                        }
                    }
                    None if !args.is_empty() => {
                        return Err(ErrorKind::construction_error(&object.type_name(), args.len()));
                    }
                    None => {}
                }
                continue;
            }
            return self.settle(Completion::Return(object), base);
        }
    }

    /// Executes `ResumeTable`: jumps to the stored resume point of the running generator.
    fn resume_from(&mut self, targets: &[isize]) -> RunResult<()> {
        let frame = self.frame_mut()?;
        let FrameKind::Generator(gen) = &frame.kind else {
            return Err(RunError::internal("resume table outside a generator"));
        };
        let point = gen
            .as_generator()
            .map(|state| state.resume.get())
            .ok_or_else(|| RunError::internal("generator frame without generator state"))?;
        if point == 0 {
            return Ok(());
        }
        let offset = *targets
            .get(point - 1)
            .ok_or_else(|| RunError::internal(format!("resume point {point} out of range")))?;
        self.jump(offset)
    }

    /// Executes `Yield`: parks the register in the generator and suspends its frame.
    fn yield_value(&mut self, point: usize, base: usize) -> RunResult<Flow> {
        let frame = self.frames.pop().ok_or_else(no_frame)?;
        self.stack.truncate(frame.stack_base);
        let FrameKind::Generator(gen) = &frame.kind else {
            return Err(RunError::internal("yield outside a generator"));
        };
        let state = gen
            .as_generator()
            .ok_or_else(|| RunError::internal("generator frame without generator state"))?;
        *state.buffered.borrow_mut() = Some(self.register.clone());
        state.resume.set(point);
        if self.frames.len() <= base {
            Ok(Flow::Done(Value::none()))
        } else {
            self.register = Value::none();
            Ok(Flow::Continue)
        }
    }
}
