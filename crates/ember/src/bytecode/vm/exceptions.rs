//! Error classes, error materialization and the `try` controller.
//!
//! Engine errors travel as [`RunError::Exc`] until a handler needs to look at them; only
//! then are they turned into objects of the matching built-in error class. The built-in
//! classes share one native body, installed on `Error` and inherited by every subclass
//! (script classes included) through class preparation.

use std::mem;

use strum::IntoEnumIterator;

use super::{Block, Completion, Cursor, Flow, Unwound};
use crate::{
    bytecode::{Code, TryDef},
    class::{ClassBody, ClassInfo},
    exception::{ErrorKind, RunError, RunResult, SimpleError},
    function::{Arity, MethodFn, NativeFunction, NativeImpl},
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::Value,
};

pub(super) struct TryCtl {
    def: TryDef<Code>,
    phase: TryPhase,
    scope: Scope,
    stack_len: usize,
}

enum TryPhase {
    Start,
    Body,
    /// Evaluating the targets of handler `index` against `error`.
    Matching {
        error: Value,
        index: usize,
    },
    Handler,
    Else,
    /// Running `finally`; the completion to resume afterwards, if any.
    Finally(Option<Completion>),
}

impl TryCtl {
    pub(super) fn new(def: TryDef<Code>, scope: Scope, stack_len: usize) -> Self {
        Self {
            def,
            phase: TryPhase::Start,
            scope,
            stack_len,
        }
    }
}

/// Native body of the `Error` class.
fn error_body(_: &mut Vm, object: &Value) -> RunResult<()> {
    install(object, Magic::Init, Arity::Range(0, 1), error_init);
    install(object, Magic::String, Arity::Exact(0), error_string);
    install(object, Magic::Repr, Arity::Exact(0), error_repr);
    object.set_attr("message", Value::string(""));
    Ok(())
}

fn install(object: &Value, slot: Magic, arity: Arity, func: MethodFn) {
    let native = NativeFunction::new(slot.name(), arity, NativeImpl::Method(func));
    object.set_attr(slot.name(), Value::from_native(native));
}

fn error_init(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let message = match args.first() {
        Some(message) => vm.display(message)?,
        None => String::new(),
    };
    this.set_attr("message", Value::string(message));
    Ok(Value::none())
}

fn message(vm: &mut Vm, this: &Value) -> RunResult<String> {
    match this.get_own("message") {
        Some(message) => vm.display(&message),
        None => Ok(String::new()),
    }
}

fn error_string(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let message = message(vm, this)?;
    let name = this.type_name();
    Ok(Value::string(if message.is_empty() {
        name
    } else {
        format!("{name}: {message}")
    }))
}

fn error_repr(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let message = message(vm, this)?;
    let name = this.type_name();
    Ok(Value::string(format!(
        "{name}({})",
        crate::types::str::string_repr(&message)
    )))
}

impl Vm {
    /// Creates the built-in error classes and binds them in the root scope.
    pub(super) fn install_error_classes(&mut self) {
        let mut classes: Vec<Value> = Vec::new();
        for kind in ErrorKind::iter() {
            let bases: Vec<Value> = kind
                .parent()
                .and_then(|parent| classes.get(parent as usize).cloned())
                .into_iter()
                .collect();
            let body = if kind == ErrorKind::Error {
                ClassBody::Native(error_body)
            } else {
                ClassBody::Empty
            };
            let class = Value::class(ClassInfo::new(kind.name(), bases, body, self.root.clone()));
            self.root.set(kind.name(), class.clone());
            classes.push(class);
        }
        self.errors = classes;
    }

    /// Builds an error object of a built-in kind without running any script code.
    pub(crate) fn new_error(&mut self, kind: ErrorKind, message: &str) -> RunResult<Value> {
        let class = self.error_class(kind).clone();
        let object = self.blank_object(&class)?;
        let segments = class
            .as_class()
            .map(|info| info.prepared(&class))
            .ok_or_else(|| RunError::internal("error class is not a class"))?;
        for segment in segments.iter() {
            if let ClassBody::Native(body) = segment.body {
                body(self, &object)?;
            }
        }
        object.set_attr("message", Value::string(message));
        Ok(object)
    }

    /// Turns a catchable error into the value a handler sees.
    fn materialize(&mut self, err: RunError) -> RunResult<Value> {
        match err {
            RunError::Value(value) => Ok(value),
            RunError::Exc(SimpleError { kind, message }) => self.new_error(kind, &message),
            RunError::Unsupported => self.new_error(ErrorKind::TypeError, "unsupported operand type(s)"),
            RunError::Internal(_) | RunError::Cancelled => Err(err),
        }
    }

    /// Executes `raise`: instantiates a raised class, then checks the value is an error.
    pub(super) fn raise_value(&mut self, value: Value) -> RunResult<RunError> {
        let value = if value.as_class().is_some() {
            self.call(value, Vec::new())?
        } else {
            value
        };
        if !self.implements(&value, self.error_class(ErrorKind::Error))? {
            return Ok(ErrorKind::type_error(format!(
                "exceptions must derive from Error, not {}",
                value.type_name()
            )));
        }
        Ok(RunError::Value(value))
    }

    fn restore_try(&mut self, ctl: &TryCtl) -> RunResult<()> {
        self.stack.truncate(ctl.stack_len);
        self.set_scope(ctl.scope.clone())
    }

    /// Steps the `try` on top of the block stack after its child finished normally.
    pub(super) fn step_try(&mut self, base: usize) -> RunResult<Flow> {
        let Some(Block::Try(mut ctl)) = self.frame_mut()?.blocks.pop() else {
            return Err(RunError::internal("expected a try block"));
        };
        self.restore_try(&ctl)?;
        let unwound = match mem::replace(&mut ctl.phase, TryPhase::Start) {
            TryPhase::Start => {
                let body = ctl.def.body.clone();
                ctl.phase = TryPhase::Body;
                self.push_block(Block::Try(ctl))?;
                self.push_code(body)?;
                Unwound::Resumed
            }
            TryPhase::Body => match ctl.def.else_block.clone() {
                Some(else_block) => {
                    ctl.phase = TryPhase::Else;
                    self.push_block(Block::Try(ctl))?;
                    self.push_code(else_block)?;
                    Unwound::Resumed
                }
                None => self.enter_finally(ctl, None)?,
            },
            TryPhase::Matching { error, index } => {
                let target = self.register.clone();
                match self.implements(&error, &target) {
                    Ok(true) => self.enter_handler(ctl, index, error)?,
                    Ok(false) => self.match_handlers(ctl, error, index + 1)?,
                    Err(err) => self.enter_finally(ctl, Some(Completion::Raise(err)))?,
                }
            }
            TryPhase::Handler | TryPhase::Else => self.enter_finally(ctl, None)?,
            TryPhase::Finally(pending) => match pending {
                Some(completion) => Unwound::Propagate(completion),
                None => Unwound::Resumed,
            },
        };
        match unwound {
            Unwound::Resumed => Ok(Flow::Continue),
            Unwound::Returned(flow) => Ok(flow),
            Unwound::Propagate(completion) => self.unwind(completion, base),
        }
    }

    /// Applies an abrupt completion to a `try` being unwound through.
    pub(super) fn unwind_try(&mut self, mut ctl: Box<TryCtl>, completion: Completion) -> RunResult<Unwound> {
        self.restore_try(&ctl)?;
        match mem::replace(&mut ctl.phase, TryPhase::Start) {
            TryPhase::Start | TryPhase::Body => match completion {
                Completion::Raise(err) => {
                    let error = self.materialize(err)?;
                    self.match_handlers(ctl, error, 0)
                }
                other => self.enter_finally(ctl, Some(other)),
            },
            TryPhase::Matching { .. } | TryPhase::Handler | TryPhase::Else => {
                self.enter_finally(ctl, Some(completion))
            }
            // the pending completion is replaced
            TryPhase::Finally(_) => Ok(Unwound::Propagate(completion)),
        }
    }

    /// Tries handlers from `start` on; falls through to `finally` with the error pending.
    fn match_handlers(&mut self, mut ctl: Box<TryCtl>, error: Value, start: usize) -> RunResult<Unwound> {
        match ctl.def.handlers.get(start).map(|handler| handler.targets.clone()) {
            None => self.enter_finally(ctl, Some(Completion::Raise(RunError::Value(error)))),
            Some(None) => self.enter_handler(ctl, start, error),
            Some(Some(targets)) => {
                ctl.phase = TryPhase::Matching { error, index: start };
                self.push_block(Block::Try(ctl))?;
                self.push_code(targets)?;
                Ok(Unwound::Resumed)
            }
        }
    }

    fn enter_handler(&mut self, mut ctl: Box<TryCtl>, index: usize, error: Value) -> RunResult<Unwound> {
        let handler = ctl
            .def
            .handlers
            .get(index)
            .ok_or_else(|| RunError::internal("handler index out of range"))?;
        if let Some(receiver) = &handler.receiver {
            ctl.scope.assign(receiver, error);
        }
        let body = handler.body.clone();
        ctl.phase = TryPhase::Handler;
        self.push_block(Block::Try(ctl))?;
        self.push_block(Block::Code(Cursor::new(body)))?;
        Ok(Unwound::Resumed)
    }

    fn enter_finally(&mut self, mut ctl: Box<TryCtl>, pending: Option<Completion>) -> RunResult<Unwound> {
        let Some(finally) = ctl.def.finally.clone() else {
            return Ok(match pending {
                Some(completion) => Unwound::Propagate(completion),
                None => Unwound::Resumed,
            });
        };
        ctl.phase = TryPhase::Finally(pending);
        self.push_block(Block::Try(ctl))?;
        self.push_code(finally)?;
        Ok(Unwound::Resumed)
    }
}
