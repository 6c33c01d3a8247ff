//! Loop controllers and the iteration protocol.
//!
//! A loop instruction pushes a [`LoopCtl`] block and lets the dispatch loop step it. The
//! controller pushes its condition or body as a child cursor; when the child runs out the
//! controller is on top again and decides what comes next.

use super::{Block, Completion, Cursor, Flow, Unwound};
use crate::{
    bytecode::Code,
    exception::{ErrorKind, RunError, RunResult},
    magic::Magic,
    run::Vm,
    scope::{Scope, ScopeKind},
    value::Value,
};

pub(super) struct LoopCtl {
    kind: LoopKind,
    phase: Phase,
    /// Scope and stack height to restore on every pass.
    scope: Scope,
    stack_len: usize,
}

pub(super) enum LoopKind {
    Conditional {
        cond: Code,
        body: Code,
        /// `until` loops run while the condition is false.
        until: bool,
    },
    Each {
        iterator: Value,
        receivers: Vec<String>,
        body: Code,
        /// Scope of the current iteration, reused by `redo`.
        iteration: Option<Scope>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Condition,
    Body,
}

impl LoopCtl {
    pub(super) fn conditional(cond: Code, body: Code, until: bool) -> LoopKind {
        LoopKind::Conditional { cond, body, until }
    }

    pub(super) fn each(iterator: Value, receivers: Vec<String>, body: Code) -> LoopKind {
        LoopKind::Each {
            iterator,
            receivers,
            body,
            iteration: None,
        }
    }

    fn body(&self) -> &Code {
        match &self.kind {
            LoopKind::Conditional { body, .. } | LoopKind::Each { body, .. } => body,
        }
    }
}

impl Vm {
    /// Pushes a loop controller that runs against the current scope and stack height.
    pub(super) fn enter_loop(&mut self, kind: LoopKind) -> RunResult<()> {
        let ctl = LoopCtl {
            kind,
            phase: Phase::Start,
            scope: self.current_scope(),
            stack_len: self.stack.len(),
        };
        self.push_block(Block::Loop(Box::new(ctl)))
    }

    /// Puts the frame back into the state the loop started in.
    fn restore_loop(&mut self, ctl: &LoopCtl) -> RunResult<()> {
        self.stack.truncate(ctl.stack_len);
        self.set_scope(ctl.scope.clone())
    }

    /// Steps the loop on top of the block stack after its child finished normally.
    pub(super) fn step_loop(&mut self) -> RunResult<Flow> {
        let Some(Block::Loop(mut ctl)) = self.frame_mut()?.blocks.pop() else {
            return Err(RunError::internal("expected a loop block"));
        };
        self.restore_loop(&ctl)?;
        match (&ctl.kind, ctl.phase) {
            (LoopKind::Conditional { cond, .. }, Phase::Start | Phase::Body) => {
                let cond = cond.clone();
                ctl.phase = Phase::Condition;
                self.push_block(Block::Loop(ctl))?;
                self.push_code(cond)?;
            }
            (LoopKind::Conditional { body, until, .. }, Phase::Condition) => {
                let value = self.register.clone();
                if self.truthy(&value)? != *until {
                    let body = body.clone();
                    ctl.phase = Phase::Body;
                    self.push_block(Block::Loop(ctl))?;
                    self.push_code(body)?;
                } else {
                    self.register = Value::none();
                }
            }
            (LoopKind::Each { .. }, _) => self.advance_each(ctl)?,
        }
        Ok(Flow::Continue)
    }

    /// Binds the next item and runs the body, or ends the loop.
    fn advance_each(&mut self, mut ctl: Box<LoopCtl>) -> RunResult<()> {
        let LoopKind::Each {
            iterator,
            receivers,
            body,
            iteration,
        } = &mut ctl.kind
        else {
            return Err(RunError::internal("expected a for loop"));
        };
        let iterator = iterator.clone();
        let Some(item) = self.iter_next(&iterator)? else {
            self.register = Value::none();
            return Ok(());
        };
        let scope = ctl.scope.child(ScopeKind::Block);
        self.bind_receivers(&scope, receivers, item)?;
        *iteration = Some(scope.clone());
        let body = body.clone();
        ctl.phase = Phase::Body;
        self.push_block(Block::Loop(ctl))?;
        self.set_scope(scope)?;
        self.push_code(body)
    }

    fn bind_receivers(&mut self, scope: &Scope, receivers: &[String], item: Value) -> RunResult<()> {
        if let [name] = receivers {
            scope.set(name, item);
            return Ok(());
        }
        let values = self.collect(&item)?;
        if values.len() != receivers.len() {
            return Err(ErrorKind::unpack_error(receivers.len(), values.len()));
        }
        for (name, value) in receivers.iter().zip(values) {
            scope.set(name, value);
        }
        Ok(())
    }

    /// Applies a loop-control completion to a loop being unwound through.
    pub(super) fn unwind_loop(&mut self, mut ctl: Box<LoopCtl>, completion: Completion) -> RunResult<Unwound> {
        match completion {
            Completion::Break => {
                self.restore_loop(&ctl)?;
                self.register = Value::none();
                Ok(Unwound::Resumed)
            }
            Completion::Continue => {
                self.restore_loop(&ctl)?;
                ctl.phase = Phase::Body;
                self.push_block(Block::Loop(ctl))?;
                Ok(Unwound::Resumed)
            }
            Completion::Redo => {
                self.restore_loop(&ctl)?;
                let scope = match &ctl.kind {
                    LoopKind::Each {
                        iteration: Some(scope), ..
                    } => scope.clone(),
                    _ => ctl.scope.clone(),
                };
                let body = ctl.body().clone();
                ctl.phase = Phase::Body;
                self.push_block(Block::Loop(ctl))?;
                self.set_scope(scope)?;
                self.push_block(Block::Code(Cursor::new(body)))?;
                Ok(Unwound::Resumed)
            }
            other => Ok(Unwound::Propagate(other)),
        }
    }

    /// `__iter__` of `value`.
    pub(crate) fn iter_of(&mut self, value: &Value) -> RunResult<Value> {
        self.call_slot(value, Magic::Iter, Vec::new())?
            .ok_or_else(|| ErrorKind::not_iterable(&value.type_name()))
    }

    /// The next item of an iterator, or `None` once `__has_next__` turns false.
    pub(crate) fn iter_next(&mut self, iterator: &Value) -> RunResult<Option<Value>> {
        if let Some(native) = iterator.as_iterator() {
            return Ok(native.borrow_mut().next_value());
        }
        let Some(has_next) = self.call_slot(iterator, Magic::HasNext, Vec::new())? else {
            return Err(not_an_iterator(iterator));
        };
        if !self.truthy(&has_next)? {
            return Ok(None);
        }
        self.call_slot(iterator, Magic::Next, Vec::new())?
            .map(Some)
            .ok_or_else(|| not_an_iterator(iterator))
    }

    /// Drains an iterable into a vector.
    pub(crate) fn collect(&mut self, iterable: &Value) -> RunResult<Vec<Value>> {
        if let Some(items) = iterable.to_vec() {
            return Ok(items);
        }
        let iterator = self.iter_of(iterable)?;
        let mut items = Vec::new();
        while let Some(item) = self.iter_next(&iterator)? {
            items.push(item);
        }
        Ok(items)
    }
}

fn not_an_iterator(value: &Value) -> RunError {
    ErrorKind::type_error(format!("'{}' object is not an iterator", value.type_name()))
}
