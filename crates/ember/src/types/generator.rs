//! Generator objects.
//!
//! A generator owns a persistent scope and a resume point into its flat-compiled body.
//! `__has_next__` and `__next__` share a one-value lookahead buffer: `__has_next__` runs the
//! body up to the next `yield` and parks the value, `__next__` hands it out.

use std::cell::{Cell, RefCell};

use super::slot;
use crate::{
    exception::{ErrorKind, RunResult},
    function::{Arity, Function},
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::Value,
};

pub(crate) struct GeneratorState {
    pub function: Function,
    pub scope: Scope,
    /// Index into the body's resume table.
    pub resume: Cell<usize>,
    pub buffered: RefCell<Option<Value>>,
    pub done: Cell<bool>,
    pub running: Cell<bool>,
}

impl GeneratorState {
    pub fn new(function: Function, scope: Scope) -> Self {
        Self {
            function,
            scope,
            resume: Cell::new(0),
            buffered: RefCell::new(None),
            done: Cell::new(false),
            running: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

impl std::fmt::Debug for GeneratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorState")
            .field("name", &self.function.name)
            .field("resume", &self.resume.get())
            .field("done", &self.done.get())
            .finish_non_exhaustive()
    }
}

fn state(this: &Value) -> RunResult<&GeneratorState> {
    this.as_generator()
        .ok_or_else(|| ErrorKind::type_error(format!("expected Generator, got {}", this.type_name())))
}

/// Fills the lookahead buffer unless it is full or the generator is exhausted.
fn fill(vm: &mut Vm, this: &Value) -> RunResult<()> {
    let gen = state(this)?;
    if gen.done.get() || gen.buffered.borrow().is_some() {
        return Ok(());
    }
    if gen.running.get() {
        return Err(ErrorKind::value_error(format!("generator {} is already running", gen.name())));
    }
    gen.running.set(true);
    let result = vm.resume_generator(this);
    gen.running.set(false);
    if result.is_err() {
        // a generator that raised cannot be resumed
        gen.done.set(true);
    }
    result
}

fn iter(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(this.clone())
}

fn has_next(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    fill(vm, this)?;
    Ok(Value::bool(state(this)?.buffered.borrow().is_some()))
}

fn next(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    fill(vm, this)?;
    Ok(state(this)?.buffered.borrow_mut().take().unwrap_or_else(Value::none))
}

pub(crate) fn install(t: &Scope) {
    slot(t, Magic::Iter, Arity::Exact(0), iter);
    slot(t, Magic::HasNext, Arity::Exact(0), has_next);
    slot(t, Magic::Next, Arity::Exact(0), next);
}
