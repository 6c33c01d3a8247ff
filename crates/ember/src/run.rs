//! Public interface for running Ember code.
use std::io::{BufRead, Write};

use crate::{
    bytecode::{
        compiler::compile_module,
        vm::{Frame, FrameKind},
        Code,
    },
    exception::{ErrorKind, RunError, ScriptError},
    io::Streams,
    parse::parse,
    resource::{CancelHandle, ResourceLimits},
    scope::{Scope, ScopeKind},
    types::TypeTables,
    value::Value,
};

/// Compiles source text into a module code block.
///
/// # Errors
/// Returns a `SyntaxError` [`ScriptError`] carrying the line and column of the first
/// problem. [`ScriptError::is_incomplete`] is set when the input simply ended too early.
pub fn compile(source: &str) -> Result<Code, ScriptError> {
    let module = parse(source)?;
    compile_module(&module)
}

/// An Ember virtual machine bound to its input, output and error streams.
///
/// Bindings made by executed code persist in the module scope across calls to
/// [`Vm::execute`], including calls that failed or were cancelled.
///
/// # Example
/// ```
/// use ember::{CollectOutput, Vm};
///
/// let out = CollectOutput::new();
/// let mut vm = Vm::new(std::io::empty(), out.clone(), std::io::sink());
/// vm.execute_string("a = 1\nb = 2\nprint(a + b)").unwrap();
/// assert_eq!(out.contents(), "3\n");
/// ```
pub struct Vm {
    /// Operand stack shared by all frames.
    pub(crate) stack: Vec<Value>,
    /// Last-value register.
    pub(crate) register: Value,
    pub(crate) frames: Vec<Frame>,
    pub(crate) root: Scope,
    pub(crate) module: Scope,
    pub(crate) types: TypeTables,
    /// Built-in error classes, indexed by [`ErrorKind`].
    pub(crate) errors: Vec<Value>,
    pub(crate) io: Streams,
    pub(crate) limits: ResourceLimits,
    pub(crate) cancel: CancelHandle,
    /// Ids of containers currently being rendered, to cut `repr` cycles.
    pub(crate) repr_guard: Vec<u64>,
}

impl Vm {
    /// Creates a VM with default [`ResourceLimits`].
    pub fn new(input: impl BufRead + 'static, output: impl Write + 'static, error: impl Write + 'static) -> Self {
        Self::with_limits(input, output, error, ResourceLimits::default())
    }

    pub fn with_limits(
        input: impl BufRead + 'static,
        output: impl Write + 'static,
        error: impl Write + 'static,
        limits: ResourceLimits,
    ) -> Self {
        let root = Scope::new(ScopeKind::Root, None);
        let module = root.child(ScopeKind::Module);
        let mut vm = Self {
            stack: Vec::with_capacity(64),
            register: Value::none(),
            frames: Vec::with_capacity(16),
            root,
            module,
            types: TypeTables::new(),
            errors: Vec::new(),
            io: Streams::new(input, output, error),
            limits,
            cancel: CancelHandle::default(),
            repr_guard: Vec::new(),
        };
        vm.bootstrap();
        log::debug!(
            "vm ready: {} root bindings, max depth {}",
            vm.root.len(),
            vm.limits.max_depth
        );
        vm
    }

    /// Registers a host-provided value in the root scope, visible to all later code.
    pub fn load(&mut self, name: &str, factory: impl FnOnce(&mut Vm) -> Value) {
        let value = factory(self);
        log::debug!("host load: {name} ({})", value.type_name());
        self.root.set(name, value);
    }

    /// Runs a compiled module to completion and returns the value of its last expression
    /// statement.
    ///
    /// # Errors
    /// Returns the uncaught script error, or an `InternalError` for corrupt bytecode.
    pub fn execute(&mut self, code: &Code) -> Result<Value, ScriptError> {
        self.cancel.reset();
        self.register = Value::none();
        log::trace!("execute: {} bytes", code.len());
        let frame = Frame::new(FrameKind::Module, code.clone(), self.module.clone(), 0, "<module>".into());
        self.frames.push(frame);
        let result = self.run_until(0);
        self.frames.clear();
        self.stack.clear();
        self.repr_guard.clear();
        match result {
            Ok(value) => {
                log::trace!("execute finished");
                Ok(value)
            }
            Err(RunError::Cancelled) => {
                log::debug!("execution cancelled");
                Err(RunError::Cancelled.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Validates raw bytecode, then executes it.
    ///
    /// # Errors
    /// A malformed buffer is reported as a `CodeError` without running anything.
    pub fn execute_bytes(&mut self, bytes: &[u8]) -> Result<Value, ScriptError> {
        let code = Code::new(bytes.to_vec()).map_err(|err| ScriptError::new("CodeError", err.to_string()))?;
        self.execute(&code)
    }

    /// Compiles and executes source text.
    ///
    /// # Errors
    /// Syntax errors and uncaught runtime errors.
    pub fn execute_string(&mut self, source: &str) -> Result<Value, ScriptError> {
        let code = compile(source)?;
        self.execute(&code)
    }

    /// A handle that cancels the running execution from another thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Calls a script or native callable from the host.
    ///
    /// # Errors
    /// Any error the callee raises.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, ScriptError> {
        let depth = self.frames.len();
        let stack = self.stack.len();
        let result = self.call(callee.clone(), args);
        self.frames.truncate(depth);
        self.stack.truncate(stack);
        result.map_err(ScriptError::from)
    }

    /// Looks up a module-level or root binding.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<Value> {
        self.module.find(name)
    }

    /// Renders `value` the way `repr()` does, running user `__repr__` slots.
    ///
    /// # Errors
    /// Any error raised by a user slot.
    pub fn repr_value(&mut self, value: &Value) -> Result<String, ScriptError> {
        let depth = self.frames.len();
        let stack = self.stack.len();
        let result = self.repr(value);
        self.frames.truncate(depth);
        self.stack.truncate(stack);
        result.map_err(ScriptError::from)
    }

    /// Writes an error report (`TypeName: message`) to the error stream.
    pub fn report(&mut self, err: &ScriptError) {
        if let Err(io_err) = self.io.write_err(&format!("{err}\n")) {
            log::warn!("failed to write error report: {io_err}");
        }
    }

    /// The built-in class value for an engine error kind.
    pub(crate) fn error_class(&self, kind: ErrorKind) -> &Value {
        &self.errors[kind as usize]
    }

    /// Flushes buffered output.
    ///
    /// # Errors
    /// An I/O failure of the output stream.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.io.flush_out()
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("frames", &self.frames.len())
            .field("stack", &self.stack.len())
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}
