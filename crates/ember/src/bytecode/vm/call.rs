//! Calling convention.
//!
//! Natives run to completion on the Rust stack. Script functions and class instantiation
//! push a frame and let the dispatch loop run it; `CallResult::Pushed` tells the `Call`
//! instruction that the result will arrive in the register when that frame returns.

use super::{Construction, Frame, FrameKind};
use crate::{
    exception::{ErrorKind, RunError, RunResult},
    function::{Function, FunctionKind},
    magic::Magic,
    run::Vm,
    scope::{Scope, ScopeKind},
    types::{generator::GeneratorState, r#type},
    value::{Data, Value},
};

pub(crate) enum CallResult {
    /// The callee finished and produced a value.
    Value(Value),
    /// A frame was pushed; its result will be delivered to the register.
    Pushed,
}

impl Vm {
    /// Starts a call of `callee` from the running frame.
    pub(crate) fn invoke(&mut self, callee: Value, args: Vec<Value>) -> RunResult<CallResult> {
        let mut callee = callee;
        for _ in 0..=self.limits.max_call_retries {
            match callee.data() {
                Data::Native(native) => {
                    return match native.call(self, &args) {
                        Err(RunError::Unsupported) => Err(ErrorKind::type_error(format!(
                            "unsupported argument type(s) for {}()",
                            native.name
                        ))),
                        other => other.map(CallResult::Value),
                    };
                }
                Data::Function(function) => return self.call_function(function.clone(), args),
                Data::Type(tag) => return r#type::construct(self, *tag, &args).map(CallResult::Value),
                Data::Class(_) => return self.instantiate(&callee, args),
                _ => {}
            }
            match self.find_attr(&callee, Magic::Call.name()) {
                Some(slot) => callee = slot,
                None => return Err(ErrorKind::not_callable(&callee.type_name())),
            }
        }
        Err(ErrorKind::type_error(format!(
            "'{}' object is not callable: __call__ nests deeper than {}",
            callee.type_name(),
            self.limits.max_call_retries
        )))
    }

    /// Calls `callee` and runs it to completion, for natives that call back into scripts.
    ///
    /// The register is preserved across the call.
    pub(crate) fn call(&mut self, callee: Value, args: Vec<Value>) -> RunResult<Value> {
        let base = self.frames.len();
        let saved = self.register.clone();
        let result = match self.invoke(callee, args) {
            Ok(CallResult::Value(value)) => Ok(value),
            Ok(CallResult::Pushed) => self.run_until(base),
            Err(err) => Err(err),
        };
        self.register = saved;
        result
    }

    /// Calls a magic-method slot found on `value`; `None` when the slot does not exist.
    pub(crate) fn call_slot(&mut self, value: &Value, slot: Magic, args: Vec<Value>) -> RunResult<Option<Value>> {
        match self.find_attr(value, slot.name()) {
            Some(func) => self.call(func, args).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`Vm::call`], but native slots may answer `Unsupported` so binary dispatch can
    /// fall through to the reflected slot.
    pub(crate) fn call_operator(&mut self, func: Value, args: Vec<Value>) -> RunResult<Value> {
        if let Some(native) = func.as_native() {
            return native.call(self, &args);
        }
        self.call(func, args)
    }

    fn call_function(&mut self, function: Function, args: Vec<Value>) -> RunResult<CallResult> {
        function.check_arity(args.len())?;
        let scope = Scope::function(function.closure.clone(), Some(self.current_scope()));
        for (param, arg) in function.params.iter().zip(args) {
            scope.set(param, arg);
        }
        if function.kind == FunctionKind::Generator {
            return Ok(CallResult::Value(Value::generator(GeneratorState::new(function, scope))));
        }
        let frame = Frame::new(
            FrameKind::Function,
            function.body.clone(),
            scope,
            self.stack.len(),
            function.name.clone(),
        );
        self.push_frame(frame)?;
        Ok(CallResult::Pushed)
    }

    /// Creates an object of `class` and pushes the frame that runs its class bodies.
    fn instantiate(&mut self, class: &Value, args: Vec<Value>) -> RunResult<CallResult> {
        let info = class
            .as_class()
            .ok_or_else(|| RunError::internal("instantiate on a non-class"))?;
        let segments = info.prepared(class);
        let object = self.blank_object(class)?;
        let scope = object
            .attrs()
            .cloned()
            .ok_or_else(|| RunError::internal("object without a scope"))?;
        let name = info.name().into();
        let construction = Construction {
            object,
            args: Some(args),
            segments,
            next: 0,
        };
        let frame = Frame {
            kind: FrameKind::Constructor(Box::new(construction)),
            scope,
            blocks: Vec::new(),
            stack_base: self.stack.len(),
            defers: Vec::new(),
            pending: None,
            name,
        };
        self.push_frame(frame)?;
        Ok(CallResult::Pushed)
    }

    /// An object of `class` with `self` bound and nothing else. Its scope resolves free
    /// names through the scope the class was defined in.
    pub(super) fn blank_object(&self, class: &Value) -> RunResult<Value> {
        let info = class
            .as_class()
            .ok_or_else(|| ErrorKind::type_error(format!("'{}' is not a class", class.type_name())))?;
        let scope = Scope::new(ScopeKind::Object, Some(info.scope().clone()));
        let object = Value::object(class.clone(), scope.clone());
        scope.set("self", object.clone());
        Ok(object)
    }

    /// Runs a generator's body until its next `yield` or its end.
    pub(crate) fn resume_generator(&mut self, generator: &Value) -> RunResult<()> {
        let state = generator
            .as_generator()
            .ok_or_else(|| RunError::internal("resume on a non-generator"))?;
        let frame = Frame::new(
            FrameKind::Generator(generator.clone()),
            state.function.body.clone(),
            state.scope.clone(),
            self.stack.len(),
            state.function.name.clone(),
        );
        let base = self.frames.len();
        self.push_frame(frame)?;
        let saved = self.register.clone();
        let result = self.run_until(base);
        self.register = saved;
        result.map(|_| ())
    }
}
