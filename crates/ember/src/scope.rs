//! Symbol tables and the scope chain.
//!
//! A [`Scope`] is a shared, insertion-ordered name table with up to two parents: the
//! lexical `parent` and, for function scopes, a `call_parent` pointing at the closure
//! scope. Name resolution prefers the call parent, so a function body sees the scope it
//! was defined in rather than the scope it was called from.
//!
//! Borrows of the underlying `RefCell` are never held across calls into the engine:
//! every accessor clones values out.

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    exception::{ErrorKind, RunResult},
    value::Value,
};

type SymbolMap = IndexMap<String, Value, ahash::RandomState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Builtins and host registrations.
    Root,
    Module,
    Function,
    /// `begin ... end` blocks and `for` iterations.
    Block,
    /// Attribute table of an object or value.
    Object,
}

struct ScopeInner {
    kind: ScopeKind,
    symbols: SymbolMap,
    parent: Option<Scope>,
    call_parent: Option<Scope>,
}

#[derive(Clone)]
pub struct Scope(Rc<RefCell<ScopeInner>>);

impl Scope {
    pub fn new(kind: ScopeKind, parent: Option<Scope>) -> Self {
        Self(Rc::new(RefCell::new(ScopeInner {
            kind,
            symbols: SymbolMap::default(),
            parent,
            call_parent: None,
        })))
    }

    /// Scope for one function invocation: resolves through `closure`, records `caller`.
    pub fn function(closure: Scope, caller: Option<Scope>) -> Self {
        let scope = Self::new(ScopeKind::Function, caller);
        scope.0.borrow_mut().call_parent = Some(closure);
        scope
    }

    pub fn child(&self, kind: ScopeKind) -> Self {
        Self::new(kind, Some(self.clone()))
    }

    pub fn kind(&self) -> ScopeKind {
        self.0.borrow().kind
    }

    pub fn parent(&self) -> Option<Scope> {
        self.0.borrow().parent.clone()
    }

    /// The next scope consulted by name resolution.
    fn next(&self) -> Option<Scope> {
        let inner = self.0.borrow();
        inner.call_parent.clone().or_else(|| inner.parent.clone())
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.0.borrow().symbols.get(name).cloned()
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.0.borrow().symbols.contains_key(name)
    }

    /// Resolves `name` through the chain, or `None`.
    pub fn find(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self.clone());
        while let Some(current) = scope {
            if let Some(value) = current.get_local(name) {
                return Some(value);
            }
            scope = current.next();
        }
        None
    }

    /// Resolves `name` through the chain; a miss is a `NameError`.
    pub fn lookup(&self, name: &str) -> RunResult<Value> {
        self.find(name).ok_or_else(|| ErrorKind::name_error(name))
    }

    /// Binds in this table unconditionally.
    pub fn set(&self, name: &str, value: Value) {
        let mut inner = self.0.borrow_mut();
        if let Some(slot) = inner.symbols.get_mut(name) {
            *slot = value;
        } else {
            inner.symbols.insert(name.to_owned(), value);
        }
    }

    /// Ordinary assignment.
    ///
    /// Rebinds an existing name found in this scope or in enclosing block scopes, stopping
    /// at the first non-block scope. Otherwise binds in this scope.
    pub fn assign(&self, name: &str, value: Value) {
        let mut scope = self.clone();
        loop {
            if scope.contains_local(name) {
                scope.set(name, value);
                return;
            }
            if scope.kind() != ScopeKind::Block {
                break;
            }
            match scope.next() {
                Some(next) => scope = next,
                None => break,
            }
        }
        self.set(name, value);
    }

    /// `nonlocal` assignment: rebinds the nearest binding outside the current function.
    ///
    /// Returns false when there is no enclosing function or no such binding. The root
    /// scope is never written.
    pub fn assign_nonlocal(&self, name: &str, value: Value) -> bool {
        // leave the current function
        let mut scope = self.clone();
        while scope.kind() == ScopeKind::Block {
            match scope.next() {
                Some(next) => scope = next,
                None => return false,
            }
        }
        if scope.kind() != ScopeKind::Function {
            return false;
        }
        let mut outer = scope.next();
        while let Some(current) = outer {
            if current.kind() == ScopeKind::Root {
                return false;
            }
            if current.contains_local(name) {
                current.set(name, value);
                return true;
            }
            outer = current.next();
        }
        false
    }

    /// Names bound in this table, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.0.borrow().symbols.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().symbols.len()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Scope")
            .field("kind", &inner.kind)
            .field("names", &inner.symbols.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(scope: &Scope, name: &str) -> Option<i64> {
        scope.find(name).and_then(|v| v.as_int())
    }

    #[test]
    fn lookup_prefers_closure_over_caller() {
        let root = Scope::new(ScopeKind::Root, None);
        let module = root.child(ScopeKind::Module);
        module.set("x", Value::int(1));
        let caller = module.child(ScopeKind::Function);
        caller.set("x", Value::int(2));
        let call = Scope::function(module.clone(), Some(caller));
        assert_eq!(int(&call, "x"), Some(1));
        assert!(call.lookup("missing").is_err());
    }

    #[test]
    fn assign_rebinds_through_blocks_only() {
        let module = Scope::new(ScopeKind::Module, None);
        module.set("x", Value::int(1));
        let block = module.child(ScopeKind::Block);
        block.assign("x", Value::int(2));
        assert_eq!(int(&module, "x"), Some(2));
        assert!(!block.contains_local("x"));

        let call = Scope::function(module.clone(), None);
        call.assign("x", Value::int(3));
        assert_eq!(int(&module, "x"), Some(2));
        assert_eq!(call.get_local("x").and_then(|v| v.as_int()), Some(3));

        block.assign("y", Value::int(4));
        assert!(block.contains_local("y"));
        assert!(!module.contains_local("y"));
    }

    #[test]
    fn nonlocal_skips_current_function() {
        let root = Scope::new(ScopeKind::Root, None);
        root.set("print", Value::none());
        let module = root.child(ScopeKind::Module);
        let outer = Scope::function(module.clone(), None);
        outer.set("count", Value::int(0));
        let inner = Scope::function(outer.clone(), None);
        inner.set("count", Value::int(99));
        let block = inner.child(ScopeKind::Block);
        assert!(block.assign_nonlocal("count", Value::int(1)));
        assert_eq!(int(&outer, "count"), Some(1));
        assert_eq!(inner.get_local("count").and_then(|v| v.as_int()), Some(99));
        assert!(!inner.assign_nonlocal("print", Value::int(0)));
        assert!(!module.assign_nonlocal("count", Value::int(0)));
    }

    #[test]
    fn names_keep_insertion_order() {
        let scope = Scope::new(ScopeKind::Object, None);
        scope.set("b", Value::none());
        scope.set("a", Value::none());
        scope.set("b", Value::int(1));
        assert_eq!(scope.names(), ["b", "a"]);
        assert_eq!(scope.len(), 2);
    }
}
