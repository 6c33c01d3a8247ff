//! Classes and class preparation.
//!
//! A class is a name, an ordered list of base classes and a body. Instantiating a class
//! runs every body in its prepared list against a fresh object scope, so attributes and
//! methods of all bases land in the object's own table before the class's own body
//! overrides them.

use std::{cell::OnceCell, rc::Rc};

use ahash::AHashSet;

use crate::{bytecode::Code, exception::RunResult, run::Vm, scope::Scope, value::Value};

/// Native class body, run against the new object.
pub(crate) type NativeSegment = fn(&mut Vm, &Value) -> RunResult<()>;

#[derive(Clone)]
pub(crate) enum ClassBody {
    Code(Code),
    Native(NativeSegment),
    Empty,
}

/// One step of instantiation: a body together with the class that declared it.
#[derive(Clone)]
pub(crate) struct Segment {
    pub body: ClassBody,
    pub class: Value,
}

pub struct ClassInfo {
    name: Rc<str>,
    bases: Vec<Value>,
    body: ClassBody,
    /// Scope the class statement ran in; object scopes resolve globals through it.
    scope: Scope,
    prepared: OnceCell<Rc<[Segment]>>,
}

impl ClassInfo {
    pub(crate) fn new(name: &str, bases: Vec<Value>, body: ClassBody, scope: Scope) -> Self {
        Self {
            name: name.into(),
            bases,
            body,
            scope,
            prepared: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bases(&self) -> &[Value] {
        &self.bases
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The flattened body list of `class`: each base base-first in declaration order,
    /// then the class's own body. A class reachable through several bases appears once.
    ///
    /// Computed on first use and shared by every later instantiation.
    pub(crate) fn prepared(&self, class: &Value) -> Rc<[Segment]> {
        Rc::clone(self.prepared.get_or_init(|| {
            let mut seen = AHashSet::new();
            let mut segments = Vec::new();
            flatten(class, &mut seen, &mut segments);
            log::debug!("prepared class {} with {} segment(s)", self.name, segments.len());
            segments.into()
        }))
    }

    /// Whether this class is `target` or derives from it, searching bases depth-first.
    pub(crate) fn implements(&self, this: &Value, target: &Value) -> bool {
        if this.is(target) {
            return true;
        }
        self.bases
            .iter()
            .any(|base| base.as_class().is_some_and(|info| info.implements(base, target)))
    }
}

fn flatten(class: &Value, seen: &mut AHashSet<u64>, out: &mut Vec<Segment>) {
    let Some(info) = class.as_class() else { return };
    if !seen.insert(class.id()) {
        return;
    }
    for base in &info.bases {
        flatten(base, seen, out);
    }
    if !matches!(info.body, ClassBody::Empty) {
        out.push(Segment {
            body: info.body.clone(),
            class: class.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeKind;

    fn noop(_: &mut Vm, _: &Value) -> RunResult<()> {
        Ok(())
    }

    fn class(name: &str, bases: Vec<Value>) -> Value {
        let scope = Scope::new(ScopeKind::Module, None);
        Value::class(ClassInfo::new(name, bases, ClassBody::Native(noop), scope))
    }

    fn names(class: &Value) -> Vec<String> {
        let info = class.as_class().unwrap();
        info.prepared(class)
            .iter()
            .map(|s| s.class.class_name().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn bases_run_first_in_declaration_order() {
        let a = class("A", vec![]);
        let b = class("B", vec![a.clone()]);
        let c = class("C", vec![]);
        let d = class("D", vec![b, c]);
        assert_eq!(names(&d), ["A", "B", "C", "D"]);
    }

    #[test]
    fn diamond_bases_appear_once() {
        let base = class("Base", vec![]);
        let left = class("Left", vec![base.clone()]);
        let right = class("Right", vec![base.clone()]);
        let child = class("Child", vec![left, right]);
        assert_eq!(names(&child), ["Base", "Left", "Right", "Child"]);
    }

    #[test]
    fn preparation_is_memoized() {
        let a = class("A", vec![]);
        let info = a.as_class().unwrap();
        assert!(Rc::ptr_eq(&info.prepared(&a), &info.prepared(&a)));
    }

    #[test]
    fn implements_walks_bases() {
        let a = class("A", vec![]);
        let b = class("B", vec![a.clone()]);
        let other = class("Other", vec![]);
        let info = b.as_class().unwrap();
        assert!(info.implements(&b, &a));
        assert!(info.implements(&b, &b));
        assert!(!info.implements(&b, &other));
    }
}
