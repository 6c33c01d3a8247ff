//! Native iterators.
//!
//! Iterators returned by built-in `__iter__` slots and by `range`. They answer
//! `__has_next__` and `__next__` without running script code; an exhausted iterator's
//! `__next__` returns `None`.

use super::{hash::TablePin, slot};
use crate::{
    exception::{ErrorKind, RunResult},
    function::Arity,
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::Value,
};

#[derive(Debug)]
pub(crate) enum NativeIter {
    Range { next: i64, stop: i64, step: i64 },
    /// Elements of an array or tuple. Arrays are read live, so appends during iteration
    /// are seen.
    Items { source: Value, index: usize },
    Chars { chars: Vec<char>, index: usize },
    Bytes { source: Value, index: usize },
    /// Keys of a hash in insertion order. The pin keeps entry indexes stable, so keys
    /// deleted during iteration do not shift the ones still to come.
    Keys { source: Value, index: usize, _pin: TablePin },
}

impl NativeIter {
    /// A `range` iterator. A zero step is a `ValueError`.
    pub fn range(start: i64, stop: i64, step: i64) -> RunResult<Self> {
        if step == 0 {
            return Err(ErrorKind::value_error("range() step must not be zero"));
        }
        Ok(Self::Range { next: start, stop, step })
    }

    pub fn has_next(&self) -> bool {
        match self {
            Self::Range { next, stop, step } => {
                if *step > 0 {
                    next < stop
                } else {
                    next > stop
                }
            }
            Self::Items { source, index } => *index < sequence_len(source),
            Self::Chars { chars, index } => *index < chars.len(),
            Self::Bytes { source, index } => source.as_bytes().is_some_and(|b| *index < b.len()),
            Self::Keys { source, index, .. } => source.as_hash().is_some_and(|table| {
                let table = table.borrow();
                (*index..table.slots()).any(|i| table.entry(i).is_some())
            }),
        }
    }

    pub fn next_value(&mut self) -> Option<Value> {
        if !self.has_next() {
            return None;
        }
        match self {
            Self::Range { next, step, .. } => {
                let current = *next;
                // stepping past i64 bounds ends the range
                *next = next.checked_add(*step).unwrap_or(if *step > 0 { i64::MAX } else { i64::MIN });
                Some(Value::int(current))
            }
            Self::Items { source, index } => {
                let item = match (source.as_array(), source.as_tuple()) {
                    (Some(items), _) => items.borrow().get(*index).cloned(),
                    (_, Some(items)) => items.get(*index).cloned(),
                    _ => None,
                };
                *index += 1;
                item
            }
            Self::Chars { chars, index } => {
                let c = chars[*index];
                *index += 1;
                Some(Value::string(c.to_string()))
            }
            Self::Bytes { source, index } => {
                let byte = source.as_bytes().and_then(|b| b.get(*index).copied());
                *index += 1;
                byte.map(|b| Value::int(i64::from(b)))
            }
            Self::Keys { source, index, .. } => {
                let table = source.as_hash()?.borrow();
                while *index < table.slots() {
                    let entry = table.entry(*index);
                    *index += 1;
                    if let Some((key, _)) = entry {
                        return Some(key);
                    }
                }
                None
            }
        }
    }
}

fn sequence_len(source: &Value) -> usize {
    match (source.as_array(), source.as_tuple()) {
        (Some(items), _) => items.borrow().len(),
        (_, Some(items)) => items.len(),
        _ => 0,
    }
}

fn state(this: &Value) -> RunResult<&std::cell::RefCell<NativeIter>> {
    this.as_iterator()
        .ok_or_else(|| ErrorKind::type_error(format!("expected Iterator, got {}", this.type_name())))
}

fn iter(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(this.clone())
}

fn has_next(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(state(this)?.borrow().has_next()))
}

fn next(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(state(this)?.borrow_mut().next_value().unwrap_or_else(Value::none))
}

pub(crate) fn install(table: &Scope) {
    slot(table, Magic::Iter, Arity::Exact(0), iter);
    slot(table, Magic::HasNext, Arity::Exact(0), has_next);
    slot(table, Magic::Next, Arity::Exact(0), next);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut iter: NativeIter) -> Vec<i64> {
        std::iter::from_fn(|| iter.next_value()).filter_map(|v| v.as_int()).collect()
    }

    #[test]
    fn ranges() {
        assert_eq!(drain(NativeIter::range(0, 3, 1).unwrap()), [0, 1, 2]);
        assert_eq!(drain(NativeIter::range(5, 0, -2).unwrap()), [5, 3, 1]);
        assert!(drain(NativeIter::range(3, 0, 1).unwrap()).is_empty());
        assert!(NativeIter::range(0, 1, 0).is_err());
    }

    #[test]
    fn array_items_are_live() {
        let array = Value::array(vec![Value::int(1)]);
        let mut iter = NativeIter::Items {
            source: array.clone(),
            index: 0,
        };
        assert_eq!(iter.next_value().and_then(|v| v.as_int()), Some(1));
        assert!(!iter.has_next());
        array.as_array().unwrap().borrow_mut().push(Value::int(2));
        assert_eq!(iter.next_value().and_then(|v| v.as_int()), Some(2));
        assert!(iter.next_value().is_none());
    }

    #[test]
    fn bytes_yield_ints() {
        let iter = NativeIter::Bytes {
            source: Value::bytes(b"AB".to_vec()),
            index: 0,
        };
        assert_eq!(drain(iter), [65, 66]);
    }
}
