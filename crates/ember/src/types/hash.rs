//! The Hash container.
//!
//! Entries live in a `Vec` in insertion order, with removed entries left as tombstones so
//! indexes stay stable. A bucket map groups entry indexes by the key's `__hash__` value.
//! Tombstones are compacted away on removal, but never while a key iterator is live,
//! since iterators walk the table by entry index.
//! Key comparison goes through `__equals__`, which may call back into script code, so
//! bucket candidates are copied out before any comparison runs.

use std::{cell::Cell, hash::Hash, rc::Rc};

use super::{iter::NativeIter, method, slot};
use crate::{
    exception::{ErrorKind, RunResult},
    function::Arity,
    magic::Magic,
    run::Vm,
    scope::Scope,
    value::Value,
};

/// Fixed seeds so built-in hashes are stable across runs.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Hashes a built-in value, mixing in a per-type discriminator.
pub(crate) fn builtin_hash(discriminator: u8, value: impl Hash) -> u64 {
    let state = ahash::RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]);
    state.hash_one((discriminator, value))
}

#[derive(Debug, Clone)]
struct HashEntry {
    hash: u64,
    key: Value,
    value: Value,
}

/// Count of live key iterators over one table.
///
/// A copied table starts unpinned.
#[derive(Debug, Default)]
struct Readers(Rc<Cell<usize>>);

impl Clone for Readers {
    fn clone(&self) -> Self {
        Self::default()
    }
}

/// Held by a key iterator; entry indexes stay stable until every pin is dropped.
#[derive(Debug)]
pub(crate) struct TablePin(Rc<Cell<usize>>);

impl Drop for TablePin {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct HashTable {
    buckets: hashbrown::HashMap<u64, Vec<usize>, ahash::RandomState>,
    entries: Vec<Option<HashEntry>>,
    live: usize,
    readers: Readers,
}

impl HashTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn pin(&self) -> TablePin {
        let readers = &self.readers.0;
        readers.set(readers.get() + 1);
        TablePin(Rc::clone(readers))
    }

    fn pinned(&self) -> bool {
        self.readers.0.get() > 0
    }

    /// Number of entry slots, tombstones included. Bounds iteration by index.
    pub fn slots(&self) -> usize {
        self.entries.len()
    }

    /// The live entry at `index`.
    pub fn entry(&self, index: usize) -> Option<(Value, Value)> {
        self.entries
            .get(index)
            .and_then(Option::as_ref)
            .map(|e| (e.key.clone(), e.value.clone()))
    }

    fn candidates(&self, hash: u64) -> Vec<(usize, Value)> {
        self.buckets
            .get(&hash)
            .into_iter()
            .flatten()
            .filter_map(|&index| self.entries[index].as_ref().map(|e| (index, e.key.clone())))
            .collect()
    }

    fn push(&mut self, hash: u64, key: Value, value: Value) {
        let index = self.entries.len();
        self.entries.push(Some(HashEntry { hash, key, value }));
        self.buckets.entry(hash).or_default().push(index);
        self.live += 1;
    }

    fn set_value(&mut self, index: usize, value: Value) -> bool {
        match self.entries.get_mut(index).and_then(Option::as_mut) {
            Some(entry) => {
                entry.value = value;
                true
            }
            None => false,
        }
    }

    fn remove_at(&mut self, index: usize) -> Option<Value> {
        let entry = self.entries.get_mut(index)?.take()?;
        if let Some(bucket) = self.buckets.get_mut(&entry.hash) {
            bucket.retain(|&i| i != index);
            if bucket.is_empty() {
                self.buckets.remove(&entry.hash);
            }
        }
        self.live -= 1;
        if !self.pinned() && self.entries.len() > 32 && self.entries.len() > 2 * self.live {
            self.compact();
        }
        Some(entry.value)
    }

    fn compact(&mut self) {
        let entries: Vec<HashEntry> = self.entries.drain(..).flatten().collect();
        self.buckets.clear();
        self.live = 0;
        for entry in entries {
            self.push(entry.hash, entry.key, entry.value);
        }
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        if self.pinned() {
            self.entries.iter_mut().for_each(|entry| *entry = None);
        } else {
            self.entries.clear();
        }
        self.live = 0;
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().flatten().map(|e| e.key.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().flatten().map(|e| e.value.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries
            .iter()
            .flatten()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }
}

fn table(value: &Value) -> RunResult<&std::cell::RefCell<HashTable>> {
    value
        .as_hash()
        .ok_or_else(|| ErrorKind::type_error(format!("expected Hash, got {}", value.type_name())))
}

/// Finds the entry index of `key`, returning the key's hash as well.
fn find(vm: &mut Vm, hash_value: &Value, key: &Value) -> RunResult<(u64, Option<usize>)> {
    let hash = vm.hash_of(key)?;
    let candidates = table(hash_value)?.borrow().candidates(hash);
    for (index, candidate) in candidates {
        if vm.values_equal(&candidate, key)? {
            return Ok((hash, Some(index)));
        }
    }
    Ok((hash, None))
}

pub(crate) fn get(vm: &mut Vm, hash_value: &Value, key: &Value) -> RunResult<Option<Value>> {
    let (_, index) = find(vm, hash_value, key)?;
    Ok(index.and_then(|i| table(hash_value).ok()?.borrow().entry(i)).map(|(_, v)| v))
}

/// Inserts or overwrites. An existing equal key keeps its position and original key.
pub(crate) fn insert(vm: &mut Vm, hash_value: &Value, key: Value, value: Value) -> RunResult<()> {
    let (hash, index) = find(vm, hash_value, &key)?;
    let mut table = table(hash_value)?.borrow_mut();
    // the entry may have been removed by a user `__equals__` while we were comparing
    if !index.is_some_and(|i| table.set_value(i, value.clone())) {
        table.push(hash, key, value);
    }
    Ok(())
}

pub(crate) fn remove(vm: &mut Vm, hash_value: &Value, key: &Value) -> RunResult<Option<Value>> {
    let (_, index) = find(vm, hash_value, key)?;
    Ok(index.and_then(|i| table(hash_value).ok()?.borrow_mut().remove_at(i)))
}

/// Builds a hash from key/value pairs, later keys overwriting earlier equal ones.
pub(crate) fn from_pairs(vm: &mut Vm, pairs: Vec<(Value, Value)>) -> RunResult<Value> {
    let hash_value = Value::hash(HashTable::new());
    for (key, value) in pairs {
        insert(vm, &hash_value, key, value)?;
    }
    Ok(hash_value)
}

fn missing_key(vm: &mut Vm, key: &Value) -> RunResult<Value> {
    let repr = vm.repr(key)?;
    Err(ErrorKind::key_error(repr))
}

fn index(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    match get(vm, this, &args[0])? {
        Some(value) => Ok(value),
        None => missing_key(vm, &args[0]),
    }
}

fn assign(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    insert(vm, this, args[0].clone(), args[1].clone())?;
    Ok(Value::none())
}

fn contains(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let (_, index) = find(vm, this, &args[0])?;
    Ok(Value::bool(index.is_some()))
}

fn length(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::int(i64::try_from(table(this)?.borrow().len()).unwrap_or(i64::MAX)))
}

fn to_bool(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::bool(table(this)?.borrow().len() > 0))
}

fn iter(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let pin = table(this)?.borrow().pin();
    Ok(Value::iterator(NativeIter::Keys {
        source: this.clone(),
        index: 0,
        _pin: pin,
    }))
}

fn equals(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let Some(other) = args[0].as_hash() else {
        return super::unsupported();
    };
    if other.borrow().len() != table(this)?.borrow().len() {
        return Ok(Value::bool(false));
    }
    let items = table(this)?.borrow().items();
    for (key, value) in items {
        match get(vm, &args[0], &key)? {
            Some(theirs) if vm.values_equal(&value, &theirs)? => {}
            _ => return Ok(Value::bool(false)),
        }
    }
    Ok(Value::bool(true))
}

fn not_equals(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let eq = equals(vm, this, args)?;
    Ok(Value::bool(eq.as_bool() != Some(true)))
}

fn unhashable(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Err(ErrorKind::unhashable(&this.type_name()))
}

fn to_string(vm: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let text = vm.guarded_repr(this, "{...}", |vm| {
        let items = table(this)?.borrow().items();
        let mut parts = Vec::with_capacity(items.len());
        for (key, value) in items {
            parts.push(format!("{}: {}", vm.repr(&key)?, vm.repr(&value)?));
        }
        Ok(format!("{{{}}}", parts.join(", ")))
    })?;
    Ok(Value::string(text))
}

fn copy(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::hash(table(this)?.borrow().clone()))
}

fn get_method(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    let found = get(vm, this, &args[0])?;
    Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or_else(Value::none)))
}

fn keys(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::array(table(this)?.borrow().keys()))
}

fn values(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    Ok(Value::array(table(this)?.borrow().values()))
}

fn items(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    let pairs = table(this)?.borrow().items();
    Ok(Value::array(
        pairs.into_iter().map(|(k, v)| Value::tuple(vec![k, v])).collect(),
    ))
}

/// `pop(key[, default])`: removes and returns the value.
fn pop(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    match remove(vm, this, &args[0])? {
        Some(value) => Ok(value),
        None => match args.get(1) {
            Some(default) => Ok(default.clone()),
            None => missing_key(vm, &args[0]),
        },
    }
}

fn delete(vm: &mut Vm, this: &Value, args: &[Value]) -> RunResult<Value> {
    match remove(vm, this, &args[0])? {
        Some(_) => Ok(Value::none()),
        None => missing_key(vm, &args[0]),
    }
}

fn clear(_: &mut Vm, this: &Value, _: &[Value]) -> RunResult<Value> {
    table(this)?.borrow_mut().clear();
    Ok(Value::none())
}

pub(crate) fn install(t: &Scope) {
    slot(t, Magic::Index, Arity::Exact(1), index);
    slot(t, Magic::Assign, Arity::Exact(2), assign);
    slot(t, Magic::Contains, Arity::Exact(1), contains);
    slot(t, Magic::Length, Arity::Exact(0), length);
    slot(t, Magic::Bool, Arity::Exact(0), to_bool);
    slot(t, Magic::Iter, Arity::Exact(0), iter);
    slot(t, Magic::Equals, Arity::Exact(1), equals);
    slot(t, Magic::NotEquals, Arity::Exact(1), not_equals);
    slot(t, Magic::Hash, Arity::Exact(0), unhashable);
    slot(t, Magic::String, Arity::Exact(0), to_string);
    slot(t, Magic::Repr, Arity::Exact(0), to_string);
    slot(t, Magic::Copy, Arity::Exact(0), copy);
    method(t, "get", Arity::Range(1, 2), get_method);
    method(t, "keys", Arity::Exact(0), keys);
    method(t, "values", Arity::Exact(0), values);
    method(t, "items", Arity::Exact(0), items);
    method(t, "pop", Arity::Range(1, 2), pop);
    method(t, "delete", Arity::Exact(1), delete);
    method(t, "clear", Arity::Exact(0), clear);
    method(t, "copy", Arity::Exact(0), copy);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminators_separate_types() {
        assert_ne!(builtin_hash(1, 1i64), builtin_hash(3, true));
        assert_eq!(builtin_hash(1, 42i64), builtin_hash(1, 42i64));
    }

    #[test]
    fn tombstones_keep_order() {
        let mut table = HashTable::new();
        for i in 0..3 {
            table.push(i, Value::int(i as i64), Value::int(i as i64 * 10));
        }
        assert_eq!(table.remove_at(1).and_then(|v| v.as_int()), Some(10));
        assert_eq!(table.len(), 2);
        assert_eq!(table.slots(), 3);
        assert!(table.entry(1).is_none());
        let keys: Vec<i64> = table.keys().iter().filter_map(Value::as_int).collect();
        assert_eq!(keys, [0, 2]);
        assert!(table.candidates(1).is_empty());
    }

    #[test]
    fn compaction_drops_tombstones() {
        let mut table = HashTable::new();
        for i in 0..40 {
            table.push(i, Value::int(i as i64), Value::none());
        }
        // the 21st removal leaves more tombstones than live entries
        for i in 0..21 {
            table.remove_at(i);
        }
        assert_eq!(table.len(), 19);
        assert_eq!(table.slots(), 19);
        assert_eq!(table.candidates(35).len(), 1);
    }

    #[test]
    fn pinned_table_keeps_indexes() {
        let mut table = HashTable::new();
        for i in 0..40 {
            table.push(i, Value::int(i as i64), Value::none());
        }
        let pin = table.pin();
        for i in 0..30 {
            table.remove_at(i);
        }
        assert_eq!(table.slots(), 40);
        assert!(table.entry(30).is_some());
        assert!(table.clone().readers.0.get() == 0, "copies start unpinned");

        drop(pin);
        table.remove_at(30);
        assert_eq!(table.slots(), 9);
    }

    #[test]
    fn clear_while_pinned_leaves_tombstones() {
        let mut table = HashTable::new();
        table.push(1, Value::int(1), Value::none());
        let _pin = table.pin();
        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.slots(), 1);
        table.push(2, Value::int(2), Value::none());
        assert_eq!(table.entry(1).and_then(|(k, _)| k.as_int()), Some(2));
    }
}
