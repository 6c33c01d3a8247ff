//! Implementation of the sorted() builtin function.

use crate::{exception::RunResult, run::Vm, value::Value};

/// Implementation of the sorted() builtin function.
///
/// Returns a new array with the items of an iterable in ascending order. Items are
/// compared with `<`, so objects sort through `__less_than__`. The sort is stable.
pub fn builtin_sorted(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let items = vm.collect(&args[0])?;
    merge_sort(vm, items).map(Value::array)
}

/// A stable merge sort whose comparisons may fail or call back into scripts.
///
/// `slice::sort_by` cannot propagate errors, and an inconsistent script `<` must not be
/// able to abort the host.
fn merge_sort(vm: &mut Vm, mut items: Vec<Value>) -> RunResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(vm, items)?;
    let right = merge_sort(vm, right)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        // take from the right only when strictly smaller, keeping equal items in order
        let next = if vm.less_than(r, l)? { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}
