//! Iteration protocol and generators driven from the host.
use ember::{CollectOutput, Value, Vm};

fn vm() -> (Vm, CollectOutput) {
    let out = CollectOutput::new();
    (Vm::new(std::io::empty(), out.clone(), std::io::sink()), out)
}

fn ints(values: &[Value]) -> Vec<i64> {
    values.iter().map(|v| v.as_int().unwrap()).collect()
}

#[test]
fn generator_resumes_from_host() {
    let (mut vm, out) = vm();
    let code = "
def numbers()
  print('side effect')
  yield 1
  yield 2
  yield 3
end
gen = numbers()
";
    vm.execute_string(code).unwrap();
    let gen = vm.global("gen").unwrap();
    assert_eq!(out.contents(), "", "nothing runs before the first resumption");

    let next = vm.execute_string("gen.__next__").unwrap();
    let has_next = vm.execute_string("gen.__has_next__").unwrap();
    let mut seen = Vec::new();
    while vm.call_value(&has_next, vec![]).unwrap().as_bool() == Some(true) {
        seen.push(vm.call_value(&next, vec![]).unwrap());
    }
    assert_eq!(ints(&seen), vec![1, 2, 3]);
    assert!(vm.call_value(&next, vec![]).unwrap().is_none());
    assert_eq!(out.contents(), "side effect\n");
    assert_eq!(gen.type_name(), "Generator");
}

#[test]
fn generator_keeps_locals_between_resumptions() {
    let (mut vm, _) = vm();
    let code = "
def running_total(items)
  total = 0
  for x in items
    total += x
    yield total
  end
end
Array(running_total([1, 2, 3, 4]))
";
    let value = vm.execute_string(code).unwrap();
    assert_eq!(ints(&value.to_vec().unwrap()), vec![1, 3, 6, 10]);
}

#[test]
fn generator_error_stops_it() {
    let (mut vm, _) = vm();
    let code = "
def broken()
  yield 1
  raise ValueError('boom')
  yield 2
end
g = broken()
first = next(g)
try
  next(g)
except ValueError as e
  message = e.message
end
[first, message, has_next(g), next(g)]
";
    let value = vm.execute_string(code).unwrap();
    assert_eq!(vm.repr_value(&value).unwrap(), "[1, 'boom', False, None]");
}

#[test]
fn for_over_builtin_iterables() {
    let (mut vm, out) = vm();
    let code = "
for c in 'ab'
  print(c)
end
for k, v in {'x': 1}.items()
  print(k, v)
end
for b in b'z'
  print(b)
end
for i in range(3, 0, -1)
  print(i)
end
";
    vm.execute_string(code).unwrap();
    assert_eq!(out.contents(), "a\nb\nx 1\n122\n3\n2\n1\n");
}

#[test]
fn not_iterable() {
    let (mut vm, _) = vm();
    let err = vm.execute_string("for x in 5\n  pass\nend").unwrap_err();
    assert_eq!(err.to_string(), "TypeError: 'Int' object is not iterable");
}

#[test]
fn unpack_mismatch_in_for() {
    let (mut vm, _) = vm();
    let err = vm.execute_string("for a, b in [(1, 2, 3)]\n  pass\nend").unwrap_err();
    assert_eq!(err.type_name(), "ArityError");
}
