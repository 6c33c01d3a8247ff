//! Tests for recursion limits, cancellation and state kept across executions.
use std::{thread, time::Duration};

use ember::{CollectOutput, ResourceLimits, Vm};

fn vm_with_limits(limits: ResourceLimits) -> Vm {
    Vm::with_limits(std::io::empty(), std::io::sink(), std::io::sink(), limits)
}

const DEEP: &str = "
def depth(n)
  if n == 0
    return 0
  end
  return 1 + depth(n - 1)
end
";

#[test]
fn recursion_limit_exceeded() {
    let mut vm = vm_with_limits(ResourceLimits::default().max_depth(50));
    vm.execute_string(DEEP).unwrap();
    let err = vm.execute_string("depth(100)").unwrap_err();
    assert_eq!(err.type_name(), "RecursionError");
    assert_eq!(err.message(), "maximum recursion depth of 50 exceeded");
}

#[test]
fn recursion_limit_not_exceeded() {
    let mut vm = vm_with_limits(ResourceLimits::default().max_depth(50));
    vm.execute_string(DEEP).unwrap();
    let value = vm.execute_string("depth(40)").unwrap();
    assert_eq!(value.as_int(), Some(40));
}

#[test]
fn recursion_error_is_catchable() {
    let mut vm = vm_with_limits(ResourceLimits::default().max_depth(30));
    vm.execute_string(DEEP).unwrap();
    let code = "
try
  depth(1000)
  result = 'no error'
except RecursionError as e
  result = 'caught'
end
result
";
    let value = vm.execute_string(code).unwrap();
    assert_eq!(value.as_str(), Some("caught"));
}

#[test]
fn cancel_from_another_thread() {
    let out = CollectOutput::new();
    let mut vm = Vm::new(std::io::empty(), out.clone(), std::io::sink());
    let handle = vm.cancel_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.cancel();
    });

    let code = "
before = 'kept'
try
  while True
    pass
  end
finally
  print('finally must not run')
end
";
    let err = vm.execute_string(code).unwrap_err();
    canceller.join().unwrap();
    assert_eq!(err.type_name(), "Cancelled");
    assert_eq!(out.contents(), "");

    // bindings survive and the VM is usable again
    let value = vm.execute_string("before").unwrap();
    assert_eq!(value.as_str(), Some("kept"));
}

#[test]
fn cancellation_is_not_catchable() {
    let mut vm = vm_with_limits(ResourceLimits::default());
    let handle = vm.cancel_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.cancel();
    });
    let code = "
caught = False
try
  until False
    pass
  end
except
  caught = True
end
";
    let err = vm.execute_string(code).unwrap_err();
    canceller.join().unwrap();
    assert_eq!(err.type_name(), "Cancelled");
    assert_eq!(vm.global("caught").and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn bindings_survive_errors() {
    let mut vm = vm_with_limits(ResourceLimits::default());
    vm.execute_string("counter = 1").unwrap();
    assert!(vm.execute_string("counter = counter + 1\nundefined_name").is_err());
    let value = vm.execute_string("counter").unwrap();
    assert_eq!(value.as_int(), Some(2));
}

#[test]
fn root_scope_not_writable_by_scripts() {
    let mut vm = vm_with_limits(ResourceLimits::default());
    vm.execute_string("len = 5").unwrap();
    assert_eq!(vm.global("len").and_then(|v| v.as_int()), Some(5));

    // a fresh VM still has the builtin
    let mut fresh = vm_with_limits(ResourceLimits::default());
    assert_eq!(fresh.execute_string("len([1, 2])").unwrap().as_int(), Some(2));
}
