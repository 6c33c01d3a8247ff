//! Embedding surface: host functions, host calls into scripts, bytecode entry points.
use ember::{compile, Arity, CodeBuilder, CollectOutput, ErrorKind, Instruction, RunError, SimpleError, Value, Vm};

fn vm() -> (Vm, CollectOutput) {
    let out = CollectOutput::new();
    (Vm::new(std::io::empty(), out.clone(), std::io::sink()), out)
}

#[test]
fn load_native_function() {
    let (mut vm, _) = vm();
    vm.load("triple", |_| {
        Value::native("triple", Arity::Exact(1), |_, args| match args[0].as_int() {
            Some(n) => Ok(Value::int(n * 3)),
            None => Err(RunError::Exc(SimpleError::new(
                ErrorKind::TypeError,
                "triple() needs an Int",
            ))),
        })
    });
    assert_eq!(vm.execute_string("triple(14)").unwrap().as_int(), Some(42));

    let err = vm.execute_string("triple('x')").unwrap_err();
    assert_eq!(err.to_string(), "TypeError: triple() needs an Int");

    let err = vm.execute_string("triple(1, 2)").unwrap_err();
    assert_eq!(err.to_string(), "ArityError: triple() takes 1 argument but 2 were given");
}

#[test]
fn host_errors_are_catchable() {
    let (mut vm, _) = vm();
    vm.load("fail", |_| {
        Value::native("fail", Arity::Any, |_, _| {
            Err(RunError::Exc(SimpleError::new(ErrorKind::HostError, "disk on fire")))
        })
    });
    let value = vm
        .execute_string("try\n  fail()\nexcept HostError as e\n  e.message\nend")
        .unwrap();
    // the try statement itself has no value
    assert!(value.is_none());
    let value = vm
        .execute_string("msg = None\ntry\n  fail()\nexcept Error as e\n  msg = e.message\nend\nmsg")
        .unwrap();
    assert_eq!(value.as_str(), Some("disk on fire"));
}

#[test]
fn native_calls_back_into_script() {
    let (mut vm, _) = vm();
    vm.load("apply_twice", |_| {
        Value::native("apply_twice", Arity::Exact(2), |vm, args| {
            let once = vm.call_value(&args[0], vec![args[1].clone()]).map_err(|e| {
                RunError::Exc(SimpleError::new(ErrorKind::HostError, e.to_string()))
            })?;
            vm.call_value(&args[0], vec![once])
                .map_err(|e| RunError::Exc(SimpleError::new(ErrorKind::HostError, e.to_string())))
        })
    });
    let value = vm.execute_string("apply_twice(lambda x: x * 10, 3)").unwrap();
    assert_eq!(value.as_int(), Some(300));
}

#[test]
fn call_script_function_from_host() {
    let (mut vm, _) = vm();
    vm.execute_string("def greet(name)\n  return 'hello ' + name\nend").unwrap();
    let greet = vm.global("greet").unwrap();
    let value = vm.call_value(&greet, vec![Value::string("ember")]).unwrap();
    assert_eq!(value.as_str(), Some("hello ember"));

    let err = vm.call_value(&greet, vec![]).unwrap_err();
    assert_eq!(err.type_name(), "ArityError");
}

#[test]
fn execute_compiled_code_twice() {
    let (mut vm, out) = vm();
    let code = compile("n = n + 1 if implements(n, Int) else 0\nprint(n)").unwrap();
    vm.execute_string("n = None").unwrap();
    vm.execute(&code).unwrap();
    vm.execute(&code).unwrap();
    assert_eq!(out.contents(), "0\n1\n");
}

#[test]
fn execute_hand_assembled_bytes() {
    let (mut vm, _) = vm();
    let mut builder = CodeBuilder::new();
    builder.emit(Instruction::NewInt(40));
    builder.emit(Instruction::Push);
    builder.emit(Instruction::NewInt(2));
    builder.emit(Instruction::Binary(ember::BinaryOp::Add));
    let bytes = builder.assemble_bytes().unwrap();
    assert_eq!(vm.execute_bytes(&bytes).unwrap().as_int(), Some(42));
}

#[test]
fn corrupt_bytecode_is_rejected() {
    let (mut vm, _) = vm();
    let err = vm.execute_bytes(&[0xff]).unwrap_err();
    assert_eq!(err.type_name(), "CodeError");
}

#[test]
fn syntax_errors() {
    let err = compile("def f(\n").unwrap_err();
    assert_eq!(err.type_name(), "SyntaxError");
    assert!(err.is_incomplete());

    let err = compile("if True\n  x = 1\n").unwrap_err();
    assert!(err.is_incomplete(), "{err}");

    let err = compile("x = )").unwrap_err();
    assert!(!err.is_incomplete());
    assert!(err.message().ends_with("line 1, column 5"), "{err}");
}

#[test]
fn script_error_value() {
    let (mut vm, _) = vm();
    let err = vm
        .execute_string("class Custom(ValueError)\n  pass\nend\nraise Custom('detail')")
        .unwrap_err();
    assert_eq!(err.type_name(), "Custom");
    assert_eq!(err.message(), "detail");
    assert!(err.value().is_some());

    let err = vm.execute_string("1 // 0").unwrap_err();
    assert!(err.value().is_none());
    assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
}

#[test]
fn nested_error_through_finally_stays_in_nested_run() {
    use std::{cell::RefCell, rc::Rc};

    let (mut vm, out) = vm();
    let seen = Rc::new(RefCell::new(None));
    let recorded = Rc::clone(&seen);
    vm.load("attempt", move |_| {
        Value::native("attempt", Arity::Exact(1), move |vm, args| {
            if let Err(err) = vm.call_value(&args[0], vec![]) {
                *recorded.borrow_mut() = Some(err.to_string());
            }
            Ok(Value::none())
        })
    });
    let code = "
def risky()
  try
    raise ValueError('inner')
  finally
    print('fin')
  end
end
try
  attempt(risky)
except ValueError
  print('outer handler')
end
print('after')
";
    vm.execute_string(code).unwrap();
    assert_eq!(out.contents(), "fin\nafter\n");
    assert_eq!(seen.borrow().as_deref(), Some("ValueError: inner"));
}

#[test]
fn module_error_in_handler_runs_finally() {
    let (mut vm, out) = vm();
    let code = "
try
  raise ValueError('a')
except ValueError
  raise KeyError('b')
finally
  print('fin')
end
";
    let err = vm.execute_string(code).unwrap_err();
    assert_eq!(err.to_string(), "KeyError: b");
    assert_eq!(out.contents(), "fin\n");

    let err = vm.execute_string("defer print('d')\nraise ValueError('x')").unwrap_err();
    assert_eq!(err.to_string(), "ValueError: x");
    assert_eq!(out.contents(), "fin\nd\n");
}
