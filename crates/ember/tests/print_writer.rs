use std::io::Cursor;

use ember::{CollectOutput, Vm};

fn run(code: &str) -> String {
    let out = CollectOutput::new();
    let mut vm = Vm::new(std::io::empty(), out.clone(), std::io::sink());
    vm.execute_string(code).unwrap();
    out.contents()
}

#[test]
fn print_single_string() {
    assert_eq!(run("print('hello')"), "hello\n");
}

#[test]
fn print_multiple_args() {
    assert_eq!(run("print('hello', 'world')"), "hello world\n");
}

#[test]
fn print_multiple_statements() {
    assert_eq!(run("print('one')\nprint('two')\nprint('three')"), "one\ntwo\nthree\n");
}

#[test]
fn print_empty() {
    assert_eq!(run("print()"), "\n");
}

#[test]
fn print_mixed_types() {
    assert_eq!(run("print('count:', 42, True, None, 1.5)"), "count: 42 True None 1.5\n");
}

#[test]
fn println_is_print() {
    assert_eq!(run("println([1, 'a'], (2,), {'k': b'v'})"), "[1, 'a'] (2,) {'k': b'v'}\n");
}

#[test]
fn print_in_function() {
    let code = "
def greet(name)
  print('Hello', name)
end

greet('Alice')
greet('Bob')
";
    assert_eq!(run(code), "Hello Alice\nHello Bob\n");
}

#[test]
fn print_uses_string_slot() {
    let code = "
class Temperature
  def __init__(degrees)
    self.degrees = degrees
  end
  def __string__()
    return String(self.degrees) + ' degrees'
  end
end
print(Temperature(21))
";
    assert_eq!(run(code), "21 degrees\n");
}

#[test]
fn nothing_printed_before_error() {
    let out = CollectOutput::new();
    let mut vm = Vm::new(std::io::empty(), out.clone(), std::io::sink());
    let err = vm.execute_string("x = [1, 2, 3]\nprint(x[5])").unwrap_err();
    assert_eq!(err.type_name(), "IndexError");
    assert!(err.message().contains('5') && err.message().contains('3'), "{err}");
    assert_eq!(out.contents(), "");
}

#[test]
fn input_reads_lines() {
    let out = CollectOutput::new();
    let input = Cursor::new("Ada\r\nGrace\n");
    let mut vm = Vm::new(input, out.clone(), std::io::sink());
    let code = "
first = input('name? ')
second = input()
third = input()
print('hi', first, second, third)
";
    vm.execute_string(code).unwrap();
    assert_eq!(out.contents(), "name? hi Ada Grace None\n");
}

#[test]
fn errors_reported_to_error_stream() {
    let err_out = CollectOutput::new();
    let mut vm = Vm::new(std::io::empty(), std::io::sink(), err_out.clone());
    let err = vm.execute_string("raise ValueError('nope')").unwrap_err();
    vm.report(&err);
    assert_eq!(err_out.contents(), "ValueError: nope\n");
}
