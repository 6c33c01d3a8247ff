//! Implementation of the print() and input() builtin functions.

use crate::{exception::RunResult, run::Vm, value::Value};

/// Implementation of the print() builtin function.
///
/// Writes the display form of each argument separated by a space, then a newline.
/// `println` is bound to the same function.
pub fn builtin_print(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    let mut line = String::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&vm.display(value)?);
    }
    line.push('\n');
    vm.write_out(&line)?;
    Ok(Value::none())
}

/// Implementation of the input() builtin function.
///
/// Writes the optional prompt, then reads one line from the input stream with its line
/// ending removed. Returns `None` at end of input.
pub fn builtin_input(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    if let Some(prompt) = args.first() {
        let prompt = vm.display(prompt)?;
        vm.write_out(&prompt)?;
    }
    Ok(match vm.read_line()? {
        Some(mut line) => {
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Value::string(line)
        }
        None => Value::none(),
    })
}
