use std::{error::Error, fs, path::Path};

use ember::{CollectOutput, Vm};

/// Represents the expected outcome of a test fixture
#[derive(Debug, Clone)]
enum Expectation {
    /// Expect successful execution, check the repr of the module value
    Return(String),
    /// Expect successful execution, check everything printed; `\n` in the comment stands
    /// for a newline
    Output(String),
    /// Expect an uncaught error rendered as `TypeName: message`
    Raise(String),
    /// Expect a compile failure whose message starts with this text
    ParseError(String),
    /// Expect successful execution without checking anything else.
    NoException,
}

/// Parse a fixture file into code and expected outcome.
///
/// The file may have an expectation comment as the LAST line:
/// - `# Return=value` - repr of the value of the last expression statement
/// - `# Output=text` - exact printed output
/// - `# Raise=TypeName: message` - uncaught error
/// - `# ParseError=message` - syntax or compile error (prefix match)
///
/// If no expectation comment is present, the test just verifies the code runs without error.
fn parse_fixture(content: &str) -> (String, Expectation) {
    let lines: Vec<&str> = content.lines().collect();
    assert!(!lines.is_empty(), "Empty fixture file");

    let last_line = lines[lines.len() - 1];
    let expectation = if let Some(expected) = last_line.strip_prefix("# Return=") {
        Expectation::Return(expected.to_string())
    } else if let Some(expected) = last_line.strip_prefix("# Output=") {
        Expectation::Output(expected.replace("\\n", "\n"))
    } else if let Some(expected) = last_line.strip_prefix("# Raise=") {
        Expectation::Raise(expected.to_string())
    } else if let Some(expected) = last_line.strip_prefix("# ParseError=") {
        Expectation::ParseError(expected.to_string())
    } else {
        return (lines.join("\n"), Expectation::NoException);
    };
    (lines[..lines.len() - 1].join("\n"), expectation)
}

fn run_test(path: &Path, code: &str, expectation: Expectation) {
    let test_name = path.strip_prefix("test_cases/").unwrap_or(path).display().to_string();

    let out = CollectOutput::new();
    let mut vm = Vm::new(std::io::empty(), out.clone(), std::io::sink());
    let result = vm.execute_string(code);

    match (result, expectation) {
        (Ok(value), Expectation::Return(expected)) => {
            let repr = vm.repr_value(&value).unwrap_or_else(|e| panic!("[{test_name}] repr failed: {e}"));
            assert_eq!(repr, expected, "[{test_name}] return value mismatch");
        }
        (Ok(_), Expectation::Output(expected)) => {
            assert_eq!(out.contents(), expected, "[{test_name}] output mismatch");
        }
        (Ok(_), Expectation::NoException) => {}
        (Ok(value), expectation) => {
            panic!("[{test_name}] expected {expectation:?}, but the code completed with {value:?}");
        }
        (Err(err), Expectation::Raise(expected)) => {
            assert_eq!(err.to_string(), expected, "[{test_name}] error mismatch");
        }
        (Err(err), Expectation::ParseError(expected)) => {
            assert_eq!(err.type_name(), "SyntaxError", "[{test_name}] expected a syntax error, got {err}");
            assert!(
                err.message().starts_with(&expected),
                "[{test_name}] parse error mismatch: {:?} does not start with {expected:?}",
                err.message()
            );
        }
        (Err(err), _) => panic!("[{test_name}] unexpected error:\n{err}\noutput so far:\n{}", out.contents()),
    }
}

/// Test function that runs each fixture through a fresh VM
fn run_test_cases(path: &Path) -> Result<(), Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    let (code, expectation) = parse_fixture(&content);
    run_test(path, &code, expectation);
    Ok(())
}

// Generate tests for all fixture files using datatest-stable harness macro
datatest_stable::harness!(run_test_cases, "test_cases", r"^.*\.em$");
