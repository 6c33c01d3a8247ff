//! Interactive read-eval-print loop.

use std::{
    future::Future,
    io::{self, BufRead, Write},
};

use anyhow::Context;
use ember::{compile, CancelHandle, Vm};
use tokio::{runtime::Runtime, task::JoinHandle};

const PROMPT: &str = ">>> ";
const CONTINUATION: &str = "... ";

/// Reads statements from stdin until end of input.
///
/// Lines accumulate while the buffer only fails to compile because it ended early. Errors
/// are reported and the session continues with its bindings intact. Ctrl-C cancels the
/// running statement; Ctrl-D ends the session.
pub(crate) fn run(vm: &mut Vm) -> anyhow::Result<()> {
    let runtime = interrupt_runtime()?;
    let _interrupts = forward_interrupts(&runtime, vm.cancel_handle(), tokio::signal::ctrl_c);

    let stdin = io::stdin();
    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { PROMPT } else { CONTINUATION };
        print!("{prompt}");
        io::stdout().flush().context("failed to flush prompt")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("failed to read input")? == 0 {
            println!();
            return Ok(());
        }
        buffer.push_str(&line);
        if buffer.trim().is_empty() {
            buffer.clear();
            continue;
        }

        let code = match compile(&buffer) {
            Ok(code) => code,
            Err(err) if err.is_incomplete() => continue,
            Err(err) => {
                vm.report(&err);
                buffer.clear();
                continue;
            }
        };
        buffer.clear();

        match vm.execute(&code) {
            Ok(value) if !value.is_none() => match vm.repr_value(&value) {
                Ok(text) => println!("{text}"),
                Err(err) => vm.report(&err),
            },
            Ok(_) => {}
            Err(err) => vm.report(&err),
        }
        vm.flush().context("failed to flush output")?;
    }
}

/// A one-worker runtime that only waits for signals while the REPL blocks on stdin.
fn interrupt_runtime() -> anyhow::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("failed to start the interrupt watcher")
}

/// Cancels the VM each time `next_interrupt` resolves, until it fails.
fn forward_interrupts<F, Fut>(runtime: &Runtime, handle: CancelHandle, mut next_interrupt: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<()>> + Send,
{
    runtime.spawn(async move {
        while next_interrupt().await.is_ok() {
            log::debug!("interrupt: cancelling the running statement");
            handle.cancel();
        }
    })
}

#[cfg(test)]
mod tests {
    use std::{future::ready, time::Duration};

    use super::*;

    #[test]
    fn interrupt_sets_cancel_flag() {
        let runtime = interrupt_runtime().unwrap();
        let handle = CancelHandle::default();
        let mut pending = 1;
        let task = forward_interrupts(&runtime, handle.clone(), move || {
            let result = if pending > 0 {
                pending -= 1;
                Ok(())
            } else {
                Err(io::Error::other("signal stream closed"))
            };
            ready(result)
        });
        runtime.block_on(task).unwrap();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn interrupt_stops_running_statement() {
        let runtime = interrupt_runtime().unwrap();
        let mut vm = Vm::new(io::empty(), io::sink(), io::sink());
        let mut fired = false;
        let _task = forward_interrupts(&runtime, vm.cancel_handle(), move || {
            let first = !fired;
            fired = true;
            async move {
                if first {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<(), io::Error>(())
                } else {
                    std::future::pending::<io::Result<()>>().await
                }
            }
        });

        let err = vm.execute_string("n = 0\nwhile True\n  n += 1\nend").unwrap_err();
        assert_eq!(err.type_name(), "Cancelled");
        // the session keeps its bindings and accepts the next statement
        assert!(vm.global("n").and_then(|n| n.as_int()).is_some_and(|n| n > 0));
        assert_eq!(vm.execute_string("n > 0").unwrap().as_bool(), Some(true));
    }
}
