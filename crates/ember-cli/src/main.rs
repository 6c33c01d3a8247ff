use std::{
    fs,
    io::{self, BufReader},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;
use ember::{compile, ResourceLimits, Vm, DEFAULT_MAX_DEPTH};
use tracing_subscriber::EnvFilter;

mod repl;

#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(about = "Run ember scripts, or start an interactive session when no file is given")]
#[command(version)]
struct Args {
    /// Script files, executed in order in one VM
    files: Vec<PathBuf>,

    /// Print the bytecode listing of each file instead of running it
    #[arg(long)]
    disassemble: bool,

    /// Maximum call depth before a RecursionError is raised
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Log engine events (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    if args.disassemble {
        for path in &args.files {
            let source = read_source(path)?;
            match compile(&source) {
                Ok(code) => print!("{}", code.disassemble()),
                Err(err) => {
                    eprintln!("{}: {err}", path.display());
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let limits = ResourceLimits::default().max_depth(args.max_depth);
    // std already buffers stdin globally and the REPL reads through that same buffer;
    // the wrapper only adds `BufRead` without holding the stdin lock
    let input = BufReader::with_capacity(1, io::stdin());
    let mut vm = Vm::with_limits(input, io::stdout(), io::stderr(), limits);

    if args.files.is_empty() {
        repl::run(&mut vm)?;
        return Ok(ExitCode::SUCCESS);
    }

    for path in &args.files {
        let source = read_source(path)?;
        log::debug!("running {}", path.display());
        let result = vm.execute_string(&source);
        vm.flush().context("failed to flush output")?;
        if let Err(err) = result {
            vm.report(&err);
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_source(path: &PathBuf) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
