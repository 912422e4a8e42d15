//! Attribution Reporting Simulator CLI
//!
//! Reports go to stdout, logs and errors to stderr.

use anyhow::Context;
use attribution_sim::{process_json_string, Args, InputMode, OutputOptions};
use clap::Parser;
use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

fn run(args: &Args) -> anyhow::Result<()> {
    let options = args.simulation_options()?;
    let input_mode = args.input_mode()?;

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    match input_mode {
        InputMode::Single => {
            let mut input = String::new();
            stdin.lock().read_to_string(&mut input).context("failed to read stdin")?;

            let output_options = OutputOptions {
                copy_input_to_output: args.copy_input_to_output,
                pretty: true,
            };
            let output = process_json_string(&input, &options, output_options)?;
            writeln!(stdout, "{}", output)?;
        }
        InputMode::Multi => {
            let output_options = OutputOptions {
                copy_input_to_output: args.copy_input_to_output,
                pretty: false,
            };

            for (index, line) in stdin.lock().lines().enumerate() {
                let line = line.context("failed to read stdin")?;
                let output = process_json_string(&line, &options, output_options)
                    .with_context(|| format!("input line {}", index + 1))?;
                writeln!(stdout, "{}", output)?;
            }
        }
    }

    stdout.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Attribution simulator v{}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
