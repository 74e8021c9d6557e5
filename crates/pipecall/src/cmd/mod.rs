use std::future::Future;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the built-in routes on stdin/stdout.
    Serve(ServeArgs),
    /// Spawn a program and make one routed call to it.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => block_on(serve::run(args)),
        Command::Call(args) => block_on(call::run(args, format)),
        Command::Version(args) => version::run(args),
    }
}

/// Run `fut` to completion on a fresh multi-threaded runtime.
///
/// The runtime is dropped without waiting for leftover blocking work, such
/// as a stdin read that will never complete.
fn block_on<F>(fut: F) -> CliResult<i32>
where
    F: Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    let result = runtime.block_on(fut);
    runtime.shutdown_background();
    result
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Greet the parent with a "child-hello" call once serving.
    #[arg(long)]
    pub hello: bool,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method to call on the child.
    pub method: String,
    /// JSON payload for the method. Omitted means null.
    #[arg(long)]
    pub json: Option<String>,
    /// Call deadline (e.g. 2s, 500ms).
    #[arg(long, default_value = "5s", env = "PIPECALL_TIMEOUT")]
    pub timeout: String,
    /// Program to spawn, followed by its arguments.
    #[arg(last = true, required = true, num_args = 1.., value_name = "PROGRAM")]
    pub program: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
