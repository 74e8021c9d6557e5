mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "pipecall",
    version,
    about = "JSON request/response calls over a child process's pipes"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_with_program_args() {
        let cli = Cli::try_parse_from([
            "pipecall",
            "call",
            "ping",
            "--json",
            "{\"text\":\"hello\"}",
            "--timeout",
            "2s",
            "--",
            "pipecall",
            "serve",
            "--hello",
        ])
        .expect("call args should parse");

        let Command::Call(args) = cli.command else {
            panic!("expected call subcommand");
        };
        assert_eq!(args.method, "ping");
        assert_eq!(args.timeout, "2s");
        assert_eq!(args.program, vec!["pipecall", "serve", "--hello"]);
    }

    #[test]
    fn call_requires_a_program() {
        let err = Cli::try_parse_from(["pipecall", "call", "ping"])
            .expect_err("missing program should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_serve_with_global_flags() {
        let cli = Cli::try_parse_from(["pipecall", "serve", "--log-level", "debug", "--log-format", "json"])
            .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(_)));
        assert!(matches!(cli.log_level, LogLevel::Debug));
        assert!(matches!(cli.log_format, LogFormat::Json));
    }
}
