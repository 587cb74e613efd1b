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
    name = "framelink",
    version,
    about = "Framed, acknowledged messaging over serial links"
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
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "framelink",
            "send",
            "--unix",
            "/tmp/test.sock",
            "--command",
            "0x05",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.command, 0x05);
                assert_eq!(args.data.as_deref(), Some("hello"));
                assert!(!args.no_ack);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "framelink",
            "send",
            "--unix",
            "/tmp/test.sock",
            "--hex",
            "31",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_two_endpoints() {
        let err = Cli::try_parse_from([
            "framelink",
            "listen",
            "--unix",
            "/tmp/test.sock",
            "--device",
            "/dev/rfcomm0",
        ])
        .expect_err("two endpoints should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_out_of_range_command() {
        let err = Cli::try_parse_from([
            "framelink",
            "send",
            "--unix",
            "/tmp/test.sock",
            "--command",
            "300",
        ])
        .expect_err("command must fit in a byte");

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "framelink",
            "serve",
            "/tmp/test.sock",
            "--ack-timeout",
            "500ms",
            "--once",
        ])
        .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(ref args) if args.once));
    }
}
