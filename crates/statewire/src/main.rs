mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::LogArgs;
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "statewire", version, about = "Remote time-travel debugger transport")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    cli.log.install();

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
            "statewire",
            "send",
            "127.0.0.1:9000",
            "--action",
            "Tap",
            "--state",
            "{\"count\":1}",
            "--wait",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.action, "Tap");
        assert!(args.wait);
        assert_eq!(args.wait_timeout, "5s");
    }

    #[test]
    fn log_flags_are_global() {
        let cli = Cli::try_parse_from([
            "statewire",
            "version",
            "--log-format",
            "json",
            "--log-level",
            "trace",
        ])
        .expect("log flags after the subcommand should parse");

        assert_eq!(cli.log.format, logging::LogFormat::Json);
        assert_eq!(cli.log.level, logging::LogLevel::Trace);
    }

    #[test]
    fn send_requires_action() {
        let err = Cli::try_parse_from(["statewire", "send", "127.0.0.1:9000"])
            .expect_err("missing --action should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "statewire",
            "--format",
            "json",
            "serve",
            "0.0.0.0:9000",
            "--count",
            "3",
            "--max-payload",
            "1048576",
            "--stall-timeout",
            "2s",
        ])
        .expect("serve args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.count, Some(3));
        assert_eq!(args.max_payload, Some(1_048_576));
        assert_eq!(args.stall_timeout.as_deref(), Some("2s"));
    }
}
