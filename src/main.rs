//! Purpose: `formpost` CLI entry point.
//! Role: Binary crate root; parses args, posts forms, emits JSON on stdout.
//! Invariants: Successful commands print exactly one JSON value on stdout.
//! Invariants: Errors are emitted as JSON on stderr (human text when stderr is a TTY).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use formpost::api::{Error, ErrorKind, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `formpost --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    init_tracing(&cli.log_level);

    command_dispatch::dispatch_command(cli.command)
        .map_err(add_tls_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "formpost",
    version,
    about = "Send a URL-encoded form over TLS 1.2 and print the JSON reply",
    long_about = None,
    after_help = r#"EXAMPLES
  $ formpost post https://api.example.com/login -F user=alice -F pass=secret
  $ formpost post https://api.example.com/login --data 'user=alice&pass=secret'
  $ formpost policy

NOTES
  - Every request is a POST with Content-Type: application/x-www-form-urlencoded
  - Only TLS 1.2 with the allow-listed cipher suites is negotiated (see `formpost policy`)
  - The whole call is bounded by --timeout-ms (default 5000)"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,
    #[arg(
        long,
        default_value = "warn",
        help = "Log filter when RUST_LOG is unset (e.g. warn, debug, formpost=trace)"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "POST a form and print the JSON object reply",
        long_about = r#"POST a URL-encoded form to URL and print the reply.

The reply body must be a JSON object. Non-2xx statuses, malformed JSON,
TLS policy mismatches and timeouts all exit non-zero with a JSON error on stderr."#,
        after_help = r#"EXAMPLES
  $ formpost post https://api.example.com/login -F user=alice -F pass=secret
  $ echo 'user=alice&pass=secret' | formpost post https://api.example.com/login --data -
  $ formpost post https://localhost:8443/login --tls-ca ./ca.pem -F user=alice

EXIT CODES
  2 usage, 3 tls, 4 timeout, 5 i/o, 6 http status, 7 invalid json"#
    )]
    Post {
        #[arg(help = "Target URL (http or https)", value_hint = ValueHint::Url)]
        url: String,
        #[arg(
            short = 'F',
            long = "field",
            value_name = "KEY=VALUE",
            help = "Repeatable form field; encoded for you"
        )]
        fields: Vec<String>,
        #[arg(
            long,
            value_name = "ENCODED",
            conflicts_with = "fields",
            help = "Pre-encoded form body (use - to read stdin)"
        )]
        data: Option<String>,
        #[arg(
            long,
            default_value_t = 5000,
            value_name = "MS",
            help = "Overall call budget in milliseconds"
        )]
        timeout_ms: u64,
        #[arg(
            long,
            value_name = "PATH",
            help = "Extra PEM CA/certificate file to trust",
            value_hint = ValueHint::FilePath
        )]
        tls_ca: Option<PathBuf>,
    },
    #[command(about = "Print the TLS policy and call timeout as JSON")]
    Policy,
    #[command(
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ formpost completion bash > ~/.local/share/bash-completion/completions/formpost
  $ formpost completion zsh > ~/.zfunc/_formpost
  $ formpost completion fish > ~/.config/fish/completions/formpost.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn init_tracing(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}

fn add_tls_hint(err: Error) -> Error {
    if err.kind() == ErrorKind::Tls && err.hint().is_none() {
        return err.with_hint("Run `formpost policy` to see the accepted TLS parameters.");
    }
    err
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Tls => "tls failure".to_string(),
        ErrorKind::Timeout => "timed out".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Status => "http error status".to_string(),
        ErrorKind::Parse => "invalid json".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(url) = err.url() {
        inner.insert("url".to_string(), json!(url));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(body) = err.body() {
        inner.insert("body".to_string(), json!(body));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(status) = err.status() {
        lines.push(format!(
            "{} {status}",
            colorize_label("status:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(body) = err.body().filter(|body| !body.is_empty()) {
        lines.push(format!(
            "{} {body}",
            colorize_label("body:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
