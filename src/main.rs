use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use pi_sessions::service::Service;
use pi_sessions::types::{Request, Response};
use serde_json::Value;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Session browser backend. Reads JSON requests from stdin and writes one
/// JSON response line per request to stdout.
#[derive(Parser, Debug)]
#[command(name = "pi-sessions", version, about)]
struct Args {
    /// Directory holding pi-sessions.toml and the badge state file.
    /// Without it, defaults apply and badges are not persisted.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("reading stdin")?;
    Ok(buffer)
}

fn decode(value: Value) -> Result<Request> {
    serde_json::from_value(value).context("decoding request")
}

fn error_response(err: &anyhow::Error) -> Response {
    eprintln!("pi-sessions: {err:#}");
    Response::Error {
        error: format!("{err:#}"),
    }
}

/// Answer every request on stdin. Returns whether all of them succeeded.
fn run(args: &Args) -> Result<bool> {
    let mut service = Service::open(args.data_dir.as_deref(), Utc::now())?;
    let input = read_stdin()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut ok = true;

    for value in serde_json::Deserializer::from_str(&input).into_iter::<Value>() {
        let (response, stop) = match value.context("reading request stream") {
            // Malformed JSON leaves the stream unusable.
            Err(err) => (error_response(&err), true),
            Ok(value) => match decode(value).and_then(|req| service.handle(req, Utc::now())) {
                Ok(response) => (response, false),
                Err(err) => (error_response(&err), false),
            },
        };
        if matches!(response, Response::Error { .. }) {
            ok = false;
        }
        serde_json::to_writer(&mut out, &response).context("writing response")?;
        writeln!(out).context("writing response")?;
        if stop {
            break;
        }
    }

    out.flush().context("flushing stdout")?;
    Ok(ok)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(err) => {
            eprintln!("pi-sessions: {err:#}");
            process::exit(2);
        }
    }
}
