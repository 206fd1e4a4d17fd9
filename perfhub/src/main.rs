//! Entry point for the perfhub TUI. Parses args and runs the App.

mod app;
mod history;
mod ui;

use std::{env, fs::File, path::Path, sync::Arc, sync::Mutex};

use anyhow::Context;
use app::App;
use perfhub::controller::TransportController;
use perfhub::selector::{SelectorConfig, TransportSelector, DEFAULT_URL};
use perfhub::tls::TlsRoots;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Default, PartialEq)]
struct ParsedArgs {
    url: Option<String>,
    tls_ca: Option<String>,
    log_file: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Cli {
    Run(ParsedArgs),
    Help(String),
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--tls-ca CERT_PEM|-t CERT_PEM] [--log-file PATH|-l PATH] [http(s)://HOST:PORT]\n\
         Default server: {DEFAULT_URL}\n\
         Keys: w WebSocket | l Long Polling | f Frequent Polls | q quit"
    )
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Cli, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "perfhub".into());
    let mut parsed = ParsedArgs::default();
    let mut help = false;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => help = true,
            "--tls-ca" | "-t" => {
                parsed.tls_ca = Some(it.next().ok_or_else(|| {
                    format!("{arg} requires a value\n{}", usage(&prog))
                })?);
            }
            "--log-file" | "-l" => {
                parsed.log_file = Some(it.next().ok_or_else(|| {
                    format!("{arg} requires a value\n{}", usage(&prog))
                })?);
            }
            _ if arg.starts_with("--tls-ca=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.tls_ca = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--log-file=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.log_file = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option {arg}\n{}", usage(&prog)));
            }
            _ => {
                if parsed.url.is_none() {
                    parsed.url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument {arg}\n{}", usage(&prog)));
                }
            }
        }
    }
    if help {
        return Ok(Cli::Help(usage(&prog)));
    }
    Ok(Cli::Run(parsed))
}

// The TUI owns the terminal, so logs only ever go to a file.
fn init_logging(path: &str) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating log file {path}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("perfhub=debug,info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(Cli::Run(p)) => p,
        Ok(Cli::Help(text)) => {
            println!("{text}");
            return Ok(());
        }
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    if let Some(path) = parsed.log_file.as_deref() {
        init_logging(path)?;
    }

    let url = parsed.url.as_deref().unwrap_or(DEFAULT_URL);
    let base = Url::parse(url).with_context(|| format!("invalid server url {url}"))?;
    let mut config = SelectorConfig::new(base);
    if let Some(ca) = parsed.tls_ca.as_deref() {
        config.tls = Some(Arc::new(TlsRoots::load(Path::new(ca))?));
    }

    let server = config.base_url.to_string();
    let (selector, events) = TransportSelector::new(config)?;
    let controller = TransportController::spawn(selector, events);
    let mut app = App::new(controller, server);
    app.run().await
}
