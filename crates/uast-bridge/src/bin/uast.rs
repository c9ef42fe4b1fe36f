//! `uast`: walk, query and re-encode documents through the UAST bridge.
//!
//! Usage:
//!   uast iterate [--order pre|post|level|...] < doc.json
//!   uast filter '<query>' < doc.json
//!   uast encode [--format binary|json] < doc.json
//!   uast decode [--format binary|json] < buffer
//!
//! `--config <path>` reads defaults for `format` and `order` from a TOML
//! file. Logging is controlled with `UAST_LOG` (default `warn`).

use std::io::{self, Read, Write};
use std::path::PathBuf;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uast_bridge::cli::{self, CliConfig, CliError};

struct Args {
    command: String,
    query: Option<String>,
    format: Option<String>,
    order: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args, CliError> {
    let mut args = std::env::args().skip(1);
    let command = args
        .next()
        .ok_or_else(|| CliError::Usage("usage: uast <iterate|filter|encode|decode> [options]".into()))?;
    let mut parsed = Args { command, query: None, format: None, order: None, config: None };
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| CliError::Usage(format!("{flag} needs a value")));
        match arg.as_str() {
            "--format" => parsed.format = Some(value("--format")?),
            "--order" => parsed.order = Some(value("--order")?),
            "--config" => parsed.config = Some(value("--config")?.into()),
            query if parsed.query.is_none() && !query.starts_with("--") => parsed.query = Some(query.to_string()),
            other => return Err(CliError::Usage(format!("unexpected argument: {other}"))),
        }
    }
    Ok(parsed)
}

fn run() -> Result<(), CliError> {
    let args = parse_args()?;
    let mut config = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    if let Some(format) = &args.format {
        config.format = format.parse().map_err(uast_bridge::Error::from)?;
    }
    if let Some(order) = &args.order {
        config.order = order.parse().map_err(uast_bridge::Error::from)?;
    }

    let mut input = Vec::new();
    io::stdin().read_to_end(&mut input)?;
    let text = || String::from_utf8(input.clone()).map_err(|e| CliError::Usage(e.to_string()));

    let mut stdout = io::stdout().lock();
    match args.command.as_str() {
        "iterate" => {
            for line in cli::iterate(text()?.trim(), config.order)? {
                writeln!(stdout, "{line}")?;
            }
        }
        "filter" => {
            let query = args.query.ok_or_else(|| CliError::Usage("filter needs a query".into()))?;
            for line in cli::filter(text()?.trim(), &query)? {
                writeln!(stdout, "{line}")?;
            }
        }
        "encode" => stdout.write_all(&cli::encode(text()?.trim(), config.format)?)?,
        "decode" => writeln!(stdout, "{}", cli::decode(&input, config.format)?)?,
        other => return Err(CliError::Usage(format!("unknown command: {other}"))),
    }
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_env("UAST_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
