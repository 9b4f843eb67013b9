//! electrumx_rpc - send an ElectrumX server a single RPC command.
//!
//! Parses one subcommand from the command registry, performs one JSON-RPC
//! round trip against the server's local RPC port and prints the result.

mod cli;
mod client;
mod commands;
mod config;
mod protocol;
mod render;

use anyhow::{Context, Result};
use cli::ParsedRequest;
use client::{Dispatcher, RpcOutcome};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for usage and configuration errors.
const EXIT_USAGE: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_logging();

    let registry = commands::registry().context("Invalid command table")?;

    let invocation = match cli::parse_args(registry, std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(e) => e.exit(),
    };

    let config = config::Config::load();
    let request = match invocation.resolve(&config) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("electrumx_rpc: {}", e);
            return Ok(ExitCode::from(EXIT_USAGE));
        }
    };
    debug!(method = %request.method, port = request.port, "parsed request");

    let outcome = Dispatcher::new(config.host.clone()).dispatch(&request).await;
    let report = report(&request, &outcome);

    let mut stdout = io::stdout().lock();
    for line in &report.text {
        if let Err(e) = writeln!(stdout, "{}", line) {
            // A closed pipe (e.g. `| head`) is not worth reporting.
            if e.kind() != io::ErrorKind::BrokenPipe {
                eprintln!("electrumx_rpc: {}", e);
            }
            return Ok(ExitCode::FAILURE);
        }
    }
    // Same as above: ignore a reader that went away.
    let _ = stdout.flush();

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Initialize logging to stderr. `RUST_LOG` overrides the default filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("electrumx_rpc=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// What to print for an outcome, and whether it counts as success.
#[derive(Debug, PartialEq)]
struct Report {
    text: Vec<String>,
    success: bool,
}

fn report(request: &ParsedRequest, outcome: &RpcOutcome) -> Report {
    let failure = |reason: String| Report {
        text: vec![format!("error making request: {}", reason)],
        success: false,
    };

    match outcome {
        RpcOutcome::Success(result) => match render::render(request.format, result) {
            Ok(text) => Report {
                text,
                success: true,
            },
            Err(e) => failure(e.to_string()),
        },
        RpcOutcome::ConnectFailure(_) => Report {
            text: vec![format!(
                "cannot connect - is ElectrumX catching up, not running, or is {} the wrong RPC port?",
                request.port
            )],
            success: false,
        },
        RpcOutcome::Timeout => failure(format!("request timed out after {}s", request.timeout_secs)),
        RpcOutcome::ProtocolFailure(reason) => failure(reason.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{LineFormatter, ResultFormat};
    use serde_json::{json, Map};

    fn request(format: ResultFormat) -> ParsedRequest {
        ParsedRequest {
            method: "getinfo".into(),
            params: Map::new(),
            port: 8000,
            timeout_secs: 30,
            format,
        }
    }

    #[test]
    fn test_report_success() {
        let req = request(ResultFormat::LineList);
        let report = report(&req, &RpcOutcome::Success(json!(["a", "b"])));
        assert!(report.success);
        assert_eq!(report.text, ["a", "b"]);
    }

    #[test]
    fn test_report_empty_table() {
        let req = request(ResultFormat::Named(LineFormatter::Groups));
        let report = report(&req, &RpcOutcome::Success(json!([])));
        assert!(report.success);
        assert!(report.text.is_empty());
    }

    #[test]
    fn test_report_connect_failure() {
        let req = request(ResultFormat::RawJson);
        let report = report(&req, &RpcOutcome::ConnectFailure("refused".into()));
        assert!(!report.success);
        assert_eq!(
            report.text,
            ["cannot connect - is ElectrumX catching up, not running, or is 8000 the wrong RPC port?"]
        );
    }

    #[test]
    fn test_report_timeout_and_protocol_failure() {
        let req = request(ResultFormat::RawJson);
        assert_eq!(
            report(&req, &RpcOutcome::Timeout),
            Report {
                text: vec!["error making request: request timed out after 30s".into()],
                success: false,
            }
        );
        let report = report(&req, &RpcOutcome::ProtocolFailure("bad session id".into()));
        assert_eq!(report.text, ["error making request: bad session id"]);
        assert!(!report.success);
    }

    #[test]
    fn test_report_render_error_is_failure() {
        let req = request(ResultFormat::LineList);
        let report = report(&req, &RpcOutcome::Success(json!({"a": 1})));
        assert!(!report.success);
        assert_eq!(
            report.text,
            ["error making request: expected a list result, got an object"]
        );
    }
}
