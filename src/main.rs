//! tagmeter
//!
//! Command-line front end for the tagmeter library.
//!
//! ```text
//! stdin "name value" ──► NameTranslator ──► Registry ──┬──► SidecarExporter ──► sidecar
//!                                          (composite)  └──► Prometheus /metrics
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tagmeter::api::Registry;
use tagmeter::backend::{AtomicFactory, PrometheusFactory};
use tagmeter::error::{Error, Result};
use tagmeter::export::{ExporterConfig, HttpSink, SidecarExporter};
use tagmeter::translate::{NameTranslator, Translation};

// =============================================================================
// CLI Arguments
// =============================================================================

/// tagmeter - tagged metrics with sidecar export
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a name pattern file
    Check(CheckArgs),

    /// Translate flat metric names
    Translate(TranslateArgs),

    /// Read `name value` lines from stdin and export them to the sidecar
    Forward(ForwardArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// YAML file with a `name-patterns` list
    #[arg(long, env = "TAGMETER_PATTERNS")]
    patterns: PathBuf,
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// YAML file with a `name-patterns` list
    #[arg(long, env = "TAGMETER_PATTERNS")]
    patterns: PathBuf,

    /// Names to translate
    #[arg(required = true)]
    names: Vec<String>,
}

#[derive(Args, Debug)]
struct ForwardArgs {
    /// YAML file with a `name-patterns` list
    #[arg(long, env = "TAGMETER_PATTERNS")]
    patterns: PathBuf,

    /// Sidecar endpoint receiving the JSON payloads
    #[arg(
        long,
        env = "TAGMETER_SIDECAR_URL",
        default_value = "http://localhost:15001/metrics"
    )]
    sidecar_url: String,

    /// Seconds between exports
    #[arg(long, env = "TAGMETER_POLL_PERIOD_SECONDS", default_value = "10")]
    poll_period_seconds: u64,

    /// Timeout of one sidecar post in seconds
    #[arg(long, env = "TAGMETER_REQUEST_TIMEOUT_SECONDS", default_value = "10")]
    request_timeout_seconds: u64,

    /// Also serve the counters in Prometheus format on this address
    #[arg(long, env = "TAGMETER_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli);

    match cli.command {
        Command::Check(args) => check(args),
        Command::Translate(args) => translate(args),
        Command::Forward(args) => forward(args).await,
    }
}

fn check(args: CheckArgs) -> Result<()> {
    let translator = NameTranslator::from_yaml_file(&args.patterns)?;
    println!(
        "{}: {} name patterns, prefix {:?}",
        args.patterns.display(),
        translator.len(),
        translator.prefix()
    );
    Ok(())
}

fn translate(args: TranslateArgs) -> Result<()> {
    let translator = NameTranslator::from_yaml_file(&args.patterns)?;
    for name in &args.names {
        println!("{}\t{}", name, translator.apply(name));
    }
    Ok(())
}

async fn forward(args: ForwardArgs) -> Result<()> {
    let translator = NameTranslator::from_yaml_file(&args.patterns)?;

    // composite meters report every delegate, so export the atomic child only
    let exported = Arc::new(Registry::new(AtomicFactory));
    let mut children = vec![exported.clone()];
    if let Some(addr) = args.metrics_addr {
        let prometheus = PrometheusFactory::new();
        children.push(Arc::new(Registry::new(prometheus.clone())));
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, prometheus).await {
                error!("Metrics server error: {}", e);
            }
        });
    }
    let registry = Arc::new(Registry::composite(children));

    let config = ExporterConfig {
        request_timeout: Duration::from_secs(args.request_timeout_seconds),
        ..Default::default()
    };
    let exporter = SidecarExporter::new(exported, config.clone());
    exporter.start(
        &args.sidecar_url,
        Duration::from_secs(args.poll_period_seconds),
    )?;

    info!("Forwarding metrics from stdin");
    info!("  Sidecar URL: {}", args.sidecar_url);
    info!("  Poll period: {} seconds", args.poll_period_seconds);
    info!("  Name patterns: {}", translator.len());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (mut forwarded, mut dropped, mut malformed) = (0u64, 0u64, 0u64);
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = parse_line(line) else {
            warn!(line, "Expected `name value`, skipping line");
            malformed += 1;
            continue;
        };
        match translator.apply(name) {
            Translation::Mapped(id) => {
                registry.counter(&id).add(value);
                forwarded += 1;
            }
            Translation::Dropped => dropped += 1,
        }
    }

    // the final export must not overlap a scheduled cycle still in flight
    let stopping = exporter.clone();
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .map_err(|e| Error::Internal(format!("Failed to stop sidecar exporter: {}", e)))?;
    info!(forwarded, dropped, malformed, "Input closed, sending final export");

    let sink = HttpSink::new(&args.sidecar_url, config.request_timeout)?;
    match exporter.export_once(&sink).await {
        Ok(count) => info!(count, "Final export complete"),
        Err(e) => warn!(error = %e, "Final export failed"),
    }
    Ok(())
}

/// Split a `name value` line.
fn parse_line(line: &str) -> Option<(&str, f64)> {
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    let value = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((name, value))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(cli: &Cli) {
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries command output
    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn metrics_response(factory: &PrometheusFactory, path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => match factory.gather_text() {
            Ok(text) => {
                let mut response = text_response(StatusCode::OK, text);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
                response
            }
            Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        "/healthz" => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn run_metrics_server(addr: SocketAddr, factory: PrometheusFactory) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Metrics server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let factory = factory.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = metrics_response(&factory, req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagmeter::api::Id;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("spark.jobs 5"), Some(("spark.jobs", 5.0)));
        assert_eq!(parse_line("  a\t-1.5 "), Some(("a", -1.5)));
        assert_eq!(parse_line("a"), None);
        assert_eq!(parse_line("a b"), None);
        assert_eq!(parse_line("a 1 2"), None);
    }

    #[test]
    fn test_metrics_routes() {
        let factory = PrometheusFactory::new();
        let registry = Registry::new(factory.clone());
        registry.counter(&Id::new("forwarded")).add(2.0);

        assert_eq!(metrics_response(&factory, "/metrics").status(), StatusCode::OK);
        assert_eq!(metrics_response(&factory, "/healthz").status(), StatusCode::OK);
        assert_eq!(
            metrics_response(&factory, "/other").status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_cli_parses_forward() {
        let cli = Cli::try_parse_from([
            "tagmeter",
            "forward",
            "--patterns",
            "patterns.yaml",
            "--sidecar-url",
            "http://127.0.0.1:1234/",
            "--poll-period-seconds",
            "5",
        ])
        .unwrap();

        match cli.command {
            Command::Forward(args) => {
                assert_eq!(args.poll_period_seconds, 5);
                assert_eq!(args.sidecar_url, "http://127.0.0.1:1234/");
                assert!(args.metrics_addr.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
