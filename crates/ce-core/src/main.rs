//! clamscan exporter
//!
//! Receives clamscan output over TCP, one connection per scan run, and
//! exposes the per-code counts and found infections as Prometheus metrics.
//!
//! ```text
//! clamscan -r /srv | nc exporter 9000
//! curl http://exporter:9967/metrics
//! ```

use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use ce_common::{format_error_human, load_config, ConfigOverrides, Error, Result};
use ce_core::exit_codes::ExitCode;
use ce_core::fingerprint::{Fingerprinter, Sha256Fingerprinter};
use ce_core::listener::{HandlerContext, ScanListener};
use ce_core::logging::{self, LogConfig, LogFormat};
use ce_core::metrics::{ExporterMetrics, MetricsServer};
use clap::Parser;
use tracing::{error, info, warn};

/// Prometheus exporter for clamscan results streamed over TCP
#[derive(Parser, Debug)]
#[command(name = "clamscan-exporter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address the scan listener binds to
    #[arg(long, env = "CE_BIND", value_name = "ADDR")]
    bind: Option<String>,

    /// TCP port receiving clamscan output [default: 9000]
    #[arg(long, env = "CE_TCP_PORT", value_name = "PORT")]
    tcp_port: Option<u16>,

    /// Address the metrics endpoint binds to
    #[arg(long, env = "CE_HTTP_BIND", value_name = "ADDR")]
    http_bind: Option<String>,

    /// HTTP port serving metrics [default: 9967]
    #[arg(long, env = "CE_HTTP_PORT", value_name = "PORT")]
    http_port: Option<u16>,

    /// URL path of the metrics endpoint [default: /metrics]
    #[arg(long, env = "CE_METRICS_PATH", value_name = "PATH")]
    metrics_path: Option<String>,

    /// Do not hash infected files; publish an empty sha256sum label
    #[arg(
        long,
        env = "CE_NO_FINGERPRINT",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    no_fingerprint: bool,

    /// Seconds to wait for open scan runs on shutdown [default: 10]
    #[arg(long = "grace-period", env = "CE_GRACE_PERIOD", value_name = "SECS")]
    grace_period: Option<u64>,

    /// TOML config file
    #[arg(long, env = "CE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Log output format: human or jsonl
    #[arg(long, env = "CE_LOG_FORMAT", value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind: self.bind.clone(),
            tcp_port: self.tcp_port,
            http_bind: self.http_bind.clone(),
            http_port: self.http_port,
            metrics_path: self.metrics_path.clone(),
            no_fingerprint: self.no_fingerprint,
            shutdown_grace_secs: self.grace_period,
        }
    }

    fn log_config(&self) -> LogConfig {
        LogConfig::from_env(self.verbose, self.quiet, self.log_format)
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                ExitCode::ArgsError
            } else {
                // --help / --version
                ExitCode::Clean
            };
            std::process::exit(code.as_i32());
        }
    };

    if let Err(e) = logging::init_logging(&cli.log_config()) {
        eprintln!("warning: logging not initialised: {e}");
    }

    let code = match run(&cli) {
        Ok(()) => ExitCode::Clean,
        Err(err) => {
            let code = ExitCode::from(&err);
            error!(
                exit_code = %code,
                code = err.code(),
                category = %err.category(),
                error = %err,
                "exporter failed"
            );
            eprintln!("{}", format_error_human(&err, logging::use_color()));
            code
        }
    };
    std::process::exit(code.as_i32());
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.overrides())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        scan_addr = %config.listen.addr(),
        metrics_addr = %config.metrics.addr(),
        metrics_path = %config.metrics.path,
        fingerprint = config.fingerprint,
        "starting clamscan exporter"
    );

    let (signal_tx, signal_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(());
    })
    .map_err(|e| Error::SignalHandler(e.to_string()))?;

    let metrics = ExporterMetrics::new().map_err(|e| Error::MetricsRegistry(e.to_string()))?;
    let server = MetricsServer::start(
        &config.metrics.addr(),
        &config.metrics.path,
        metrics.clone(),
    )?;

    let fingerprinter: Option<Arc<dyn Fingerprinter>> = if config.fingerprint {
        Some(Arc::new(Sha256Fingerprinter))
    } else {
        None
    };
    let listener = ScanListener::bind(
        &config.listen.addr(),
        HandlerContext {
            sink: Arc::new(metrics),
            fingerprinter,
        },
    )?;

    if signal_rx.recv().is_err() {
        warn!("signal channel closed; shutting down");
    }

    info!(
        grace_secs = config.shutdown_grace_secs,
        in_flight = listener.in_flight(),
        "shutdown requested"
    );
    let report = listener.shutdown(config.shutdown_grace());
    if report.abandoned > 0 {
        warn!(
            abandoned = report.abandoned,
            "scan runs were cut off by shutdown"
        );
    }

    // Last, so final values stay scrapeable while runs drain.
    server.shutdown();
    Ok(())
}
