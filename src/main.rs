use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use portscan_rs::config::{Config, ConfigOverrides};
use portscan_rs::display::{self, ShowFilter};
use portscan_rs::scanner::{self, ScanRequest, SharedProgress};
use portscan_rs::services::ServiceTable;
use portscan_rs::types::ScanReport;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// portscan-rs — concurrent TCP connect scanner for one host and port range.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portscan-rs",
    version,
    about = "Concurrent TCP connect scanner for one host and port range, with service names.",
    long_about = None
)]
struct Cli {
    /// Host name or IP address (IPv4 or IPv6) to scan.
    host: String,

    /// First port of the range [default: 1].
    #[arg(short = 's', long = "start-port", alias = "startport",
          value_parser = clap::value_parser!(u16).range(1..))]
    start_port: Option<u16>,

    /// Last port of the range [default: 1024].
    #[arg(short = 'e', long = "end-port", alias = "endport",
          value_parser = clap::value_parser!(u16).range(1..))]
    end_port: Option<u16>,

    /// Upper bound on concurrent workers [default: 1].
    #[arg(short = 'w', long = "max-workers", alias = "maxthreads")]
    max_workers: Option<usize>,

    /// Per-port connect timeout in milliseconds [default: 1000].
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Services database used for port names [default: /etc/services].
    #[arg(long)]
    services: Option<PathBuf>,

    /// JSON config file with scan defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rows to print when not running the interactive menu.
    #[arg(long, value_enum, default_value_t = ShowFilter::Open)]
    show: ShowFilter,

    /// Open the post-scan menu instead of printing once.
    #[arg(long, default_value_t = false)]
    interactive: bool,

    /// Write the full report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,

    /// Debug logging on stderr (RUST_LOG overrides).
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn resolve_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        let overrides = ConfigOverrides {
            start_port: self.start_port,
            end_port: self.end_port,
            max_workers: self.max_workers,
            timeout_ms: self.timeout_ms,
            services_path: self.services.clone(),
            no_color: self.no_color,
        };
        Ok(config.merge_overrides(&overrides)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    portscan_rs::init_tracing(cli.verbose);

    let config = cli.resolve_config()?;
    let services = ServiceTable::load(&config.services_path, config.start_port, config.end_port)
        .context("cannot build the service name table")?;

    let request = ScanRequest::new(cli.host.clone(), config.start_port, config.end_port)
        .with_workers(config.max_workers)
        .with_timeout(config.timeout());
    request.validate()?;

    // Ctrl-C stops the workers after their current probe.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    eprintln!(
        "Scanning {} ports {}-{} with up to {} worker(s)...",
        request.host, request.start_port, request.end_port, request.max_workers
    );
    let progress = SharedProgress::new();
    let report = scanner::scan_with_shared(&request, &services, cancel, progress.clone()).await?;
    if report.cancelled {
        warn!(scanned = progress.scanned(), "scan interrupted");
    }

    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        eprintln!("Wrote JSON report to {}", path.display());
    }

    let color = config.color_enabled;
    if cli.interactive {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout().lock();
        display::run_menu(&report, &mut input, &mut output, color)?;
    } else {
        let mut out = io::stdout().lock();
        write!(out, "{}", display::render_table(&report, cli.show, color))?;
        write!(out, "{}", display::render_summary(&report))?;
        out.flush()?;
    }

    Ok(())
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
