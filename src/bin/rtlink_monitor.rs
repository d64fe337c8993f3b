/**
 * Status monitor
 *
 * Draws clock, CPU usage and recent kernel messages on the status panel
 * every few seconds until interrupted, then blanks the panel.
 *
 * Usage: rtlink_monitor [--interval SECS] [--config monitor.yaml]
 */

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use rtlink::{Monitor, MonitorConfig, TextDisplay};

const SLEEP_STEP: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about = "Host status panel", long_about = None)]
struct Cli {
    /// YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between refreshes
    #[arg(short, long)]
    interval: Option<u64>,

    /// Extra arguments for the kernel log utility, e.g. --level=err,warn
    #[arg(long, allow_hyphen_values = true)]
    log_arg: Vec<String>,

    /// Plain output without ANSI clear codes
    #[arg(long)]
    plain: bool,

    /// Debug level diagnostics
    #[arg(short, long)]
    trace: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    rtlink::logging::init(cli.trace);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(secs) = cli.interval {
        cfg.interval_secs = secs;
    }
    if !cli.log_arg.is_empty() {
        cfg.log_args = cli.log_arg.clone();
    }
    if cli.plain {
        cfg.ansi = false;
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)).context("could not install the interrupt handler")?;

    let mut monitor = Monitor::new(TextDisplay::new(io::stdout(), cfg.ansi), &cfg);
    info!(interval = cfg.interval_secs, "status monitor started");

    while running.load(Ordering::SeqCst) {
        if let Err(e) = monitor.refresh() {
            warn!(error = %e, "display update failed");
        }

        let next = Instant::now() + cfg.interval();
        while running.load(Ordering::SeqCst) && Instant::now() < next {
            thread::sleep(SLEEP_STEP);
        }
    }

    monitor.clear().context("could not blank the display")?;
    info!("status monitor stopped");
    Ok(())
}
