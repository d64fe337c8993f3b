/**
 * Measurement receiver
 *
 * Connects to the timing board over serial, forwards operator commands and
 * stores, saves and charts every batch the board sends back.
 *
 * Usage: rtlink_receiver [port] [--baud N] [--config receiver.yaml]
 * Default: /dev/ttyACM0, 115200
 */

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use rtlink::link::{self, Link};
use rtlink::receiver::report;
use rtlink::{CommandLoop, LineOperator, LoopTiming, Plotter, ReceiverConfig};

const DEFAULT_PORT: &str = "/dev/ttyACM0";

#[derive(Parser, Debug)]
#[command(author, version, about = "Serial measurement receiver", long_about = None)]
struct Cli {
    /// Serial device of the board
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for JSON, CSV and PNG output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip chart rendering
    #[arg(long)]
    no_plots: bool,

    /// Program used to open finished charts
    #[arg(long)]
    viewer: Option<String>,

    /// Print the available serial ports and exit
    #[arg(long)]
    list_ports: bool,

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

fn settings(cli: &Cli) -> Result<ReceiverConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ReceiverConfig::from_file(path)?,
        None => ReceiverConfig::default(),
    };
    if let Some(port) = &cli.port {
        cfg.port = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        cfg.baud_rate = baud;
    }
    if let Some(dir) = &cli.output {
        cfg.output_dir = dir.clone();
    }
    if cli.no_plots {
        cfg.plots = false;
    }
    if cli.viewer.is_some() {
        cfg.viewer = cli.viewer.clone();
    }
    Ok(cfg)
}

fn run(cli: Cli) -> Result<()> {
    if cli.list_ports {
        let ports = link::list_ports()?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for name in ports {
            println!("{}", name);
        }
        return Ok(());
    }

    let cfg = settings(&cli)?;
    let port = cfg.port.clone().unwrap_or_else(|| DEFAULT_PORT.to_string());

    let mut stdout = io::stdout();
    report::print_banner(&mut stdout, &port, &cfg.output_dir.display().to_string())?;

    let link = Link::open(&port, cfg.baud_rate, cfg.settle())
        .with_context(|| format!("could not connect to the board on {}", port))?;
    println!("\nConnected to {} at {} baud", port, cfg.baud_rate);

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)).context("could not install the interrupt handler")?;

    let plotter = cfg.plots.then(|| Plotter::new(cfg.plot_settings()));
    if plotter.as_ref().is_some_and(|p| !p.has_labels()) {
        println!("No chart font found, charts will be drawn without text");
    }
    let mut command_loop = CommandLoop::new(link, cfg.output_dir.clone(), plotter, LoopTiming::from(&cfg), stdout)
        .with_interrupt(interrupted);

    let mut operator = LineOperator::new(BufReader::new(io::stdin()));
    let reason = command_loop.run(&mut operator)?;
    info!(?reason, "receiver stopped");
    Ok(())
}
