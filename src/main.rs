//! CLI host for PrintKit
//!
//! Streams a G-code file to a serial-connected 3D printer and reports
//! progress on stdout. Subcommands:
//!
//! ```bash
//! printkit list-ports
//! printkit print model.gcode --port /dev/ttyUSB0 --baud 250000
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use printkit::{
    init_logging, list_ports, ConnectionEvent, ConnectionParams, EventCategory, JobEvent,
    PrinterConnection, PrinterEvent, ProgressReportingMode, SettingsManager,
};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuilt ",
    env!("BUILD_DATE"),
    " for ",
    env!("BUILD_TARGET")
);

#[derive(Parser)]
#[command(name = "printkit")]
#[command(version = printkit::VERSION, long_version = LONG_VERSION)]
#[command(about = "Stream G-code to 3D printers over serial", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and flag likely printers
    ListPorts,

    /// Stream a G-code file to the printer
    Print {
        /// Path to the G-code file
        file: PathBuf,

        /// Serial port, or "Auto" to probe for a printer
        #[arg(long)]
        port: Option<String>,

        /// Baud rate
        #[arg(long)]
        baud: Option<u32>,

        /// Frame outgoing lines with line numbers and checksums
        #[arg(long)]
        checksums: bool,

        /// Progress reporting mode: none, m73, or m117
        #[arg(long)]
        progress: Option<String>,

        /// Print every transmitted and received line
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the resolved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Commands::ListPorts => run_list_ports(),
        Commands::Print {
            file,
            port,
            baud,
            checksums,
            progress,
            verbose,
        } => run_print(settings, file, port, baud, checksums, progress, verbose).await,
        Commands::ShowConfig => run_show_config(settings),
    }
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<SettingsManager> {
    let manager = match path {
        Some(path) => SettingsManager::with_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SettingsManager::load_or_default().context("failed to load config")?,
    };
    Ok(manager)
}

fn run_list_ports() -> anyhow::Result<()> {
    let ports = list_ports().context("failed to enumerate serial ports")?;

    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    for port in &ports {
        let marker = if port.is_likely_printer() { "*" } else { " " };
        println!("{} {} - {}", marker, port.port_name, port.description);
    }
    println!();
    println!("* likely printer");

    Ok(())
}

fn run_show_config(settings: SettingsManager) -> anyhow::Result<()> {
    println!("Config file: {}", settings.path().display());
    println!();
    print!("{}", toml::to_string_pretty(settings.config())?);
    Ok(())
}

async fn run_print(
    mut settings: SettingsManager,
    file: PathBuf,
    port: Option<String>,
    baud: Option<u32>,
    checksums: bool,
    progress: Option<String>,
    verbose: bool,
) -> anyhow::Result<()> {
    let config = settings.config_mut();
    if let Some(port) = port {
        config.connection.port = port;
    }
    if let Some(baud) = baud {
        config.connection.baud_rate = baud;
    }
    if checksums {
        config.connection.use_checksums = true;
    }
    if let Some(mode) = progress {
        config.progress.reporting_mode = parse_progress_mode(&mode)?;
    }
    config.validate()?;

    let params = ConnectionParams {
        port: config.connection.port.clone(),
        baud_rate: config.connection.baud_rate,
        timeout_ms: config.connection.timeout_ms,
        ack_retries: config.connection.ack_retries,
        use_checksums: config.connection.use_checksums,
        auto_reconnect: config.connection.auto_reconnect,
        temperature_poll_secs: config.temperature.poll_interval_secs,
    };
    let progress_mode = config.progress.reporting_mode;

    let connection = PrinterConnection::new(params);
    connection.set_progress_mode(progress_mode);
    let mut events = connection.subscribe();

    connection.connect().await?;
    if !connection.is_connected() {
        while let Ok(event) = events.try_recv() {
            println!("{}", event.description());
        }
        bail!("could not connect to {}", connection.params().port);
    }

    connection
        .start_print(&file)
        .await
        .with_context(|| format!("failed to start printing {}", file.display()))?;

    settings.config_mut().add_recent_file(file);
    if let Err(e) = settings.save() {
        tracing::warn!("could not save config: {}", e);
    }

    let mut canceling = false;
    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !canceling {
                    canceling = true;
                    println!("Canceling print");
                    // Fails only when the job already ended; the terminal
                    // event follows either way
                    let _ = connection.stop(true).await;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(outcome) = report_event(&event, verbose) {
                            break outcome;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("event stream lagged, {} events missed", missed);
                    }
                    Err(RecvError::Closed) => break PrintOutcome::Disconnected,
                }
            }
        }
    };

    connection.disconnect().await?;

    match outcome {
        PrintOutcome::Finished => Ok(()),
        PrintOutcome::Canceled => Ok(()),
        PrintOutcome::Failed(reason) => bail!("print failed: {}", reason),
        PrintOutcome::Disconnected => bail!("connection lost"),
    }
}

enum PrintOutcome {
    Finished,
    Canceled,
    Failed(String),
    Disconnected,
}

/// Print an event for the user, returning the outcome when it is terminal.
fn report_event(event: &PrinterEvent, verbose: bool) -> Option<PrintOutcome> {
    let low_level = matches!(
        event.category(),
        EventCategory::Stream | EventCategory::Position
    );
    if !low_level || verbose {
        println!("{}", event.description());
    }

    match event {
        PrinterEvent::Job(JobEvent::Finished { .. }) => Some(PrintOutcome::Finished),
        PrinterEvent::Job(JobEvent::Canceled { .. }) => Some(PrintOutcome::Canceled),
        PrinterEvent::Job(JobEvent::Failed { reason }) => {
            Some(PrintOutcome::Failed(reason.clone()))
        }
        PrinterEvent::Connection(ConnectionEvent::Disconnected { .. }) => {
            Some(PrintOutcome::Disconnected)
        }
        _ => None,
    }
}

fn parse_progress_mode(mode: &str) -> anyhow::Result<ProgressReportingMode> {
    match mode.to_ascii_lowercase().as_str() {
        "none" => Ok(ProgressReportingMode::None),
        "m73" => Ok(ProgressReportingMode::M73),
        "m117" => Ok(ProgressReportingMode::M117),
        other => bail!("unknown progress mode '{}', expected none, m73, or m117", other),
    }
}
