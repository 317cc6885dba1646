use std::{
    path::{Path, PathBuf},
    thread::JoinHandle,
};

use clap::{Parser, Subcommand};
use dashlink::{
    AppConfig, Controller, DashError, FrameFormat, GapPolicy, TelemetrySource,
    serial,
    telemetry::{ibt::IbtReplaySource, ibt::Pacing, recorder, replay::RecordingReplaySource},
};
use log::{error, info, warn};

#[cfg(windows)]
const LIVE_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Serial baud rate, overrides the config file
    #[arg(long, global = true)]
    baud: Option<u32>,

    #[arg(long, global = true, value_enum)]
    gap_policy: Option<GapPolicy>,

    #[arg(long, global = true, value_enum)]
    frame: Option<FrameFormat>,
}

#[derive(clap::Args, Debug)]
struct Outputs {
    /// Record the consumed telemetry to a JSON Lines file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the session metadata to a file
    #[arg(short, long)]
    session: Option<PathBuf>,

    /// Show the current snapshot in the terminal
    #[arg(long)]
    render: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream telemetry from a running simulation
    Live {
        #[arg(short, long)]
        port: String,

        #[command(flatten)]
        outputs: Outputs,
    },
    /// Stream telemetry from an .ibt file or a recording
    Offline {
        #[arg(short, long)]
        port: String,

        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        outputs: Outputs,
    },
}

fn load_config() -> AppConfig {
    match AppConfig::from_local_file() {
        Ok(Some(config)) => config,
        Ok(None) => {
            let config = AppConfig::default();
            if let Err(e) = config.save() {
                warn!("Could not save default config: {}", e);
            }
            config
        }
        Err(e) => {
            warn!("Could not load config, using defaults: {}", e);
            AppConfig::default()
        }
    }
}

#[cfg(windows)]
fn live_source() -> Result<Box<dyn TelemetrySource>, DashError> {
    Ok(Box::new(dashlink::telemetry::producer::LiveSource::connect(
        LIVE_CONNECT_TIMEOUT,
    )?))
}

#[cfg(not(windows))]
fn live_source() -> Result<Box<dyn TelemetrySource>, DashError> {
    Err(DashError::ProviderInit {
        description: "live telemetry is only available on Windows".to_string(),
    })
}

fn offline_source(input: &Path) -> Result<Box<dyn TelemetrySource>, DashError> {
    if !input.exists() {
        return Err(DashError::ProviderInit {
            description: format!("input file {} does not exist", input.display()),
        });
    }
    match input.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("ibt") => {
            Ok(Box::new(IbtReplaySource::open(input, Pacing::RealTime)?))
        }
        Some("jsonl") | Some("json") => Ok(Box::new(RecordingReplaySource::from_file(
            input,
            Pacing::RealTime,
        )?)),
        _ => Err(DashError::ProviderInit {
            description: format!("unsupported input file {}", input.display()),
        }),
    }
}

fn write_session(source: &dyn TelemetrySource, path: &Path) -> Result<(), DashError> {
    let Some(yaml) = source.session_yaml() else {
        warn!("The telemetry source has no session metadata to write");
        return Ok(());
    };
    std::fs::write(path, yaml).map_err(|e| DashError::WriterError { source: e })?;
    info!("Wrote session metadata to {}", path.display());
    Ok(())
}

fn stream(
    port: &str,
    open_source: impl FnOnce() -> Result<Box<dyn TelemetrySource>, DashError>,
    outputs: &Outputs,
    config: &AppConfig,
) -> Result<(), DashError> {
    let transport = serial::open_port(port, config.baud_rate, config.serial_read_timeout())?;
    let source = open_source()?;

    if let Some(session_file) = &outputs.session {
        write_session(source.as_ref(), session_file)?;
    }

    let mut writer: Option<JoinHandle<Result<(), DashError>>> = None;
    let source: Box<dyn TelemetrySource> = match &outputs.output {
        Some(output) => {
            let (source, handle) = recorder::record_to(source, output.clone())?;
            writer = Some(handle);
            Box::new(source)
        }
        None => source,
    };

    let controller = Controller::new(config.controller_settings(outputs.render));
    let shutdown = controller.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Exiting...");
        shutdown.trigger();
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let stats = controller.run(source, transport)?;
    info!(
        "{} frames served, {} requests ignored, {} failed writes",
        stats.served, stats.ignored, stats.failed_writes
    );

    if let Some(handle) = writer {
        handle
            .join()
            .map_err(|_| DashError::WorkerPanicked { worker: "recorder" })??;
    }
    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();
    let mut config = load_config();
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    if let Some(gap_policy) = cli.gap_policy {
        config.gap_policy = gap_policy;
    }
    if let Some(frame) = cli.frame {
        config.frame_format = frame;
    }

    let result = match &cli.command {
        Commands::Live { port, outputs } => {
            info!("Streaming live telemetry to {}", port);
            stream(port, live_source, outputs, &config)
        }
        Commands::Offline {
            port,
            input,
            outputs,
        } => {
            info!("Streaming {} to {}", input.display(), port);
            stream(port, || offline_source(input), outputs, &config)
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
