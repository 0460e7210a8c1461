//! `polarcam` command line tool.
//!
//! Runs the sequencer and capture pipeline against the in-process camera
//! backend. Configuration comes from `config/polarcam.toml` (see
//! [`polarcam::config`]); `RUST_LOG` overrides the configured log level.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polarcam::camera::{Limit, PolarCam};
use polarcam::capture_worker::{CaptureEvent, CaptureMode, CaptureWorker};
use polarcam::config::{load_sequence, PolarCamConfig};
use polarcam::hardware::{MockCamera, MockSystem};
use polarcam::output::ImageStore;
use polarcam::polarization::sequence_strip;

/// Sequencer programming and polarized capture for polarization cameras.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "config/polarcam.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the SDK version, camera serials, current limits and configuration
    Info,
    /// Free-running Polarized8 preview
    Preview {
        /// Number of panels to capture
        #[arg(short, long, default_value_t = 10)]
        frames: usize,
        /// Write every panel to the output folder
        #[arg(long)]
        save: bool,
    },
    /// Program the sequencer and capture one pass of frames
    Sequence {
        /// Sequence file; defaults to the configured one
        #[arg(long)]
        file: Option<PathBuf>,
        /// Frames to grab; defaults to one per state
        #[arg(short, long)]
        frames: Option<usize>,
        /// Write the frames and the strip to the output folder
        #[arg(long)]
        save: bool,
    },
    /// Turn the sequencer off and restore auto exposure and gain
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PolarCamConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level)),
        )
        .init();

    warn!("Vendor SDK not linked, using the simulated camera");
    let system = MockSystem::new(vec![MockCamera::new("POLAR-SIM-0")]);
    let mut camera = PolarCam::open(Box::new(system), config.camera_settings())
        .context("Failed to open camera")?;
    info!(version = camera.library_version(), "Camera system opened");

    let store = ImageStore::new(&config.application.output_dir);
    let result = match cli.command {
        Command::Info => {
            print_info(&camera);
            println!("\nEffective configuration:\n{}", toml::to_string_pretty(&config)?);
            Ok(camera)
        }
        Command::Preview { frames, save } => {
            run_worker(camera, CaptureMode::Preview { frames: Some(frames) }, save.then_some(&store)).await
        }
        Command::Sequence { file, frames, save } => {
            let path = file.unwrap_or_else(|| config.sequencer.sequence_file.clone());
            let steps = load_sequence(&path)?;
            if steps.is_empty() {
                bail!("{} holds no sequencer states", path.display());
            }
            let frames = frames.unwrap_or(steps.len());
            run_worker(camera, CaptureMode::Sequence { steps, frames }, save.then_some(&store)).await
        }
        Command::Reset => {
            camera.reset_sequencer().context("Sequencer reset failed")?;
            info!("Sequencer reset");
            Ok(camera)
        }
    };

    let mut camera = result?;
    camera.close().context("Failed to release camera system")?;
    Ok(())
}

fn print_info(camera: &PolarCam) {
    println!("Library version: {}", camera.library_version());
    for serial in camera.serials() {
        println!("Camera: {serial}");
    }
    let limits = camera.limits();
    print_limit("Exposure (us)", limits.exposure_us);
    print_limit("Gain (dB)", limits.gain_db);
    print_limit("Frame rate (fps)", limits.fps);
}

fn print_limit(name: &str, limit: Option<Limit>) {
    match limit {
        Some(limit) => println!(
            "{name}: {:.2} [{:.2} .. {:.2}]",
            limit.current, limit.min, limit.max
        ),
        None => println!("{name}: not available"),
    }
}

async fn run_worker(camera: PolarCam, mode: CaptureMode, store: Option<&ImageStore>) -> Result<PolarCam> {
    let (tx, mut rx) = mpsc::channel(4);
    let worker = CaptureWorker::spawn(camera, mode, tx);

    let mut failure = None;
    while let Some(event) = rx.recv().await {
        match event {
            CaptureEvent::Panel { frame_id, panel } => {
                info!(frame_id, "Panel received");
                if let Some(store) = store {
                    store.save_panel(&panel)?;
                }
            }
            CaptureEvent::Sequence(frames) => {
                println!("Captured {} frames", frames.len());
                for frame in &frames {
                    println!("  frame {}: mean {:.1}", frame.frame_id, frame.mean());
                }
                if let Some(store) = store {
                    let strip = sequence_strip(&frames).ok();
                    store.save_sequence(&frames, strip.as_ref())?;
                }
            }
            CaptureEvent::Failed(message) => failure = Some(message),
        }
    }

    let camera = worker.join().await?;
    if let Some(message) = failure {
        bail!("Capture failed: {message}");
    }
    Ok(camera)
}
