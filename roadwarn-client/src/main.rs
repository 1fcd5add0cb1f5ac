//! roadwarn console client entry point.
//!
//! ```text
//! roadwarn-client                     Connect with defaults
//! roadwarn-client --config <path>     Use custom config TOML
//! roadwarn-client --url ws://host/... Override the detection endpoint
//! roadwarn-client --gen-config        Dump default config and exit
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roadwarn_client::camera::DirectoryCamera;
use roadwarn_client::config::ClientConfig;
use roadwarn_client::console::{ConsoleCommand, HELP, status_report};
use roadwarn_client::display::ConsoleDisplay;
use roadwarn_core::Pipeline;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "roadwarn-client", about = "Live traffic-sign warnings from a camera feed")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "roadwarn-client.toml")]
    config: PathBuf,

    /// Detection endpoint (overrides config). Example: ws://127.0.0.1:8000/api/v1/ws/detect
    #[arg(short, long)]
    url: Option<String>,

    /// Directory of JPEG frames (overrides config).
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Start with detection off; type `on` to begin.
    #[arg(long)]
    paused: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let loaded = ClientConfig::load(&cli.config);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    if let Some(url) = cli.url {
        config.network.url = url;
    }
    if let Some(frames) = cli.frames {
        config.capture.frames_dir = frames;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("roadwarn-client v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = &loaded {
        warn!("invalid config {}: {e}; using defaults", cli.config.display());
    }

    // ── 1. Build the pipeline ───────────────────────────────────

    let pipeline_config = config.pipeline_config()?;
    let close_grace = pipeline_config.link.close_timeout.min(Duration::from_millis(500));
    info!(
        endpoint = %pipeline_config.link.endpoint,
        frames = %config.capture.frames_dir.display(),
        "starting"
    );

    let camera = DirectoryCamera::new(&config.capture.frames_dir, config.capture.facing);
    let mut pipeline = Pipeline::new(pipeline_config, camera, ConsoleDisplay::stdout());
    if !cli.paused {
        pipeline.enable();
    }
    println!("{HELP}");

    // ── 2. Event loop ───────────────────────────────────────────

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let wakeup = tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            line = commands.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        stdin_open = false;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::On) => pipeline.enable(),
                    Ok(ConsoleCommand::Off) => pipeline.disable(),
                    Ok(ConsoleCommand::Switch) => {
                        let facing = pipeline.camera_mut().switch();
                        println!("camera: {facing}");
                    }
                    Ok(ConsoleCommand::Status) => println!("{}", status_report(&pipeline)),
                    Ok(ConsoleCommand::Help) => println!("{HELP}"),
                    Ok(ConsoleCommand::Quit) => break,
                    Err(e) => println!("{e}"),
                }
                continue;
            }
            wakeup = pipeline.wait() => wakeup,
        };
        pipeline.handle(wakeup).await;
    }

    // ── 3. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    pipeline.disable();
    // Give the detached close handshake a moment before the runtime stops.
    tokio::time::sleep(close_grace).await;

    Ok(())
}
