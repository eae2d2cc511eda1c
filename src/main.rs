//! M1 Restore - factory preset restore for the Korg M1 over MIDI SysEx

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m1_restore::cli::{self, PayloadChoice};
use m1_restore::config::AppConfig;
use m1_restore::device::{DeviceWatcher, MidiPlatform, MidirPlatform};
use m1_restore::payload::{DataKind, DirAssetSource, Model};
use m1_restore::RestoreSession;

/// M1 Restore - send factory sounds and sequences to a Korg M1
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// List available MIDI output ports
    #[arg(long)]
    list_ports: bool,

    /// MIDI output to send to (id, index or name substring)
    #[arg(short, long, env = "M1_PORT")]
    port: Option<String>,

    /// Target model (m1, m1ex)
    #[arg(short, long)]
    model: Option<Model>,

    /// Bundled data to send (sounds, sequences)
    #[arg(short, long)]
    kind: Option<DataKind>,

    /// Send this SysEx file instead of bundled data
    #[arg(short, long, conflicts_with = "kind")]
    file: Option<PathBuf>,

    /// Directory holding the bundled `<model>/<kind>.syx` files
    #[arg(long, env = "M1_ASSETS")]
    assets: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting M1 Restore...");

    let mut config = AppConfig::load_or_default(&args.config).await?;
    if let Some(root) = args.assets.clone() {
        config.assets.root = root;
    }

    let platform: Arc<dyn MidiPlatform> = Arc::new(MidirPlatform::new(&config.midi.client_name));
    let assets = Arc::new(DirAssetSource::new(config.assets.root.clone()));
    info!("Bundled SysEx data: {}", assets.root().display());

    let mut session = RestoreSession::new(platform.clone(), assets, config.transfer);
    if session.capability_error().is_some() {
        cli::print_status(&session.engine().status());
        std::process::exit(1);
    }

    if args.list_ports {
        cli::print_ports(session.endpoints(), None);
        return Ok(());
    }

    let model = args.model.or(config.midi.model);
    let port = args.port.or(config.midi.output_port.clone());

    let choice = match (args.file, args.kind) {
        (Some(path), _) => Some(PayloadChoice::File(path)),
        (None, Some(kind)) => {
            let model = model.ok_or_else(|| anyhow!("--kind requires --model (m1 or m1ex)"))?;
            Some(PayloadChoice::Bundled(model, kind))
        }
        (None, None) => None,
    };

    if let Some(choice) = choice {
        let port = port.context("--port is required to send without the interactive session")?;
        return cli::run_once(&mut session, &port, choice).await;
    }

    if let Some(model) = model {
        session.select_model(model);
    }
    if let Some(port) = port {
        if let Err(e) = session.select_endpoint(&port) {
            warn!("Configured output not selected: {}", e);
        }
    }

    let watcher = DeviceWatcher::spawn(
        platform,
        session.endpoints().clone(),
        config.devices.poll_interval(),
    );
    cli::run_repl(session, watcher).await?;

    info!("M1 Restore shutdown complete");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
