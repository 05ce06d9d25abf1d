use adorn_core::{Catalog, TrackingMode};
use adorn_hw::V4lCameraSource;
use adorn_session::{
    spawn_engine, Collaborators, Config, PointModel, SessionController, SessionStatus, SourceModel,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adorn", about = "Adorn face-anchored jewelry try-on")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attach presets in the catalog
    Presets {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
    /// Run a headless try-on session and print status transitions
    TryOn {
        /// Product identifier (unknown ids use the default neck preset)
        #[arg(short, long)]
        product: String,
        /// Camera device, overriding ADORN_CAMERA_DEVICE
        #[arg(short, long)]
        device: Option<String>,
        /// How long to run before stopping
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
        /// Size control (0.1 to 3.0); defaults to the attach class value
        #[arg(long)]
        size: Option<f32>,
        /// Save the last composited frame as PNG before stopping
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Show the camera unmirrored
        #[arg(long)]
        no_mirror: bool,
        /// Track position and scale only (no head rotation)
        #[arg(long)]
        position_only: bool,
    },
    /// Show effective configuration and catalog summary
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Presets { json } => {
            let catalog = config.load_catalog()?;
            print_presets(&catalog, json)?;
        }
        Commands::Devices => {
            let devices = V4lCameraSource::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{:<14} {:<32} {} ({})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::TryOn {
            product,
            device,
            seconds,
            size,
            snapshot,
            no_mirror,
            position_only,
        } => {
            let mut config = config;
            if let Some(device) = device {
                config.camera_device = device;
            }
            if no_mirror {
                config.mirrored = false;
            }
            if position_only {
                config.tracking_mode = TrackingMode::PositionOnly;
            }
            let snapshot = snapshot.map(|p| resolve_snapshot_path(&config, p));
            run_try_on(config, &product, Duration::from_secs(seconds), size, snapshot).await?;
        }
        Commands::Status => {
            let catalog = config.load_catalog()?;
            let summary = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config": &config,
                "model_present": config.face_mesh_model_path().exists(),
                "catalog": {
                    "default_preset": catalog.default_preset,
                    "presets": catalog.product_ids().collect::<Vec<_>>(),
                },
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn print_presets(catalog: &Catalog, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog.presets)?);
        return Ok(());
    }
    println!("{:<16} {:<6} {:>6}  OFFSET", "ID", "ATTACH", "SCALE");
    for (id, p) in &catalog.presets {
        let marker = if *id == catalog.default_preset { " *" } else { "" };
        println!(
            "{:<16} {:<6} {:>6.2}  ({:.2}, {:.2}, {:.2})",
            format!("{id}{marker}"),
            p.attach,
            p.scale,
            p.offset.x,
            p.offset.y,
            p.offset.z
        );
    }
    Ok(())
}

/// Bare file names land in the configured snapshot directory.
fn resolve_snapshot_path(config: &Config, path: PathBuf) -> PathBuf {
    if path.is_absolute() || path.parent().is_some_and(|p| !p.as_os_str().is_empty()) {
        path
    } else {
        config.snapshot_dir.join(path)
    }
}

async fn run_try_on(
    config: Config,
    product: &str,
    duration: Duration,
    size: Option<f32>,
    snapshot: Option<PathBuf>,
) -> Result<()> {
    let catalog = Arc::new(config.load_catalog()?);
    if !catalog.contains(product) {
        tracing::warn!(product, fallback = %catalog.default_preset, "unknown product; using default preset");
    }

    let mut settings = config.controller_settings();
    settings.size_multiplier = size;
    let controller = SessionController::new(Collaborators::native(&config), settings, catalog);
    let handle = spawn_engine(controller);

    let mut status_rx = handle.status();
    let printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            println!("status: {status}");
            if let SessionStatus::Error { reason, .. } = &status {
                println!("  {}", reason.guidance());
            }
        }
    });

    let model: SourceModel = Arc::new(PointModel::torus());
    if let Err(e) = handle.start(product, model).await {
        if let Some(reason) = e.reason() {
            eprintln!("{}", reason.guidance());
        }
        printer.abort();
        return Err(e).context("try-on session failed to start");
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    if let Some(path) = snapshot {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        match handle.snapshot(path.clone()).await {
            Ok(()) => println!("snapshot saved to {}", path.display()),
            Err(e) => eprintln!("snapshot failed: {e}"),
        }
    }

    handle.stop().await?;
    printer.abort();
    Ok(())
}
