use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use argus_vision::config::{self, AppConfig};
use argus_vision::detector::NullDetector;
use argus_vision::events::bus::spawn_publisher;
use argus_vision::events::MessageBus;
use argus_vision::pipeline::{Pipeline, PipelineConfig};
use argus_vision::plate_proposer::{PlateProposer, PlateProposerConfig};
use argus_vision::prioritizer::{Prioritizer, RoiZone, Strategy, Weights};
use argus_vision::ptz::controller::{PtzController, PtzControllerConfig};
use argus_vision::ptz::device::{HttpPtzDevice, PtzDevice};
use argus_vision::ptz::preset_manager::PresetManagerConfig;
use argus_vision::stream::{OpenCvVideoSource, StreamIngest, StreamIngestConfig};
use argus_vision::tracker::{Tracker, TrackerConfig};

#[derive(Parser)]
#[command(name = "argus-vision", version)]
#[command(about = "PTZ vehicle tracking, target prioritization, and plate-capture control")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the capture / track / command pipeline. Runs until interrupted.
    Run,

    /// Print the resolved configuration (file + environment overrides merged) and exit.
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("argus_vision=info,warn")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config()?;

    match cli.command {
        Command::Run => {
            print_startup_info(&cfg);
            run(cfg).await?;
        }
        Command::PrintConfig => {
            println!("{:#?}", cfg);
        }
    }
    Ok(())
}

async fn run(cfg: AppConfig) -> Result<()> {
    let tracker = Tracker::new(TrackerConfig {
        iou_threshold: cfg.tracking.iou_threshold,
        max_age: cfg.tracking.max_age,
        min_hits: cfg.tracking.min_hits,
    });

    let strategy = build_strategy(&cfg);
    let prioritizer = Prioritizer::new(strategy, cfg.prioritization.min_target_size_pixels);

    let proposer = PlateProposer::new(PlateProposerConfig {
        min_plate_height_pixels: cfg.anpr.min_plate_height_pixels,
        target_plate_height: cfg.anpr.capture.zoom_target_plate_height,
        stability_frames: cfg.anpr.capture.stability_frames,
    });

    let device: Arc<dyn PtzDevice> = Arc::new(HttpPtzDevice::new(
        &cfg.ptz.onvif.host,
        cfg.ptz.onvif.port,
        cfg.ptz.onvif.username.clone(),
        cfg.ptz.onvif.password.clone(),
        cfg.ptz.onvif.timeout_seconds,
    ));
    let presets = device.get_presets().unwrap_or_else(|err| {
        tracing::warn!(%err, "could not enumerate device presets, starting with none");
        Vec::new()
    });

    let controller = Arc::new(PtzController::new(
        device,
        PtzControllerConfig {
            hysteresis_pixels: cfg.ptz.control.hysteresis_pixels,
            pan_speed: cfg.ptz.control.pan_speed,
            tilt_speed: cfg.ptz.control.tilt_speed,
            zoom_step: cfg.ptz.control.zoom_step,
            move_rate_limit: Duration::from_millis(cfg.ptz.control.move_rate_limit_ms),
        },
        presets,
        PresetManagerConfig {
            idle_enabled: cfg.ptz.idle_behavior.enabled,
            idle_timeout: Duration::from_secs(cfg.ptz.idle_behavior.timeout_seconds),
            default_preset_token: cfg.ptz.idle_behavior.return_to_preset.clone(),
            sweep_enabled: cfg.ptz.idle_behavior.sweep_enabled,
            sweep_interval: Duration::from_secs(cfg.ptz.idle_behavior.sweep_interval_seconds),
        },
    ));

    let mut stream = StreamIngest::new(StreamIngestConfig {
        primary_url: cfg.rtsp.primary_url.clone(),
        backup_url: cfg.rtsp.backup_url.clone(),
        reconnect_delay: Duration::from_secs(cfg.rtsp.reconnect_delay_seconds),
        max_reconnect_attempts: cfg.rtsp.max_reconnect_attempts,
        buffer_size: cfg.rtsp.frame_buffer_size,
    });
    stream.start(Box::new(OpenCvVideoSource::default()));

    let bus = MessageBus::connect(&cfg.events.redis)?;
    let (event_tx, event_rx) = flume::unbounded();
    let publisher_handle = spawn_publisher(bus, event_rx);

    // The detector is an external collaborator (Non-goal: detection algorithmics); a real
    // deployment substitutes an `ObjectDetector` impl that calls out to an inference
    // service. `NullDetector` keeps this binary runnable end to end without one.
    let pipeline_config = PipelineConfig {
        frame_read_timeout: Duration::from_millis(200),
        status_publish_interval: Duration::from_secs(2),
        idle_monitor_interval: Duration::from_secs(1),
        crop_base_dir: PathBuf::from("./captures"),
        target_plate_height: cfg.anpr.capture.zoom_target_plate_height,
    };
    let mut pipeline = Pipeline::new(
        stream,
        Box::new(NullDetector::default()),
        tracker,
        prioritizer,
        proposer,
        controller,
        event_tx,
        pipeline_config,
    );

    let stop_flag = Arc::new(AtomicBool::new(false));
    let ctrlc_stop_flag = stop_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            ctrlc_stop_flag.store(true, Ordering::SeqCst);
        }
    });

    let run_stop_flag = stop_flag.clone();
    tokio::task::spawn_blocking(move || pipeline.run(run_stop_flag)).await?;

    drop(publisher_handle);
    Ok(())
}

fn build_strategy(cfg: &AppConfig) -> Strategy {
    let roi_zones = || {
        cfg.prioritization
            .roi_zones
            .iter()
            .map(|z| RoiZone { name: z.name.clone(), weight: z.weight, polygon: z.polygon.clone() })
            .collect::<Vec<_>>()
    };

    match cfg.prioritization.strategy.as_str() {
        "proximity" => Strategy::Proximity,
        "roi" => Strategy::Roi { zones: roi_zones() },
        _ => Strategy::Weighted {
            weights: Weights {
                proximity: cfg.prioritization.weights.proximity,
                roi: cfg.prioritization.weights.roi,
                speed: cfg.prioritization.weights.speed,
                novelty: cfg.prioritization.weights.novelty,
            },
            roi_zones: roi_zones(),
        },
    }
}

fn print_startup_info(cfg: &AppConfig) {
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║                     ARGUS VISION                          ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("  Stream:    {} (backup: {})", cfg.rtsp.primary_url, cfg.rtsp.backup_url.as_deref().unwrap_or("none"));
    println!("  PTZ host:  {}:{}", cfg.ptz.onvif.host, cfg.ptz.onvif.port);
    println!("  Strategy:  {}", cfg.prioritization.strategy);
    println!("  Event bus: redis://{}:{}", cfg.events.redis.host, cfg.events.redis.port);
    println!("  Log level: {}", cfg.logging.level);
    println!("╚══════════════════════════════════════════════════════════╝");
}
