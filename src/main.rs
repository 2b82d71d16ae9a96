//! Shotmap - laser shot detection and screen mapping
//!
//! Watches a camera pointed at a projected screen, finds the laser spot,
//! correlates it with trigger signals from the serial gun controller, and
//! maps the hit into screen coordinates.
//!
//! Module structure:
//! - `domain/` - Core types (Point, TriggerEvent, FireEvent)
//! - `io/` - External interfaces (serial, capture, vision, sink)
//! - `services/` - Pipeline stages (mapper, reducer, correlator, pipeline)
//! - `infra/` - Infrastructure (config, metrics)

use clap::Parser;
use shotmap::domain::{GunId, Point, TriggerEvent};
use shotmap::infra::Config;
use shotmap::io::{create_frame_source, RedMaskExtractor, SpotInjector, SyntheticSource};
use shotmap::services::Runtime;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Shotmap - laser shot detection and screen mapping
#[derive(Parser, Debug)]
#[command(name = "shotmap", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Run without hardware: stdin lines "a"/"b" fire simulated triggers
    /// against a synthetic camera
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=trace for per-frame visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "shotmap starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        camera_backend = %config.camera_backend().as_str(),
        serial_device = %config.serial_device(),
        serial_baud = %config.serial_baud(),
        screen_width = %config.screen_width(),
        screen_height = %config.screen_height(),
        area_band = %format!("{}..{}", config.min_area(), config.max_area()),
        max_signal_age_ms = %config.max_signal_age_ms(),
        correlation_policy = %config.correlation_policy().as_str(),
        sink_file = %config.sink_file(),
        simulate = %args.simulate,
        "config_loaded"
    );

    if args.simulate {
        run_simulated(&config).await
    } else {
        let runtime = Runtime::new(&config)?;
        let source = create_frame_source(&config)?;
        runtime.run(source, Box::new(RedMaskExtractor::default())).await
    }
}

/// Hardware-free mode: a synthetic camera plus a stdin trigger reader stand
/// in for the real camera and serial device.
async fn run_simulated(config: &Config) -> anyhow::Result<()> {
    let runtime = Runtime::new(config)?.without_serial();
    let trigger_tx = runtime.trigger_sender();

    let source = SyntheticSource::new(config.camera_width(), config.camera_height());
    let injector = source.injector();

    // Inject spots at the center of the calibration quad so simulated shots
    // land on the screen
    let corners = config.calibration_quad();
    let spot = quad_centroid(corners.corners());

    tokio::spawn(read_simulated_triggers(trigger_tx, injector, spot));

    info!(spot = %spot, "simulate_mode; type 'a' or 'b' + enter to fire");
    runtime.run(Box::new(source), Box::new(RedMaskExtractor::default())).await
}

fn quad_centroid(corners: &[Point; 4]) -> Point {
    let x = corners.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let y = corners.iter().map(|p| p.y).sum::<f64>() / 4.0;
    Point::new(x, y)
}

async fn read_simulated_triggers(
    trigger_tx: tokio::sync::mpsc::UnboundedSender<TriggerEvent>,
    injector: SpotInjector,
    spot: Point,
) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let gun = match line.trim() {
            "a" => GunId::A,
            "b" => GunId::B,
            "" => continue,
            other => {
                warn!(input = %other, "simulate_input_ignored");
                continue;
            }
        };
        injector.set(spot);
        if trigger_tx.send(TriggerEvent::now(gun)).is_err() {
            return;
        }
    }
}
