//! End-to-end pipeline tests: synthetic frame in, shot record out

use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use shotmap::domain::{epoch_ms, FireEvent, FrameOutcome, GunId, Point, TriggerEvent};
use shotmap::infra::{Config, Metrics};
use shotmap::io::{BlobExtractor, EventSink, RedMaskExtractor};
use shotmap::services::FramePipeline;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;

#[derive(Default)]
struct RecordingSink {
    fires: Mutex<Vec<FireEvent>>,
    stale: Mutex<usize>,
}

impl EventSink for RecordingSink {
    fn fire(&self, event: &FireEvent) {
        self.fires.lock().push(*event);
    }
    fn off_target(&self, _gun: GunId, _center: Point) {}
    fn stale_signals(&self, events: &[TriggerEvent], _now_ms: u64) {
        *self.stale.lock() += events.len();
    }
}

fn config_with_calibration(corners: &str, screen: (u32, u32)) -> Config {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(
        temp_file,
        r#"
[screen]
width = {}
height = {}

[calibration]
corners = {}
"#,
        screen.0, screen.1, corners
    )
    .unwrap();
    temp_file.flush().unwrap();
    Config::from_file(temp_file.path()).unwrap()
}

fn paint_disc(frame: &mut RgbImage, cx: i64, cy: i64, radius: i64) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
                frame.put_pixel(x as u32, y as u32, Rgb([255, 30, 30]));
            }
        }
    }
}

struct Setup {
    pipeline: FramePipeline,
    trigger_tx: mpsc::UnboundedSender<TriggerEvent>,
    sink: Arc<RecordingSink>,
    extractor: RedMaskExtractor,
}

fn setup(config: &Config) -> Setup {
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let sink = Arc::new(RecordingSink::default());
    let pipeline =
        FramePipeline::new(config, trigger_rx, sink.clone(), Arc::new(Metrics::new())).unwrap();
    Setup { pipeline, trigger_tx, sink, extractor: RedMaskExtractor::default() }
}

#[test]
fn test_spot_with_fresh_trigger_fires_mapped_shot() {
    // Skewed quad inside a 1280x720 camera view, mapping onto a 1920x1080 screen
    let config = config_with_calibration(
        "[[346.0, 204.0], [905.0, 185.0], [943.0, 538.0], [301.0, 542.0]]",
        (1920, 1080),
    );
    let mut s = setup(&config);

    let mut frame = RgbImage::new(1280, 720);
    // Centroid of the quad: far from every edge, maps near screen center
    paint_disc(&mut frame, 623, 367, 4);

    s.trigger_tx.send(TriggerEvent::now(GunId::B)).unwrap();

    let blobs = s.extractor.extract_blobs(&frame);
    assert_eq!(blobs.len(), 1);

    let outcome = s.pipeline.process_blobs(&blobs);
    let FrameOutcome::Fired(fire) = outcome else {
        panic!("expected Fired, got {:?}", outcome);
    };
    assert_eq!(fire.gun, GunId::B);
    assert!(fire.target.x > 0.0 && fire.target.x < 1920.0);
    assert!(fire.target.y > 0.0 && fire.target.y < 1080.0);
    assert_eq!(s.sink.fires.lock().len(), 1);
}

#[test]
fn test_identity_calibration_preserves_coordinates() {
    let config = config_with_calibration(
        "[[0.0, 0.0], [640.0, 0.0], [640.0, 480.0], [0.0, 480.0]]",
        (640, 480),
    );
    let mut s = setup(&config);

    let mut frame = RgbImage::new(640, 480);
    paint_disc(&mut frame, 200, 300, 4);

    s.trigger_tx.send(TriggerEvent::now(GunId::A)).unwrap();

    let blobs = s.extractor.extract_blobs(&frame);
    let outcome = s.pipeline.process_blobs(&blobs);
    let FrameOutcome::Fired(fire) = outcome else {
        panic!("expected Fired, got {:?}", outcome);
    };
    // Centroid of a symmetric disc sits on its center, identity maps it through
    assert!((fire.target.x - 200.0).abs() < 0.5);
    assert!((fire.target.y - 300.0).abs() < 0.5);
}

#[test]
fn test_stale_trigger_is_reported_and_not_fired() {
    let config = config_with_calibration(
        "[[0.0, 0.0], [640.0, 0.0], [640.0, 480.0], [0.0, 480.0]]",
        (640, 480),
    );
    let mut s = setup(&config);

    let stale = TriggerEvent {
        gun: GunId::A,
        timestamp_ms: epoch_ms() - 1000,
        received_at: std::time::Instant::now(),
    };
    s.trigger_tx.send(stale).unwrap();

    let mut frame = RgbImage::new(640, 480);
    paint_disc(&mut frame, 320, 240, 4);

    let blobs = s.extractor.extract_blobs(&frame);
    let outcome = s.pipeline.process_blobs(&blobs);

    assert!(matches!(outcome, FrameOutcome::NoTrigger { .. }));
    assert_eq!(*s.sink.stale.lock(), 1);
    assert!(s.sink.fires.lock().is_empty());
}

#[test]
fn test_recalibration_between_frames_changes_mapping() {
    let config = config_with_calibration(
        "[[0.0, 0.0], [640.0, 0.0], [640.0, 480.0], [0.0, 480.0]]",
        (640, 480),
    );
    let mut s = setup(&config);
    let handle = s.pipeline.calibration_handle();

    let mut frame = RgbImage::new(640, 480);
    paint_disc(&mut frame, 160, 120, 4);
    let blobs = s.extractor.extract_blobs(&frame);

    s.trigger_tx.send(TriggerEvent::now(GunId::A)).unwrap();
    let FrameOutcome::Fired(before) = s.pipeline.process_blobs(&blobs) else {
        panic!("expected Fired before recalibration");
    };
    assert!((before.target.x - 160.0).abs() < 0.5);

    // Shrink the quad to the top-left quadrant: the same camera point now
    // lands at the screen center
    let quad = shotmap::domain::CalibrationQuad::new([
        Point::new(0.0, 0.0),
        Point::new(320.0, 0.0),
        Point::new(320.0, 240.0),
        Point::new(0.0, 240.0),
    ]);
    handle.recalibrate(&quad, (640.0, 480.0)).unwrap();

    s.trigger_tx.send(TriggerEvent::now(GunId::B)).unwrap();
    let FrameOutcome::Fired(after) = s.pipeline.process_blobs(&blobs) else {
        panic!("expected Fired after recalibration");
    };
    assert!((after.target.x - 320.0).abs() < 0.5);
    assert!((after.target.y - 240.0).abs() < 0.5);
}
