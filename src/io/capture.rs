//! Frame acquisition
//!
//! The physical camera is an external collaborator consumed through the
//! `FrameSource` trait; the backend is picked once at startup from config
//! rather than branched on inside the frame loop. This crate ships only the
//! synthetic source (simulate mode and tests); hardware backends plug in by
//! implementing `FrameSource`.

use crate::domain::types::Point;
use crate::infra::config::{CameraBackend, Config};
use async_trait::async_trait;
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One camera frame. Opaque to the pipeline beyond being passable to the
/// vision collaborator.
pub type Frame = RgbImage;

/// The capture collaborator could not be initialized or died mid-run.
/// Fatal: the lifecycle controller shuts both loops down.
#[derive(Debug)]
pub struct CaptureUnavailable {
    pub reason: String,
}

impl std::fmt::Display for CaptureUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "capture unavailable: {}", self.reason)
    }
}

impl std::error::Error for CaptureUnavailable {}

/// Blocking-pull frame producer. `next_frame` resolves at the camera's own
/// cadence; the frame loop never outruns it.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> anyhow::Result<Frame>;
}

/// Handle for injecting a spot into the synthetic source from another task
/// (the simulate-mode stdin reader).
#[derive(Clone, Default)]
pub struct SpotInjector {
    spot: Arc<Mutex<Option<Point>>>,
}

impl SpotInjector {
    pub fn set(&self, point: Point) {
        *self.spot.lock() = Some(point);
    }

    fn take(&self) -> Option<Point> {
        self.spot.lock().take()
    }
}

/// Synthetic frame source: black frames at a fixed cadence, with an
/// optionally injected bright spot that persists for exactly one frame.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    injector: SpotInjector,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(16),
            injector: SpotInjector::default(),
        }
    }

    pub fn injector(&self) -> SpotInjector {
        self.injector.clone()
    }

    /// Paint a saturated red disc; radius picked so the blob area lands
    /// inside the default 5..500 detection band.
    fn paint_spot(frame: &mut Frame, center: Point, radius: i64) {
        let (w, h) = (frame.width() as i64, frame.height() as i64);
        let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && x < w && y >= 0 && y < h {
                    frame.put_pixel(x as u32, y as u32, image::Rgb([255, 40, 40]));
                }
            }
        }
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> anyhow::Result<Frame> {
        tokio::time::sleep(self.frame_interval).await;
        let mut frame = RgbImage::new(self.width, self.height);
        if let Some(spot) = self.injector.take() {
            Self::paint_spot(&mut frame, spot, 4);
        }
        Ok(frame)
    }
}

/// Resolve the configured capture backend once at startup.
///
/// Hardware backends are external collaborators; only the synthetic source
/// is linked into this crate.
pub fn create_frame_source(config: &Config) -> anyhow::Result<Box<dyn FrameSource>> {
    match config.camera_backend() {
        CameraBackend::Synthetic => {
            info!(
                width = %config.camera_width(),
                height = %config.camera_height(),
                "synthetic_frame_source"
            );
            Ok(Box::new(SyntheticSource::new(config.camera_width(), config.camera_height())))
        }
        backend => Err(CaptureUnavailable {
            reason: format!(
                "camera backend '{}' is not linked into this build; \
                 provide a FrameSource implementation or use 'synthetic'",
                backend.as_str()
            ),
        }
        .into()),
    }
}
