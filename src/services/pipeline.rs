//! Per-frame detection pipeline
//!
//! Orchestrates one frame: extract blobs, reduce to one detection,
//! correlate against the trigger queue, map through the current transform,
//! emit. The pipeline holds no cross-frame state except the transform,
//! which a calibration update may hot-swap between any two frames.
//!
//! Per-frame outcomes (no candidate, no trigger, off-target) never escape
//! the loop; only capture failures do.

use crate::domain::types::{BlobCandidate, CalibrationQuad, FireEvent, FrameOutcome, TriggerEvent};
use crate::domain::types::epoch_ms;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::capture::FrameSource;
use crate::io::sink::EventSink;
use crate::io::vision::BlobExtractor;
use crate::services::correlator::TriggerCorrelator;
use crate::services::mapper::{DegenerateCalibration, ProjectiveTransform};
use crate::services::reducer::DetectionReducer;
use anyhow::Context;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

/// Calibration collaborator surface. Cloneable; a rejected recalibration
/// leaves the previous transform in effect.
#[derive(Clone)]
pub struct CalibrationHandle {
    transform: Arc<RwLock<Option<ProjectiveTransform>>>,
}

impl CalibrationHandle {
    /// Replace the active transform. The swap is a single write under the
    /// lock, so the frame loop observes either the old or the new transform
    /// in full, never a mixture.
    pub fn recalibrate(
        &self,
        quad: &CalibrationQuad,
        size: (f64, f64),
    ) -> Result<(), DegenerateCalibration> {
        let transform = ProjectiveTransform::build(quad, size)?;
        *self.transform.write() = Some(transform);
        info!(width = %size.0, height = %size.1, "recalibrated");
        Ok(())
    }
}

/// The frame-processing half of the gateway: single consumer of the
/// trigger queue, sole reader of the active transform.
pub struct FramePipeline {
    reducer: DetectionReducer,
    correlator: TriggerCorrelator,
    transform: Arc<RwLock<Option<ProjectiveTransform>>>,
    trigger_rx: mpsc::UnboundedReceiver<TriggerEvent>,
    sink: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
}

impl FramePipeline {
    /// Build the pipeline with the initial calibration from config.
    pub fn new(
        config: &Config,
        trigger_rx: mpsc::UnboundedReceiver<TriggerEvent>,
        sink: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, DegenerateCalibration> {
        let transform =
            ProjectiveTransform::build(&config.calibration_quad(), config.screen_size())?;

        Ok(Self {
            reducer: DetectionReducer::new(config.min_area(), config.max_area()),
            correlator: TriggerCorrelator::new(
                config.max_signal_age_ms(),
                config.correlation_policy(),
            ),
            transform: Arc::new(RwLock::new(Some(transform))),
            trigger_rx,
            sink,
            metrics,
        })
    }

    /// Handle for calibration updates from outside the frame loop.
    pub fn calibration_handle(&self) -> CalibrationHandle {
        CalibrationHandle { transform: self.transform.clone() }
    }

    /// Process one frame's blob candidates at the current wall clock.
    pub fn process_blobs(&mut self, blobs: &[BlobCandidate]) -> FrameOutcome {
        self.process_blobs_at(blobs, epoch_ms())
    }

    /// Process one frame's blob candidates at an explicit timestamp.
    /// The correlator is consulted only when a detection exists.
    pub fn process_blobs_at(&mut self, blobs: &[BlobCandidate], now_ms: u64) -> FrameOutcome {
        let Some(detection) = self.reducer.reduce(blobs) else {
            return FrameOutcome::NoCandidate;
        };
        self.metrics.record_detection();
        trace!(center = %detection.center, area = %detection.area, "spot_detected");

        let correlation = self.correlator.correlate(&mut self.trigger_rx, now_ms);

        if !correlation.stale.is_empty() {
            self.metrics.record_stale_signals(correlation.stale.len() as u64);
            self.sink.stale_signals(&correlation.stale, now_ms);
        }
        if correlation.superseded > 0 {
            self.metrics.record_superseded(correlation.superseded as u64);
            debug!(count = %correlation.superseded, "fresh_triggers_superseded");
        }

        let Some(trigger) = correlation.matched else {
            self.metrics.record_no_trigger();
            debug!(center = %detection.center, "detection_without_trigger");
            return FrameOutcome::NoTrigger { center: detection.center };
        };

        let mapped = self.transform.read().as_ref().and_then(|t| t.apply(detection.center));

        match mapped {
            Some(target) => {
                let fire = FireEvent { gun: trigger.gun, target, timestamp_ms: trigger.timestamp_ms };
                self.metrics.record_fire(trigger.gun);
                self.sink.fire(&fire);
                FrameOutcome::Fired(fire)
            }
            None => {
                self.metrics.record_off_target();
                self.sink.off_target(trigger.gun, detection.center);
                FrameOutcome::OffTarget { gun: trigger.gun, center: detection.center }
            }
        }
    }

    /// Run the frame loop until shutdown or a fatal capture error.
    pub async fn run(
        mut self,
        mut source: Box<dyn FrameSource>,
        extractor: Box<dyn BlobExtractor>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!("frame_loop_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("frame_loop_shutdown");
                        return Ok(());
                    }
                }
                frame = source.next_frame() => {
                    let frame = frame.context("acquiring camera frame")?;

                    let frame_start = Instant::now();
                    let blobs = extractor.extract_blobs(&frame);
                    let outcome = self.process_blobs(&blobs);
                    self.metrics.record_frame(frame_start.elapsed().as_micros() as u64);

                    if let FrameOutcome::NoCandidate = outcome {
                        trace!("frame_without_candidate");
                    }
                }
            }
        }
    }
}
