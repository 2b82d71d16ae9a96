//! Application lifecycle
//!
//! Owns the shutdown signal and the two long-lived tasks: the serial trigger
//! monitor (producer side of the trigger queue) and the frame loop (consumer
//! side). A fatal error on either side initiates shutdown of the other;
//! teardown waits up to a grace period for the surviving task.

use crate::domain::types::TriggerEvent;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::capture::FrameSource;
use crate::io::serial::TriggerMonitor;
use crate::io::sink::{EventSink, ShotLog};
use crate::io::vision::BlobExtractor;
use crate::services::pipeline::{CalibrationHandle, FramePipeline};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Wires the pipeline to its collaborators and runs both loops to
/// completion. Consumed by `run`.
pub struct Runtime {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<Metrics>,
    metrics_interval: Duration,
    pipeline: FramePipeline,
    trigger_tx: mpsc::UnboundedSender<TriggerEvent>,
    monitor: Option<TriggerMonitor>,
}

impl Runtime {
    /// Build the runtime from config. Fails if the configured calibration
    /// quad is degenerate.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        let metrics = Arc::new(Metrics::new());
        let sink: Arc<dyn EventSink> = Arc::new(ShotLog::new(config.sink_file()));
        let pipeline = FramePipeline::new(config, trigger_rx, sink, metrics.clone())
            .context("building initial calibration")?;

        Ok(Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            metrics,
            metrics_interval: Duration::from_secs(config.metrics_interval_secs()),
            pipeline,
            trigger_tx: trigger_tx.clone(),
            monitor: Some(TriggerMonitor::new(config, trigger_tx)),
        })
    }

    /// Drop the serial monitor; triggers come from `trigger_sender` instead.
    /// Used by simulate mode.
    pub fn without_serial(mut self) -> Self {
        self.monitor = None;
        self
    }

    /// Producer handle for the trigger queue.
    pub fn trigger_sender(&self) -> mpsc::UnboundedSender<TriggerEvent> {
        self.trigger_tx.clone()
    }

    pub fn calibration_handle(&self) -> CalibrationHandle {
        self.pipeline.calibration_handle()
    }

    /// Run until Ctrl-C or a fatal collaborator error. Returns the error of
    /// whichever task failed first, after both tasks have stopped.
    pub async fn run(
        mut self,
        source: Box<dyn FrameSource>,
        extractor: Box<dyn BlobExtractor>,
    ) -> anyhow::Result<()> {
        // Ctrl-C wires into the shutdown signal
        let signal_shutdown = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown_signal_received");
                let _ = signal_shutdown.send(true);
            }
        });

        // Periodic metrics reporter
        let reporter_metrics = self.metrics.clone();
        let mut reporter_shutdown = self.shutdown_rx.clone();
        let report_interval = self.metrics_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(report_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => reporter_metrics.report().log(),
                    _ = reporter_shutdown.changed() => {
                        if *reporter_shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        let mut frame_task =
            tokio::spawn(self.pipeline.run(source, extractor, self.shutdown_rx.clone()));

        let result = match self.monitor.take() {
            Some(monitor) => {
                let mut monitor_task = tokio::spawn(monitor.run(self.shutdown_rx.clone()));
                tokio::select! {
                    frame = &mut frame_task => {
                        let _ = self.shutdown_tx.send(true);
                        drain("trigger_monitor", monitor_task).await;
                        join_result(frame)
                    }
                    serial = &mut monitor_task => {
                        let _ = self.shutdown_tx.send(true);
                        drain("frame_loop", frame_task).await;
                        join_result(serial)
                    }
                }
            }
            None => {
                let frame = frame_task.await;
                let _ = self.shutdown_tx.send(true);
                join_result(frame)
            }
        };

        self.metrics.report().log();
        result
    }
}

fn join_result(
    joined: Result<anyhow::Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    joined.context("task panicked")?
}

/// Wait for the surviving task, bounded by the shutdown grace period.
async fn drain(name: &str, task: JoinHandle<anyhow::Result<()>>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
        Ok(joined) => {
            if let Err(e) = join_result(joined) {
                warn!(task = name, error = %e, "task_exit_error");
            }
        }
        Err(_) => warn!(task = name, "task_shutdown_timed_out"),
    }
}
