//! Serial trigger monitoring
//!
//! Protocol (ESP32 gun controller):
//! - Baud: 115200, 8N1
//! - Line-framed ASCII, one sentence per trigger:
//!   "ir laser fired from gun a" / "ir laser fired from gun b"
//! - A line containing "ready" announces device readiness after reset

use crate::domain::types::{GunId, TriggerEvent};
use crate::infra::config::Config;
use anyhow::Context;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

const GUN_A_SENTENCE: &str = "ir laser fired from gun a";
const GUN_B_SENTENCE: &str = "ir laser fired from gun b";
const READY_SENTENCE: &str = "ready";

/// The serial transport could not be opened or died mid-run. Fatal: the
/// lifecycle controller shuts the pipeline down; reconnection policy lives
/// with an outer supervisor, not here.
#[derive(Debug)]
pub struct TransportUnavailable {
    pub device: String,
    pub reason: String,
}

impl std::fmt::Display for TransportUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "serial transport {} unavailable: {}", self.device, self.reason)
    }
}

impl std::error::Error for TransportUnavailable {}

/// What one serial line meant, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineSignal {
    Trigger(GunId),
    Ready,
}

/// Classify one decoded line from the device. Matching is by substring,
/// mirroring the firmware which prefixes sentences with debug noise.
fn parse_line(line: &str) -> Option<LineSignal> {
    let line = line.to_ascii_lowercase();
    if line.contains(GUN_A_SENTENCE) {
        Some(LineSignal::Trigger(GunId::A))
    } else if line.contains(GUN_B_SENTENCE) {
        Some(LineSignal::Trigger(GunId::B))
    } else if line.contains(READY_SENTENCE) {
        Some(LineSignal::Ready)
    } else {
        None
    }
}

/// Reads trigger sentences from the serial device and pushes timestamped
/// events into the trigger queue. The single producer side of the queue.
pub struct TriggerMonitor {
    device: String,
    baud: u32,
    settle: Duration,
    event_tx: mpsc::UnboundedSender<TriggerEvent>,
}

impl TriggerMonitor {
    pub fn new(config: &Config, event_tx: mpsc::UnboundedSender<TriggerEvent>) -> Self {
        Self {
            device: config.serial_device().to_string(),
            baud: config.serial_baud(),
            settle: Duration::from_millis(config.serial_settle_ms()),
            event_tx,
        }
    }

    /// Run the read loop until shutdown or a fatal transport error.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(device = %self.device, baud = %self.baud, "trigger_monitor_started");

        let port = tokio_serial::new(&self.device, self.baud)
            .timeout(Duration::from_millis(1000))
            .open_native_async()
            .map_err(|e| TransportUnavailable {
                device: self.device.clone(),
                reason: e.to_string(),
            })
            .context("opening trigger serial port")?;

        info!(device = %self.device, "trigger_port_opened");

        // Give the microcontroller time to come out of reset
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let mut reader = BufReader::new(port);
        let mut line = String::new();

        loop {
            line.clear();
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("trigger_monitor_shutdown");
                        return Ok(());
                    }
                }
                read = reader.read_line(&mut line) => {
                    match read {
                        Ok(0) => {
                            return Err(TransportUnavailable {
                                device: self.device.clone(),
                                reason: "serial stream closed".to_string(),
                            }
                            .into());
                        }
                        Ok(_) => self.handle_line(line.trim()),
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                            // No data within the port timeout; normal
                        }
                        Err(e) => {
                            return Err(TransportUnavailable {
                                device: self.device.clone(),
                                reason: e.to_string(),
                            }
                            .into());
                        }
                    }
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        if line.is_empty() {
            return;
        }

        match parse_line(line) {
            Some(LineSignal::Trigger(gun)) => {
                let event = TriggerEvent::now(gun);
                debug!(gun = %gun, timestamp_ms = %event.timestamp_ms, "trigger_received");
                if self.event_tx.send(event).is_err() {
                    warn!("trigger_queue_closed");
                }
            }
            Some(LineSignal::Ready) => {
                info!(device = %self.device, "trigger_device_ready");
            }
            None => {
                debug!(line = %line, "trigger_line_ignored");
            }
        }
    }
}
