//! Shot output sink
//!
//! Fire events, off-target shots, and stale-signal reports leave the core
//! through the `EventSink` trait. The bundled `ShotLog` appends JSONL
//! records (one JSON object per line); how anything downstream displays or
//! reacts to shots is not the core's concern.

use crate::domain::types::{epoch_ms, FireEvent, GunId, Point, TriggerEvent};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};

/// Receives the pipeline's outward-facing notifications.
pub trait EventSink: Send + Sync {
    /// A correlated, on-screen shot
    fn fire(&self, event: &FireEvent);
    /// Trigger matched but the mapped point fell outside the screen
    fn off_target(&self, gun: GunId, center: Point);
    /// Trigger events that aged out unmatched. Never called with an empty
    /// slice; stale signals are always reported, never silently dropped.
    fn stale_signals(&self, events: &[TriggerEvent], now_ms: u64);
}

#[derive(Serialize)]
struct ShotRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    gun: GunId,
    x: f64,
    y: f64,
    ts: u64,
}

#[derive(Serialize)]
struct StaleRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    gun: GunId,
    ts: u64,
    age_ms: u64,
}

/// JSONL shot log
pub struct ShotLog {
    file_path: String,
}

impl ShotLog {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "shot_log_initialized");
        Self { file_path: file_path.to_string() }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    }

    fn write_record<T: Serialize>(&self, record: &T) {
        match serde_json::to_string(record) {
            Ok(json) => {
                if let Err(e) = self.append_line(&json) {
                    error!(file = %self.file_path, error = %e, "shot_log_write_failed");
                }
            }
            Err(e) => error!(error = %e, "shot_record_serialize_failed"),
        }
    }
}

impl EventSink for ShotLog {
    fn fire(&self, event: &FireEvent) {
        info!(
            gun = %event.gun,
            x = %format!("{:.1}", event.target.x),
            y = %format!("{:.1}", event.target.y),
            "shot_fired"
        );
        self.write_record(&ShotRecord {
            kind: "fire",
            gun: event.gun,
            x: event.target.x,
            y: event.target.y,
            ts: event.timestamp_ms,
        });
    }

    fn off_target(&self, gun: GunId, center: Point) {
        info!(gun = %gun, center = %center, "shot_off_target");
        self.write_record(&ShotRecord {
            kind: "off_target",
            gun,
            x: center.x,
            y: center.y,
            ts: epoch_ms(),
        });
    }

    fn stale_signals(&self, events: &[TriggerEvent], now_ms: u64) {
        warn!(count = %events.len(), "stale_signals_dropped");
        for event in events {
            self.write_record(&StaleRecord {
                kind: "stale",
                gun: event.gun,
                ts: event.timestamp_ms,
                age_ms: now_ms.saturating_sub(event.timestamp_ms),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_shot_log_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots.jsonl");
        let log = ShotLog::new(path.to_str().unwrap());

        log.fire(&FireEvent {
            gun: GunId::A,
            target: Point::new(960.0, 540.0),
            timestamp_ms: 1234,
        });
        log.off_target(GunId::B, Point::new(12.0, 7.0));
        log.stale_signals(
            &[TriggerEvent { gun: GunId::A, timestamp_ms: 100, received_at: Instant::now() }],
            500,
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let fire: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(fire["type"], "fire");
        assert_eq!(fire["gun"], "a");
        assert_eq!(fire["x"], 960.0);

        let stale: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(stale["type"], "stale");
        assert_eq!(stale["age_ms"], 400);
    }
}
