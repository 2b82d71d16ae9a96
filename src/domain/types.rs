//! Shared types for the shot detection gateway

use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// A real-valued 2D coordinate. Carries no intrinsic unit; whether it lives
/// in camera space or screen space depends on which component produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// The four camera-space corners of the projected surface, in arbitrary
/// input order. Degenerate (collinear/coincident) configurations are not
/// validated here; the mapper rejects them at build time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationQuad(pub [Point; 4]);

impl CalibrationQuad {
    pub fn new(corners: [Point; 4]) -> Self {
        Self(corners)
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.0
    }
}

/// One connected color region found in a frame: centroid-of-mass plus pixel
/// area. Produced and consumed within a single frame, never retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobCandidate {
    pub center: Point,
    pub area: f64,
}

/// Which physical gun fired. Parsed from the serial device's line protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GunId {
    A,
    B,
}

impl GunId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            GunId::A => "a",
            GunId::B => "b",
        }
    }
}

impl std::fmt::Display for GunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete trigger signal from the hardware device.
///
/// `timestamp_ms` is assigned by the serial monitor on receipt and is
/// monotonically non-decreasing within the queue.
#[derive(Debug, Clone, Copy)]
pub struct TriggerEvent {
    pub gun: GunId,
    pub timestamp_ms: u64,
    pub received_at: Instant,
}

impl TriggerEvent {
    pub fn now(gun: GunId) -> Self {
        Self { gun, timestamp_ms: epoch_ms(), received_at: Instant::now() }
    }
}

/// A successful correlation + mapping: gun `gun` hit the screen at `target`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FireEvent {
    pub gun: GunId,
    pub target: Point,
    /// Epoch ms of the trigger event this shot was correlated with
    pub timestamp_ms: u64,
}

/// Outcome of processing one frame. Only `Fired` carries a shot; the other
/// variants are expected, non-error outcomes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// No blob survived reduction
    NoCandidate,
    /// A blob was detected but no fresh trigger matched it
    NoTrigger { center: Point },
    /// Trigger matched but the mapped point fell outside the screen
    OffTarget { gun: GunId, center: Point },
    /// Correlated and mapped
    Fired(FireEvent),
}
