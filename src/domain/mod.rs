//! Domain models - core data types shared across the system
//!
//! This module contains the canonical data types used throughout the system:
//! - `Point` - a real-valued coordinate in camera or screen space
//! - `CalibrationQuad` - the four corners defining the projected surface
//! - `BlobCandidate` - one detected color region in a frame
//! - `TriggerEvent` - a timestamped gun signal from the serial device
//! - `FireEvent` - a correlated, screen-mapped shot

pub mod types;

pub use types::{
    epoch_ms, BlobCandidate, CalibrationQuad, FireEvent, FrameOutcome, GunId, Point, TriggerEvent,
};
