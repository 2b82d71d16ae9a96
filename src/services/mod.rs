//! Services - detection, correlation, and mapping logic
//!
//! This module contains the core pipeline stages:
//! - `mapper` - Projective camera-to-screen transform
//! - `reducer` - Reduces raw blobs to at most one authoritative detection
//! - `correlator` - Matches detections against queued trigger signals
//! - `pipeline` - Per-frame orchestration of the stages above
//! - `runtime` - Application lifecycle and task supervision

pub mod correlator;
pub mod mapper;
pub mod pipeline;
pub mod reducer;
pub mod runtime;

// Re-export commonly used types
pub use correlator::{CorrelationPolicy, TriggerCorrelator};
pub use mapper::{DegenerateCalibration, ProjectiveTransform};
pub use pipeline::{CalibrationHandle, FramePipeline};
pub use reducer::DetectionReducer;
pub use runtime::Runtime;
