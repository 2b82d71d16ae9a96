//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `serial` - Serial monitor for the gun trigger device
//! - `capture` - Camera frame acquisition
//! - `vision` - Blob extraction from frames
//! - `sink` - Shot output (JSONL format)

pub mod capture;
pub mod serial;
pub mod sink;
pub mod vision;

// Re-export commonly used types
pub use capture::{create_frame_source, Frame, FrameSource, SpotInjector, SyntheticSource};
pub use serial::TriggerMonitor;
pub use sink::{EventSink, ShotLog};
pub use vision::{BlobExtractor, RedMaskExtractor};
