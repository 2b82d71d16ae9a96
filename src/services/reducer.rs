//! Per-frame blob candidate reduction
//!
//! Collapses the raw blob list from the vision collaborator to at most one
//! authoritative detection: candidates outside the configured area band are
//! discarded, then the largest survivor wins. A single winner per frame is
//! deliberate; simultaneous emitters are not distinguished.

use crate::domain::types::BlobCandidate;
use tracing::trace;

/// Area-band filter plus largest-blob selection.
#[derive(Debug, Clone)]
pub struct DetectionReducer {
    min_area: f64,
    max_area: f64,
}

impl DetectionReducer {
    /// `min_area` and `max_area` are both exclusive: a candidate survives
    /// iff `min_area < area < max_area`.
    pub fn new(min_area: f64, max_area: f64) -> Self {
        Self { min_area, max_area }
    }

    /// Pick the authoritative detection for one frame, if any.
    ///
    /// Ties on area resolve to the first-seen candidate, so repeated runs
    /// over the same input always return the same blob.
    pub fn reduce(&self, candidates: &[BlobCandidate]) -> Option<BlobCandidate> {
        let mut best: Option<BlobCandidate> = None;

        for candidate in candidates {
            if candidate.area <= self.min_area || candidate.area >= self.max_area {
                trace!(
                    area = %candidate.area,
                    center = %candidate.center,
                    "blob_outside_area_band"
                );
                continue;
            }
            match best {
                Some(b) if candidate.area <= b.area => {}
                _ => best = Some(*candidate),
            }
        }

        best
    }
}
