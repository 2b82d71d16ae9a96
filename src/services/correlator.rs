//! Trigger-to-detection correlation
//!
//! When a frame produces a detection, the correlator drains the trigger
//! queue in arrival order and splits events into fresh (within the signal
//! age window) and stale. Stale events are always reported to the sink,
//! never silently dropped. The queue is only ever polled, never waited on:
//! it is driven by the frame cadence, not the trigger cadence.

use crate::domain::types::TriggerEvent;
use serde::Deserialize;
use smallvec::SmallVec;
use tokio::sync::mpsc;

/// Which fresh event wins when several are queued.
///
/// The two observed field prototypes disagree on this, so it is a named
/// configuration choice rather than a silent pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationPolicy {
    /// Stop at the first fresh event, preserving causal trigger order.
    /// An earlier unconsumed trigger can never be jumped by a later one.
    #[default]
    FirstFresh,
    /// Drain the whole queue and keep the most recently arrived fresh
    /// event; earlier fresh events are consumed and counted as superseded.
    LatestFresh,
}

impl CorrelationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationPolicy::FirstFresh => "first-fresh",
            CorrelationPolicy::LatestFresh => "latest-fresh",
        }
    }
}

/// Result of one correlation pass.
#[derive(Debug, Default)]
pub struct Correlation {
    /// The trigger matched to this frame's detection, if any
    pub matched: Option<TriggerEvent>,
    /// Events that aged out before a detection arrived to claim them
    pub stale: SmallVec<[TriggerEvent; 4]>,
    /// Fresh events consumed but replaced by a later one (latest-fresh only)
    pub superseded: usize,
}

/// Matches detections against queued trigger events within a time window.
#[derive(Debug, Clone)]
pub struct TriggerCorrelator {
    max_age_ms: u64,
    policy: CorrelationPolicy,
}

impl TriggerCorrelator {
    pub fn new(max_age_ms: u64, policy: CorrelationPolicy) -> Self {
        Self { max_age_ms, policy }
    }

    /// Run one correlation pass at `now_ms`. Call only when the current
    /// frame produced a detection; an empty queue yields "no trigger".
    pub fn correlate(
        &self,
        queue: &mut mpsc::UnboundedReceiver<TriggerEvent>,
        now_ms: u64,
    ) -> Correlation {
        let mut result = Correlation::default();

        while let Ok(event) = queue.try_recv() {
            if now_ms.saturating_sub(event.timestamp_ms) > self.max_age_ms {
                result.stale.push(event);
                continue;
            }

            match self.policy {
                CorrelationPolicy::FirstFresh => {
                    result.matched = Some(event);
                    break;
                }
                CorrelationPolicy::LatestFresh => {
                    if result.matched.is_some() {
                        result.superseded += 1;
                    }
                    result.matched = Some(event);
                }
            }
        }

        result
    }

    pub fn max_age_ms(&self) -> u64 {
        self.max_age_ms
    }
}
