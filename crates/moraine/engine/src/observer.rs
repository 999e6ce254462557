//! Progress reporting and cooperative cancellation

use serde::{Deserialize, Serialize};

/// A point-in-time view of a run, delivered after every work item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Samples that have reached a terminal state.
    pub completed: usize,
    /// Samples the run started with.
    pub total: usize,
    /// Samples currently inside a loop.
    pub looping: usize,
    /// The furthest model time any sample has reached.
    pub max_time: f64,
}

/// What the observer wants the run to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerdict {
    Continue,
    Cancel,
}

/// Receives progress between work items and may cancel the run.
///
/// Cancellation is cooperative: the engine finishes the work item in
/// hand, then stops scheduling. Samples still in flight land in the
/// report's cancelled partition.
pub trait RunObserver {
    fn on_progress(&mut self, snapshot: ProgressSnapshot) -> RunVerdict {
        let _ = snapshot;
        RunVerdict::Continue
    }
}

/// Observer that never cancels.
#[derive(Debug, Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_observer_continues() {
        let snapshot = ProgressSnapshot {
            completed: 0,
            total: 4,
            looping: 0,
            max_time: 0.0,
        };
        assert_eq!(NullObserver.on_progress(snapshot), RunVerdict::Continue);
    }
}
