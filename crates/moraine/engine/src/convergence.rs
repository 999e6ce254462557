//! Engine-owned iteration state for loop controllers
//!
//! Convergence bookkeeping lives in the engine, not in sample
//! attributes: a sample's attribute bag records science, the
//! [`ConvergenceTable`] records how many times a controller has sent it
//! around a loop. Entries are keyed by `(arena index, controller node)`
//! so the same sample can sit in two nested loops without the counters
//! colliding, and an entry is removed the moment its sample leaves the
//! loop — by converging, by giving up, or by erroring out elsewhere.

use std::collections::HashMap;
use std::fmt;

use moraine_types::NodeId;
use serde::{Deserialize, Serialize};

/// Where a sample stands in one controller's loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPhase {
    /// The controller has not seen this sample yet.
    FirstPass,
    /// At least one pass recorded, none terminal.
    Iterating,
    /// The loop met its goal.
    Converged,
    /// The driven value settled without meeting the goal.
    Saturated,
    /// The iteration cap was reached.
    CapExceeded,
}

/// Why a controller gave up on a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GiveUpReason {
    /// The driven value stopped moving.
    Saturated,
    /// The iteration cap was reached.
    CapExceeded,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GiveUpReason::Saturated => write!(f, "saturated"),
            GiveUpReason::CapExceeded => write!(f, "iteration cap exceeded"),
        }
    }
}

/// Tuning for saturation detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaturationSettings {
    /// A driven value moving less than this per pass counts as settled.
    pub tolerance: f64,
    /// Settling is only trusted after this many passes.
    pub min_iterations: u64,
    /// Hard cap on passes per sample.
    pub max_iterations: u64,
}

impl Default for SaturationSettings {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            min_iterations: 10,
            max_iterations: 150_000,
        }
    }
}

/// One sample's state in one controller's loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    /// Completed loop passes. Zero on the controller's first visit.
    pub iterations: u64,
    /// The driven value observed on the most recent pass.
    pub last_value: Option<f64>,
    pub phase: LoopPhase,
}

impl Default for ConvergenceState {
    fn default() -> Self {
        Self {
            iterations: 0,
            last_value: None,
            phase: LoopPhase::FirstPass,
        }
    }
}

/// Iteration state for every in-flight loop of a run, plus the furthest
/// model time any sample has reached.
#[derive(Debug, Default)]
pub struct ConvergenceTable {
    states: HashMap<(usize, NodeId), ConvergenceState>,
    max_time: f64,
}

impl ConvergenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state a controller sees when visiting a sample, creating a
    /// first-pass entry on first contact.
    pub fn observe(&mut self, index: usize, node: &NodeId) -> ConvergenceState {
        *self.states.entry((index, node.clone())).or_default()
    }

    /// Record one completed pass and the driven value it produced.
    pub fn record_pass(&mut self, index: usize, node: &NodeId, observed: f64) {
        let state = self.states.entry((index, node.clone())).or_default();
        state.iterations += 1;
        state.last_value = Some(observed);
        state.phase = LoopPhase::Iterating;
    }

    /// The loop met its goal: clear the entry and report the terminal
    /// state for logging.
    pub fn converge(&mut self, index: usize, node: &NodeId) -> ConvergenceState {
        let mut state = self
            .states
            .remove(&(index, node.clone()))
            .unwrap_or_default();
        state.phase = LoopPhase::Converged;
        state
    }

    /// The loop gave up: clear the entry and report the terminal state.
    pub fn retire(
        &mut self,
        index: usize,
        node: &NodeId,
        reason: GiveUpReason,
    ) -> ConvergenceState {
        let mut state = self
            .states
            .remove(&(index, node.clone()))
            .unwrap_or_default();
        state.phase = match reason {
            GiveUpReason::Saturated => LoopPhase::Saturated,
            GiveUpReason::CapExceeded => LoopPhase::CapExceeded,
        };
        state
    }

    /// Drop every entry for one sample, whichever loops it was in. Used
    /// when a sample leaves the run through a failure elsewhere.
    pub fn clear_sample(&mut self, index: usize) {
        self.states.retain(|(i, _), _| *i != index);
    }

    /// Current phase of one sample in one loop, if tracked.
    pub fn phase(&self, index: usize, node: &NodeId) -> Option<LoopPhase> {
        self.states.get(&(index, node.clone())).map(|s| s.phase)
    }

    /// Indices currently inside any loop, ascending and deduplicated.
    pub fn iterating(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.states.keys().map(|(i, _)| *i).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Fold a model time into the furthest-time watermark.
    pub fn record_time(&mut self, time: f64) {
        if time > self.max_time {
            self.max_time = time;
        }
    }

    /// The furthest model time any sample has reached this run.
    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
