//! The work-queue runner and the run report

use std::collections::{HashSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use moraine_types::{
    Collection, CollectionSet, Experiment, Factor, FactorSet, NodeId, PipelineError,
    PipelineResult, Sample, SampleArena, SampleBatch, WorkflowDefinition,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::convergence::{ConvergenceTable, GiveUpReason};
use crate::observer::{NullObserver, ProgressSnapshot, RunObserver, RunVerdict};
use crate::registry::StepRegistry;
use crate::resolve::resolve;
use crate::step::StepContext;

/// Unique identifier for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// How one sample left the run. `None` in the tracking vector means the
// sample was still in flight when scheduling stopped.
#[derive(Debug, Clone)]
enum TerminalState {
    Completed,
    Retired(GiveUpReason),
    Errored(PipelineError),
    Discarded,
}

/// Drives batches of samples through resolved workflows.
///
/// A runner owns the step registry, the variant slots, and the shared
/// collections; individual runs borrow them. Runs are synchronous and
/// single-threaded, and a given workflow, experiment, and sample set
/// always schedules in the same order.
#[derive(Debug)]
pub struct PipelineRunner {
    registry: StepRegistry,
    factors: FactorSet,
    collections: CollectionSet,
}

impl PipelineRunner {
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            registry,
            factors: FactorSet::new(),
            collections: CollectionSet::new(),
        }
    }

    /// Make a variant slot available to workflows this runner executes.
    pub fn insert_factor(&mut self, factor: Factor) -> PipelineResult<()> {
        self.factors.insert(factor)
    }

    /// Make a collection available to steps this runner executes.
    pub fn insert_collection(&mut self, collection: Collection) -> PipelineResult<()> {
        self.collections.insert(collection)
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Run a workflow to completion over a batch of samples.
    pub fn run(
        &self,
        workflow: &WorkflowDefinition,
        experiment: &Experiment,
        samples: Vec<Sample>,
    ) -> PipelineResult<RunReport> {
        self.run_with_observer(workflow, experiment, samples, &mut NullObserver)
    }

    /// Run a workflow, reporting progress after every work item and
    /// honouring cancellation.
    ///
    /// Resolution happens before any sample is touched: a bad workflow,
    /// an unselected slot, or an unbounded loop fails here with the
    /// samples unmodified. During execution, sample-scoped failures move
    /// single samples to the errored partition; any other error aborts
    /// the run.
    pub fn run_with_observer(
        &self,
        workflow: &WorkflowDefinition,
        experiment: &Experiment,
        samples: Vec<Sample>,
        observer: &mut dyn RunObserver,
    ) -> PipelineResult<RunReport> {
        let run_id = RunId::generate();
        let started_at = Utc::now();

        let graph = resolve(workflow, experiment, &self.factors, &self.registry)?;
        let mut arena = SampleArena::new(samples, experiment.name())?;
        let total = arena.len();
        info!(
            run = %run_id.short(),
            workflow = %workflow.name,
            experiment = %experiment.name(),
            samples = total,
            "starting run"
        );

        let mut convergence = ConvergenceTable::new();
        let mut terminal: Vec<Option<TerminalState>> = vec![None; total];
        let mut queue: VecDeque<(NodeId, SampleBatch)> = VecDeque::new();
        if total > 0 {
            queue.push_back((graph.entry().clone(), SampleBatch::full(total)));
        }

        let mut cancelled = false;
        while let Some((node, batch)) = queue.pop_front() {
            let step = graph
                .step(&node)
                .ok_or_else(|| PipelineError::NodeNotFound(node.clone()))?;
            debug!(node = %node, step = step.name(), samples = batch.len(), "dispatching batch");

            let output = {
                let mut ctx = StepContext {
                    arena: &mut arena,
                    experiment,
                    collections: &self.collections,
                    convergence: &mut convergence,
                    node: &node,
                };
                step.apply(&mut ctx, batch.clone())?
            };

            let mut accounted: HashSet<usize> = HashSet::new();

            for (index, error) in output.failures {
                accounted.insert(index);
                convergence.clear_sample(index);
                warn!(
                    sample = %arena.id(index),
                    step = step.name(),
                    error = %error,
                    "sample errored"
                );
                if terminal[index].is_none() {
                    terminal[index] = Some(TerminalState::Errored(error));
                }
            }

            for (index, reason) in output.retired {
                accounted.insert(index);
                info!(sample = %arena.id(index), reason = %reason, "sample retired");
                if terminal[index].is_none() {
                    terminal[index] = Some(TerminalState::Retired(reason));
                }
            }

            for (label, routed) in output.routes {
                for index in routed.iter() {
                    accounted.insert(index);
                }
                // Indices already terminal stay where they are.
                let live: SampleBatch = routed.iter().filter(|i| terminal[*i].is_none()).collect();
                if live.is_empty() {
                    continue;
                }
                match graph.target(&node, &label) {
                    Some(next) => queue.push_back((next.clone(), live)),
                    None => {
                        // No edge under this label: the route completes.
                        for index in live.iter() {
                            terminal[index] = Some(TerminalState::Completed);
                        }
                    }
                }
            }

            for index in batch.iter() {
                if !accounted.contains(&index) && terminal[index].is_none() {
                    warn!(
                        sample = %arena.id(index),
                        step = step.name(),
                        "sample not routed by step, dropping"
                    );
                    terminal[index] = Some(TerminalState::Discarded);
                }
            }

            let snapshot = ProgressSnapshot {
                completed: terminal.iter().filter(|t| t.is_some()).count(),
                total,
                looping: convergence.iterating().len(),
                max_time: convergence.max_time(),
            };
            if observer.on_progress(snapshot) == RunVerdict::Cancel {
                cancelled = true;
                info!(run = %run_id.short(), "run cancelled by observer");
                break;
            }
        }

        let max_time = convergence.max_time();
        let mut converged = Vec::new();
        let mut saturated = Vec::new();
        let mut errored = Vec::new();
        let mut cancelled_samples = Vec::new();
        let mut dropped = Vec::new();
        for (state, sample) in terminal.into_iter().zip(arena.into_samples()) {
            match state {
                Some(TerminalState::Completed) => converged.push(sample),
                Some(TerminalState::Retired(reason)) => saturated.push((sample, reason)),
                Some(TerminalState::Errored(error)) => errored.push((sample, error)),
                Some(TerminalState::Discarded) => dropped.push(sample),
                None if cancelled => cancelled_samples.push(sample),
                None => {
                    warn!(sample = %sample.id(), "sample unaccounted for at queue drain");
                    dropped.push(sample);
                }
            }
        }

        let report = RunReport {
            run_id,
            experiment: experiment.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            max_time,
            converged,
            saturated,
            errored,
            cancelled: cancelled_samples,
            dropped,
        };
        info!(
            run = %report.run_id.short(),
            converged = report.converged.len(),
            saturated = report.saturated.len(),
            errored = report.errored.len(),
            cancelled = report.cancelled.len(),
            dropped = report.dropped.len(),
            max_time = report.max_time,
            "run finished"
        );
        Ok(report)
    }
}

/// Everything a finished (or cancelled) run produced.
///
/// The partitions are disjoint and together cover every sample the run
/// started with.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub experiment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The furthest model time any sample reached.
    pub max_time: f64,
    /// Samples that ran to completion.
    pub converged: Vec<Sample>,
    /// Samples whose loop gave up, with the reason.
    pub saturated: Vec<(Sample, GiveUpReason)>,
    /// Samples retired by a sample-scoped failure, with the error.
    pub errored: Vec<(Sample, PipelineError)>,
    /// Samples still in flight when the run was cancelled.
    pub cancelled: Vec<Sample>,
    /// Samples a step lost track of.
    pub dropped: Vec<Sample>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.converged.len()
            + self.saturated.len()
            + self.errored.len()
            + self.cancelled.len()
            + self.dropped.len()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.to_string(),
            experiment: self.experiment.clone(),
            converged: self.converged.len(),
            saturated: self.saturated.len(),
            errored: self.errored.len(),
            cancelled: self.cancelled.len(),
            dropped: self.dropped.len(),
            max_time: self.max_time,
            duration_ms: (self.finished_at - self.started_at).num_milliseconds(),
        }
    }
}

/// Serializable counts for logs and downstream tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub experiment: String,
    pub converged: usize,
    pub saturated: usize,
    pub errored: usize,
    pub cancelled: usize,
    pub dropped: usize,
    pub max_time: f64,
    pub duration_ms: i64,
}
