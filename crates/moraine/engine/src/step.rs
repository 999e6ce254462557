//! The step trait and the context steps execute in

use moraine_types::{
    AttributeValue, CollectionSet, Experiment, NodeId, PipelineError, PipelineResult, SampleArena,
    SampleBatch, OUTPUT_EDGE,
};

use crate::convergence::{ConvergenceTable, GiveUpReason};

/// One unit of computation in a resolved graph.
///
/// A step receives a batch of arena indices, reads and writes sample
/// attributes through the [`StepContext`], and says where each index
/// goes next. Returning `Err` from [`apply`](Step::apply) aborts the
/// whole run; per-sample problems belong in
/// [`StepOutput::failures`] instead so the rest of the batch survives.
pub trait Step: Send + Sync {
    /// The registered name, used in workflows and log lines.
    fn name(&self) -> &str;

    /// Process one batch.
    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput>;

    /// Whether this step bounds a loop. Only bounded controllers may be
    /// the source of a `loop` edge.
    fn is_bounded_controller(&self) -> bool {
        false
    }
}

/// Everything a step may touch while processing a batch.
pub struct StepContext<'a> {
    /// The samples of this run, addressed by index.
    pub arena: &'a mut SampleArena,
    /// The frozen run parameters.
    pub experiment: &'a Experiment,
    /// Read-only lookup tables.
    pub collections: &'a CollectionSet,
    /// Engine-owned iteration state for loop controllers.
    pub convergence: &'a mut ConvergenceTable,
    /// The node this step instance occupies in the resolved graph.
    pub node: &'a NodeId,
}

impl StepContext<'_> {
    /// Numeric attribute of the sample at `index`, as a sample-scoped
    /// error when missing or non-numeric.
    pub fn read_f64(&self, index: usize, attribute: &str, step: &str) -> PipelineResult<f64> {
        read_f64(self.arena, index, attribute, step)
    }

    /// Write an attribute of the sample at `index` under the run
    /// namespace.
    pub fn write(&mut self, index: usize, attribute: &str, value: impl Into<AttributeValue>) {
        self.arena.set_value(index, attribute, value);
    }
}

/// Numeric attribute read against a borrowed arena, for closures that
/// already hold the context mutably.
pub fn read_f64(
    arena: &SampleArena,
    index: usize,
    attribute: &str,
    step: &str,
) -> PipelineResult<f64> {
    arena
        .value(index, attribute)
        .and_then(AttributeValue::as_f64)
        .ok_or_else(|| PipelineError::MissingAttribute {
            sample: arena.id(index).clone(),
            attribute: attribute.to_string(),
            step: step.to_string(),
        })
}

/// Where a step sends its batch.
///
/// Indices a step neither routes, fails, nor retires are treated as
/// dropped by the engine — steps are expected to account for every
/// index they were handed.
#[derive(Debug, Default)]
pub struct StepOutput {
    /// Outgoing batches by edge label. A label without a matching edge
    /// in the graph completes those samples.
    pub routes: Vec<(String, SampleBatch)>,
    /// Sample-scoped failures: the index leaves the run as errored.
    pub failures: Vec<(usize, PipelineError)>,
    /// Samples whose loop gave up: the index leaves the run with the
    /// given reason.
    pub retired: Vec<(usize, GiveUpReason)>,
}

impl StepOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole batch continues along the `output` edge.
    pub fn forward(batch: SampleBatch) -> Self {
        let mut output = Self::new();
        output.push_route(OUTPUT_EDGE, batch);
        output
    }

    /// Send a batch along `label`. Empty batches are not recorded.
    pub fn push_route(&mut self, label: impl Into<String>, batch: SampleBatch) {
        if !batch.is_empty() {
            self.routes.push((label.into(), batch));
        }
    }

    /// Record a sample-scoped failure.
    pub fn push_failure(&mut self, index: usize, error: PipelineError) {
        self.failures.push((index, error));
    }

    /// Retire a sample whose loop gave up.
    pub fn push_retired(&mut self, index: usize, reason: GiveUpReason) {
        self.retired.push((index, reason));
    }
}

/// Run a per-sample computation over a batch, forwarding the samples
/// that succeed and recording a failure for each one that does not.
///
/// Errors from `compute` must be sample-scoped; fatal conditions such as
/// a missing collection belong in the step's `apply` before it descends
/// to individual samples.
pub fn apply_per_sample<F>(
    ctx: &mut StepContext<'_>,
    batch: &SampleBatch,
    mut compute: F,
) -> StepOutput
where
    F: FnMut(&mut StepContext<'_>, usize) -> PipelineResult<()>,
{
    let mut output = StepOutput::new();
    let mut keep = SampleBatch::new();
    for index in batch.iter() {
        match compute(ctx, index) {
            Ok(()) => keep.push(index),
            Err(error) => output.push_failure(index, error),
        }
    }
    output.push_route(OUTPUT_EDGE, keep);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use moraine_types::{Sample, SampleId};

    fn make_context_parts() -> (SampleArena, Experiment, CollectionSet, ConvergenceTable) {
        let samples = vec![
            Sample::new(SampleId::new("s0")).with_input("depth", 1.0),
            Sample::new(SampleId::new("s1")),
        ];
        (
            SampleArena::new(samples, "run").unwrap(),
            Experiment::new("run"),
            CollectionSet::new(),
            ConvergenceTable::new(),
        )
    }

    #[test]
    fn test_apply_per_sample_splits_failures() {
        let (mut arena, experiment, collections, mut convergence) = make_context_parts();
        let node = NodeId::new("n");
        let mut ctx = StepContext {
            arena: &mut arena,
            experiment: &experiment,
            collections: &collections,
            convergence: &mut convergence,
            node: &node,
        };

        let batch = SampleBatch::full(2);
        let output = apply_per_sample(&mut ctx, &batch, |ctx, index| {
            let depth = ctx.read_f64(index, "depth", "Doubler")?;
            ctx.write(index, "doubled", depth * 2.0);
            Ok(())
        });

        assert_eq!(output.routes.len(), 1);
        assert_eq!(output.routes[0].0, OUTPUT_EDGE);
        assert_eq!(output.routes[0].1, SampleBatch::from_indices(vec![0]));
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].0, 1);
        assert!(matches!(
            output.failures[0].1,
            PipelineError::MissingAttribute { .. }
        ));
        assert_eq!(
            arena.value(0, "doubled"),
            Some(&AttributeValue::Float(2.0))
        );
    }

    #[test]
    fn test_empty_routes_are_not_recorded() {
        let mut output = StepOutput::new();
        output.push_route(OUTPUT_EDGE, SampleBatch::new());
        assert!(output.routes.is_empty());
    }
}
