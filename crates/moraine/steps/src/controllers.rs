//! Bounded loop controllers
//!
//! A controller is the step a loop edge must leave from: each visit it
//! decides, per sample, whether to send the sample around the loop
//! again, release it along `output`, or retire it. Both controllers
//! here carry an iteration cap, which is what makes a workflow
//! containing their loop admissible.

use moraine_engine::{
    ConvergenceState, GiveUpReason, SaturationSettings, Step, StepContext, StepOutput,
};
use moraine_types::{PipelineResult, SampleBatch, LOOP_EDGE, OUTPUT_EDGE};
use tracing::{debug, warn};

use crate::attrs;

/// What a [`ToleranceController`] steers its driven attribute towards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceTarget {
    /// A run-level experiment parameter; missing is fatal.
    Parameter(String),
    /// A per-sample attribute; missing fails only that sample.
    Attribute(String),
}

#[derive(Clone, Copy)]
enum Resolved<'a> {
    Fixed(f64),
    PerSample(&'a str),
}

// ── Tolerance loop ─────────────────────────────────────────────────────

/// Advances a driven attribute one timestep per pass until it lands
/// within a tolerance of the target.
///
/// The driven attribute doubles as the model clock: every advance is
/// folded into the run's furthest-time watermark. The tolerance
/// defaults to the experiment timestep, which makes the loop stop at
/// the gridpoint nearest the target.
#[derive(Debug)]
pub struct ToleranceController {
    name: String,
    driven: String,
    target: ConvergenceTarget,
    tolerance: Option<f64>,
    max_iterations: u64,
}

impl ToleranceController {
    pub fn new(
        name: impl Into<String>,
        driven: impl Into<String>,
        target: ConvergenceTarget,
    ) -> Self {
        Self {
            name: name.into(),
            driven: driven.into(),
            target,
            tolerance: None,
            max_iterations: SaturationSettings::default().max_iterations,
        }
    }

    /// Fix the tolerance instead of deriving it from the timestep.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

impl Step for ToleranceController {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_bounded_controller(&self) -> bool {
        true
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        let timestep = ctx.experiment.timestep()?;
        let tolerance = self.tolerance.unwrap_or(timestep);
        let goal = match &self.target {
            ConvergenceTarget::Parameter(parameter) => {
                Resolved::Fixed(ctx.experiment.require_f64(parameter)?)
            }
            ConvergenceTarget::Attribute(attribute) => Resolved::PerSample(attribute),
        };

        let name = self.name();
        let mut output = StepOutput::new();
        let mut done = SampleBatch::new();
        let mut again = SampleBatch::new();
        for index in batch.iter() {
            let state = ctx.convergence.observe(index, ctx.node);
            if state.iterations >= self.max_iterations {
                let retired = ctx.convergence.retire(index, ctx.node, GiveUpReason::CapExceeded);
                warn!(
                    sample = %ctx.arena.id(index),
                    iterations = retired.iterations,
                    "iteration cap exceeded"
                );
                output.push_retired(index, GiveUpReason::CapExceeded);
                continue;
            }

            let current = match ctx.read_f64(index, &self.driven, name) {
                Ok(value) => value,
                Err(error) => {
                    output.push_failure(index, error);
                    continue;
                }
            };
            let target = match goal {
                Resolved::Fixed(value) => value,
                Resolved::PerSample(attribute) => match ctx.read_f64(index, attribute, name) {
                    Ok(value) => value,
                    Err(error) => {
                        output.push_failure(index, error);
                        continue;
                    }
                },
            };

            if (target - current).abs() < tolerance {
                let state = ctx.convergence.converge(index, ctx.node);
                debug!(
                    sample = %ctx.arena.id(index),
                    iterations = state.iterations,
                    value = current,
                    "converged on target"
                );
                done.push(index);
                continue;
            }

            let advanced = current + timestep;
            ctx.write(index, &self.driven, advanced);
            ctx.convergence.record_pass(index, ctx.node, advanced);
            ctx.convergence.record_time(advanced);
            again.push(index);
        }

        output.push_route(OUTPUT_EDGE, done);
        output.push_route(LOOP_EDGE, again);
        Ok(output)
    }
}

// ── Saturation loop ────────────────────────────────────────────────────

/// Circulates samples while a driven attribute keeps falling, advancing
/// a clock attribute one timestep per pass.
///
/// A sample leaves the loop three ways: the driven value reaches zero
/// (converged), it settles above zero for long enough (saturated, so the
/// measurement cannot be explained by any age), or the pass cap is hit.
/// The settle tolerance can be overridden per run through the
/// `saturation tolerance` experiment parameter.
#[derive(Debug)]
pub struct SaturationController {
    name: String,
    driven: String,
    clock: String,
    settings: SaturationSettings,
}

impl SaturationController {
    pub fn new(
        name: impl Into<String>,
        driven: impl Into<String>,
        clock: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            driven: driven.into(),
            clock: clock.into(),
            settings: SaturationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SaturationSettings) -> Self {
        self.settings = settings;
        self
    }

    fn settled(&self, state: ConvergenceState, current: f64, tolerance: f64) -> bool {
        state.iterations >= self.settings.min_iterations
            && current > 0.0
            && state
                .last_value
                .is_some_and(|previous| (previous - current).abs() < tolerance)
    }
}

impl Step for SaturationController {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_bounded_controller(&self) -> bool {
        true
    }

    fn apply(&self, ctx: &mut StepContext<'_>, batch: SampleBatch) -> PipelineResult<StepOutput> {
        let timestep = ctx.experiment.timestep()?;
        let tolerance = ctx
            .experiment
            .get_f64(attrs::SATURATION_TOLERANCE_PARAMETER)
            .unwrap_or(self.settings.tolerance);

        let name = self.name();
        let mut output = StepOutput::new();
        let mut done = SampleBatch::new();
        let mut again = SampleBatch::new();
        for index in batch.iter() {
            let state = ctx.convergence.observe(index, ctx.node);
            if state.iterations >= self.settings.max_iterations {
                let retired = ctx.convergence.retire(index, ctx.node, GiveUpReason::CapExceeded);
                warn!(
                    sample = %ctx.arena.id(index),
                    iterations = retired.iterations,
                    "iteration cap exceeded"
                );
                output.push_retired(index, GiveUpReason::CapExceeded);
                continue;
            }

            let current = match ctx.read_f64(index, &self.driven, name) {
                Ok(value) => value,
                Err(error) => {
                    output.push_failure(index, error);
                    continue;
                }
            };

            if self.settled(state, current, tolerance) {
                let retired = ctx.convergence.retire(index, ctx.node, GiveUpReason::Saturated);
                debug!(
                    sample = %ctx.arena.id(index),
                    iterations = retired.iterations,
                    value = current,
                    "driven value settled above zero"
                );
                output.push_retired(index, GiveUpReason::Saturated);
                continue;
            }

            if current <= 0.0 {
                let state = ctx.convergence.converge(index, ctx.node);
                debug!(
                    sample = %ctx.arena.id(index),
                    iterations = state.iterations,
                    "driven value depleted"
                );
                done.push(index);
                continue;
            }

            let clock = match ctx.read_f64(index, &self.clock, name) {
                Ok(value) => value,
                Err(error) => {
                    output.push_failure(index, error);
                    continue;
                }
            };
            let advanced = clock + timestep;
            ctx.write(index, &self.clock, advanced);
            ctx.convergence.record_pass(index, ctx.node, current);
            ctx.convergence.record_time(advanced);
            again.push(index);
        }

        output.push_route(OUTPUT_EDGE, done);
        output.push_route(LOOP_EDGE, again);
        Ok(output)
    }
}
